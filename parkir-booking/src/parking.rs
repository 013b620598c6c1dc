use parkir_core::repository::ParkingRepository;
use parkir_core::{Caller, LedgerError, LedgerResult, LotStatus, ParkingDetails, ParkingLot, PerVehicle, Role, Store};
use parkir_inventory::NewParking;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Owner-side lot management.
pub struct ParkingService {
    store: Arc<dyn Store>,
}

impl ParkingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_parking(&self, caller: &Caller, new_parking: NewParking) -> LedgerResult<ParkingLot> {
        if caller.role != Role::Owner {
            return Err(LedgerError::Authorization);
        }

        let lot = parkir_inventory::build_lot(caller.account_id, new_parking)?;
        self.store.insert_parking(&lot).await?;

        info!(
            parking_id = %lot.id,
            owner_id = %lot.owner_id,
            car = lot.capacity.car,
            motorcycle = lot.capacity.motorcycle,
            "Parking lot created"
        );
        Ok(lot)
    }

    pub async fn update_parking(&self, caller: &Caller, parking_id: Uuid, details: ParkingDetails) -> LedgerResult<ParkingLot> {
        self.owned_lot(caller, parking_id).await?;
        parkir_inventory::validate_details(&details)?;
        let lot = self.store.update_parking_details(parking_id, &details).await?;
        info!(parking_id = %lot.id, "Parking lot updated");
        Ok(lot)
    }

    pub async fn set_capacity(&self, caller: &Caller, parking_id: Uuid, capacity: PerVehicle<u32>) -> LedgerResult<ParkingLot> {
        self.owned_lot(caller, parking_id).await?;
        let lot = self.store.set_capacity(parking_id, capacity).await?;
        info!(
            parking_id = %lot.id,
            car = lot.capacity.car,
            motorcycle = lot.capacity.motorcycle,
            "Parking capacity changed"
        );
        Ok(lot)
    }

    pub async fn set_status(&self, caller: &Caller, parking_id: Uuid, status: LotStatus) -> LedgerResult<ParkingLot> {
        self.owned_lot(caller, parking_id).await?;
        let lot = self.store.set_parking_status(parking_id, status).await?;
        info!(parking_id = %lot.id, status = status.as_str(), "Parking status changed");
        Ok(lot)
    }

    async fn owned_lot(&self, caller: &Caller, parking_id: Uuid) -> LedgerResult<ParkingLot> {
        let lot = self
            .store
            .find_parking(parking_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("parking", parking_id))?;
        if lot.owner_id != caller.account_id {
            return Err(LedgerError::Authorization);
        }
        Ok(lot)
    }
}
