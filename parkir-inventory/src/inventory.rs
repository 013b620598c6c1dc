use chrono::Utc;
use parkir_core::{LedgerError, ParkingLot, PerVehicle, VehicleType};
use uuid::Uuid;

/// Outcome of returning a slot to a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRelease {
    Released { available: u32 },
    /// Counter was already at capacity (duplicate release).
    Clamped { available: u32 },
}

impl SlotRelease {
    pub fn available(&self) -> u32 {
        match self {
            SlotRelease::Released { available } | SlotRelease::Clamped { available } => *available,
        }
    }
}

/// Take one slot of `vehicle_type`. Callers hold whatever lock makes this atomic.
pub fn reserve_slot(lot: &mut ParkingLot, vehicle_type: VehicleType) -> Result<u32, InventoryError> {
    let available = lot.available.get_mut(vehicle_type);
    if *available == 0 {
        return Err(InventoryError::CapacityExceeded {
            parking_id: lot.id,
            vehicle_type,
        });
    }

    *available -= 1;
    let remaining = *available;
    lot.updated_at = Utc::now();
    Ok(remaining)
}

/// Return one slot, never overshooting capacity.
pub fn release_slot(lot: &mut ParkingLot, vehicle_type: VehicleType) -> SlotRelease {
    let capacity = lot.capacity.get(vehicle_type);
    let available = lot.available.get_mut(vehicle_type);

    if *available >= capacity {
        *available = capacity;
        tracing::warn!(
            parking_id = %lot.id,
            vehicle_type = %vehicle_type,
            capacity,
            "Slot release clamped at capacity"
        );
        return SlotRelease::Clamped { available: capacity };
    }

    *available += 1;
    let released = *available;
    lot.updated_at = Utc::now();
    SlotRelease::Released { available: released }
}

pub fn occupied(lot: &ParkingLot, vehicle_type: VehicleType) -> u32 {
    lot.capacity
        .get(vehicle_type)
        .saturating_sub(lot.available.get(vehicle_type))
}

/// Change capacity keeping occupied slots occupied.
pub fn resize(lot: &mut ParkingLot, capacity: PerVehicle<u32>) -> Result<(), InventoryError> {
    let mut available = PerVehicle::default();
    for vehicle_type in VehicleType::ALL {
        let in_use = occupied(lot, vehicle_type);
        let requested = capacity.get(vehicle_type);
        if requested < in_use {
            return Err(InventoryError::CapacityBelowOccupied {
                vehicle_type,
                requested,
                occupied: in_use,
            });
        }
        *available.get_mut(vehicle_type) = requested - in_use;
    }

    lot.capacity = capacity;
    lot.available = available;
    lot.updated_at = Utc::now();
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("no {vehicle_type} slot available at parking {parking_id}")]
    CapacityExceeded {
        parking_id: Uuid,
        vehicle_type: VehicleType,
    },

    #[error("{vehicle_type} capacity {requested} is below the {occupied} slots in use")]
    CapacityBelowOccupied {
        vehicle_type: VehicleType,
        requested: u32,
        occupied: u32,
    },

    #[error("parking is not bookable: {0}")]
    NotBookable(String),

    #[error("invalid parking data: {0}")]
    Invalid(String),

    #[error("cost overflows for {duration_hours} hours")]
    Overflow { duration_hours: u32 },
}

impl From<InventoryError> for LedgerError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::CapacityExceeded {
                parking_id,
                vehicle_type,
            } => LedgerError::CapacityExceeded {
                parking_id,
                vehicle_type,
            },
            other => LedgerError::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parkir_core::{OperationalHours, ParkingDetails};

    fn lot(car: u32, motorcycle: u32) -> ParkingLot {
        ParkingLot::new(
            Uuid::new_v4(),
            ParkingDetails {
                name: "Lahan Pak Budi".into(),
                address: "Jl. Merdeka 1".into(),
                latitude: None,
                longitude: None,
                hourly_rate: PerVehicle::new(10_000, 3_000),
                operational_hours: OperationalHours::around_the_clock(),
            },
            PerVehicle::new(car, motorcycle),
        )
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut lot = lot(2, 1);

        assert_eq!(reserve_slot(&mut lot, VehicleType::Car).unwrap(), 1);
        assert_eq!(reserve_slot(&mut lot, VehicleType::Car).unwrap(), 0);
        assert!(matches!(
            reserve_slot(&mut lot, VehicleType::Car),
            Err(InventoryError::CapacityExceeded { .. })
        ));
        assert_eq!(lot.available.motorcycle, 1);

        assert_eq!(release_slot(&mut lot, VehicleType::Car), SlotRelease::Released { available: 1 });
    }

    #[test]
    fn duplicate_release_is_clamped() {
        let mut lot = lot(1, 0);
        assert_eq!(release_slot(&mut lot, VehicleType::Car), SlotRelease::Clamped { available: 1 });
        assert_eq!(release_slot(&mut lot, VehicleType::Motorcycle), SlotRelease::Clamped { available: 0 });
        assert_eq!(lot.available, lot.capacity);
    }

    #[test]
    fn resize_keeps_occupied_slots() {
        let mut lot = lot(5, 2);
        reserve_slot(&mut lot, VehicleType::Car).unwrap();
        reserve_slot(&mut lot, VehicleType::Car).unwrap();

        resize(&mut lot, PerVehicle::new(3, 4)).unwrap();
        assert_eq!(lot.available, PerVehicle::new(1, 4));

        let err = resize(&mut lot, PerVehicle::new(1, 4)).unwrap_err();
        assert!(matches!(err, InventoryError::CapacityBelowOccupied { occupied: 2, .. }));
        assert_eq!(lot.capacity, PerVehicle::new(3, 4));
    }
}
