use crate::inventory::InventoryError;
use parkir_core::{ParkingLot, VehicleType};

/// cost = duration × hourly rate for the vehicle type.
pub fn booking_cost(lot: &ParkingLot, vehicle_type: VehicleType, duration_hours: u32) -> Result<i64, InventoryError> {
    lot.hourly_rate
        .get(vehicle_type)
        .checked_mul(i64::from(duration_hours))
        .ok_or(InventoryError::Overflow { duration_hours })
}
