use crate::inventory::InventoryError;
use chrono::{DateTime, NaiveTime, Utc};
use parkir_core::{LotStatus, OperationalHours, ParkingDetails, ParkingLot, PerVehicle, VehicleType};
use serde::Deserialize;
use uuid::Uuid;

/// Payload for listing a new lot.
#[derive(Debug, Clone, Deserialize)]
pub struct NewParking {
    #[serde(flatten)]
    pub details: ParkingDetails,
    pub capacity: PerVehicle<u32>,
}

pub fn validate_details(details: &ParkingDetails) -> Result<(), InventoryError> {
    if details.name.trim().is_empty() {
        return Err(InventoryError::Invalid("name must not be empty".into()));
    }
    if details.address.trim().is_empty() {
        return Err(InventoryError::Invalid("address must not be empty".into()));
    }
    for vehicle_type in VehicleType::ALL {
        if details.hourly_rate.get(vehicle_type) < 0 {
            return Err(InventoryError::Invalid(format!(
                "{} hourly rate must not be negative",
                vehicle_type
            )));
        }
    }
    if let Some(lat) = details.latitude {
        if !(-90.0..=90.0).contains(&lat) {
            return Err(InventoryError::Invalid(format!("latitude {} out of range", lat)));
        }
    }
    if let Some(lng) = details.longitude {
        if !(-180.0..=180.0).contains(&lng) {
            return Err(InventoryError::Invalid(format!("longitude {} out of range", lng)));
        }
    }
    if details.latitude.is_some() != details.longitude.is_some() {
        return Err(InventoryError::Invalid("latitude and longitude must be given together".into()));
    }
    Ok(())
}

pub fn build_lot(owner_id: Uuid, new_parking: NewParking) -> Result<ParkingLot, InventoryError> {
    validate_details(&new_parking.details)?;
    Ok(ParkingLot::new(owner_id, new_parking.details, new_parking.capacity))
}

/// `open == close` means around the clock; `close < open` wraps past midnight.
pub fn is_open_at(hours: &OperationalHours, time: NaiveTime) -> bool {
    if hours.open == hours.close {
        return true;
    }
    if hours.open < hours.close {
        hours.open <= time && time < hours.close
    } else {
        time >= hours.open || time < hours.close
    }
}

pub fn ensure_bookable(lot: &ParkingLot, start_time: DateTime<Utc>) -> Result<(), InventoryError> {
    if lot.status != LotStatus::Active {
        return Err(InventoryError::NotBookable(format!("parking {} is inactive", lot.id)));
    }

    let time_of_day = start_time.time();
    if !is_open_at(&lot.operational_hours, time_of_day) {
        return Err(InventoryError::NotBookable(format!(
            "start time {} is outside operational hours {}-{}",
            time_of_day.format("%H:%M"),
            lot.operational_hours.open.format("%H:%M"),
            lot.operational_hours.close.format("%H:%M"),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn details(hours: OperationalHours) -> ParkingDetails {
        ParkingDetails {
            name: "Parkir Stasiun".into(),
            address: "Jl. Stasiun 3".into(),
            latitude: Some(-6.2),
            longitude: Some(106.8),
            hourly_rate: PerVehicle::new(5_000, 2_000),
            operational_hours: hours,
        }
    }

    #[test]
    fn day_and_overnight_windows() {
        let day = OperationalHours { open: hm(8, 0), close: hm(22, 0) };
        assert!(is_open_at(&day, hm(8, 0)));
        assert!(is_open_at(&day, hm(21, 59)));
        assert!(!is_open_at(&day, hm(22, 0)));
        assert!(!is_open_at(&day, hm(3, 0)));

        let night = OperationalHours { open: hm(20, 0), close: hm(6, 0) };
        assert!(is_open_at(&night, hm(23, 30)));
        assert!(is_open_at(&night, hm(5, 59)));
        assert!(!is_open_at(&night, hm(12, 0)));

        assert!(is_open_at(&OperationalHours::around_the_clock(), hm(4, 4)));
    }

    #[test]
    fn inactive_or_closed_lots_are_not_bookable() {
        let mut lot = build_lot(
            Uuid::new_v4(),
            NewParking {
                details: details(OperationalHours { open: hm(8, 0), close: hm(17, 0) }),
                capacity: PerVehicle::new(3, 3),
            },
        )
        .unwrap();

        let morning = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).unwrap();
        let midnight = Utc.with_ymd_and_hms(2026, 10, 16, 0, 30, 0).unwrap();
        assert!(ensure_bookable(&lot, morning).is_ok());
        assert!(matches!(ensure_bookable(&lot, midnight), Err(InventoryError::NotBookable(_))));

        lot.status = LotStatus::Inactive;
        assert!(matches!(ensure_bookable(&lot, morning), Err(InventoryError::NotBookable(_))));
    }

    #[test]
    fn rejects_bad_details() {
        let mut bad = details(OperationalHours::around_the_clock());
        bad.hourly_rate.car = -1;
        assert!(validate_details(&bad).is_err());

        let mut bad = details(OperationalHours::around_the_clock());
        bad.name = "  ".into();
        assert!(validate_details(&bad).is_err());

        let mut bad = details(OperationalHours::around_the_clock());
        bad.longitude = None;
        assert!(validate_details(&bad).is_err());
    }
}
