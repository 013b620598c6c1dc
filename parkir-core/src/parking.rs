use crate::error::LedgerError;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Motorcycle,
}

impl VehicleType {
    pub const ALL: [VehicleType; 2] = [VehicleType::Car, VehicleType::Motorcycle];

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::Car => "car",
            VehicleType::Motorcycle => "motorcycle",
        }
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VehicleType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "car" => Ok(VehicleType::Car),
            "motorcycle" => Ok(VehicleType::Motorcycle),
            other => Err(LedgerError::Validation(format!("unknown vehicle type '{}'", other))),
        }
    }
}

/// One value per vehicle type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PerVehicle<T> {
    pub car: T,
    pub motorcycle: T,
}

impl<T: Copy> PerVehicle<T> {
    pub fn new(car: T, motorcycle: T) -> Self {
        Self { car, motorcycle }
    }

    pub fn get(&self, vehicle_type: VehicleType) -> T {
        match vehicle_type {
            VehicleType::Car => self.car,
            VehicleType::Motorcycle => self.motorcycle,
        }
    }

    pub fn get_mut(&mut self, vehicle_type: VehicleType) -> &mut T {
        match vehicle_type {
            VehicleType::Car => &mut self.car,
            VehicleType::Motorcycle => &mut self.motorcycle,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationalHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl OperationalHours {
    pub fn around_the_clock() -> Self {
        Self {
            open: NaiveTime::MIN,
            close: NaiveTime::MIN,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    Active,
    Inactive,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Active => "active",
            LotStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for LotStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(LotStatus::Active),
            "inactive" => Ok(LotStatus::Inactive),
            other => Err(LedgerError::Validation(format!("unknown parking status '{}'", other))),
        }
    }
}

/// Owner-editable metadata of a lot. Capacity and status have their own operations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParkingDetails {
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub hourly_rate: PerVehicle<i64>,
    pub operational_hours: OperationalHours,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParkingLot {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: PerVehicle<u32>,
    pub available: PerVehicle<u32>,
    pub hourly_rate: PerVehicle<i64>,
    pub operational_hours: OperationalHours,
    pub status: LotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ParkingLot {
    pub fn new(owner_id: Uuid, details: ParkingDetails, capacity: PerVehicle<u32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: details.name,
            address: details.address,
            latitude: details.latitude,
            longitude: details.longitude,
            capacity,
            available: capacity,
            hourly_rate: details.hourly_rate,
            operational_hours: details.operational_hours,
            status: LotStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_details(&mut self, details: ParkingDetails) {
        self.name = details.name;
        self.address = details.address;
        self.latitude = details.latitude;
        self.longitude = details.longitude;
        self.hourly_rate = details.hourly_rate;
        self.operational_hours = details.operational_hours;
        self.updated_at = Utc::now();
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}
