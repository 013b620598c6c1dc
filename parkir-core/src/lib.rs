pub mod account;
pub mod booking;
pub mod chat;
pub mod error;
pub mod identity;
pub mod parking;
pub mod payment;
pub mod repository;

pub use account::{Account, Caller, Role};
pub use booking::{Booking, BookingQuery, BookingSlice, BookingStats, BookingStatus, QrKind};
pub use chat::{Message, Room};
pub use error::{LedgerError, LedgerResult};
pub use parking::{LotStatus, OperationalHours, ParkingDetails, ParkingLot, PerVehicle, VehicleType};
pub use repository::Store;
