pub mod inventory;
pub mod lot;
pub mod pricing;

pub use inventory::{release_slot, reserve_slot, resize, InventoryError, SlotRelease};
pub use lot::{build_lot, ensure_bookable, is_open_at, validate_details, NewParking};
pub use pricing::booking_cost;
