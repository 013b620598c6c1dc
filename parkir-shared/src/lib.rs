pub mod models;
pub mod pii;
pub mod sync;
