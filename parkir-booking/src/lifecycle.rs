//! Booking state machine.
//!
//! ```text
//! pending ──confirm──▶ confirmed ──entry scan──▶ active ──exit scan──▶ completed
//!    │                     │
//!    └──────cancel─────────┴──▶ cancelled
//! ```

use parkir_core::{Booking, BookingStatus, LedgerError, LedgerResult};

pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
    use BookingStatus::*;
    matches!(
        (from, to),
        (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Active) | (Confirmed, Cancelled) | (Active, Completed)
    )
}

pub fn ensure_transition(booking: &Booking, to: BookingStatus, action: &'static str) -> LedgerResult<()> {
    if can_transition(booking.status, to) {
        Ok(())
    } else {
        Err(LedgerError::InvalidState {
            status: booking.status,
            action,
        })
    }
}
