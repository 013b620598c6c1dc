use crate::lifecycle::ensure_transition;
use crate::notify::NotificationHub;
use crate::qr::{IssuedQr, QrGateAuthority};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use parkir_core::repository::{AccountRepository, BookingRepository, ParkingRepository, QrTokenRepository};
use parkir_core::{Booking, BookingStatus, Caller, LedgerError, LedgerResult, ParkingLot, QrKind, Store, VehicleType};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub parking_id: Uuid,
    pub vehicle_type: VehicleType,
    pub start_time: DateTime<Utc>,
    pub duration_hours: i64,
}

/// Owns every booking state transition and the slot and balance movements
/// that go with them.
pub struct BookingLedger {
    store: Arc<dyn Store>,
    replay_guard: Arc<dyn QrTokenRepository>,
    qr: QrGateAuthority,
    notifications: NotificationHub,
    retry: RetryPolicy,
}

impl BookingLedger {
    pub fn new(
        store: Arc<dyn Store>,
        replay_guard: Arc<dyn QrTokenRepository>,
        qr: QrGateAuthority,
        notifications: NotificationHub,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            replay_guard,
            qr,
            notifications,
            retry,
        }
    }

    /// Records a pending request. Inventory and balance are untouched.
    pub async fn create_booking(&self, caller: &Caller, request: NewBooking) -> LedgerResult<Booking> {
        if request.duration_hours <= 0 {
            return Err(LedgerError::Validation("duration must be at least one hour".into()));
        }
        let duration_hours = u32::try_from(request.duration_hours)
            .map_err(|_| LedgerError::Validation(format!("duration {} is too long", request.duration_hours)))?;

        let lot = self.find_lot(request.parking_id).await?;
        parkir_inventory::ensure_bookable(&lot, request.start_time)?;
        // Reject durations whose cost cannot be represented before anything is stored.
        parkir_inventory::booking_cost(&lot, request.vehicle_type, duration_hours)?;

        let booking = Booking::new(
            caller.account_id,
            lot.id,
            request.vehicle_type,
            request.start_time,
            duration_hours,
        );
        self.store.insert_booking(&booking).await?;

        info!(
            booking_id = %booking.id,
            parking_id = %lot.id,
            vehicle_type = %booking.vehicle_type,
            duration_hours,
            "Booking created"
        );
        self.notifications.booking_updated(&booking);
        Ok(booking)
    }

    pub async fn confirm_booking(&self, caller: &Caller, booking_id: Uuid) -> LedgerResult<Booking> {
        let booking = self.load_owned_booking(caller, booking_id).await?;
        self.settle(booking).await
    }

    /// pending → confirmed: reserve a slot, debit the cost, then compare-and-set
    /// the status. Any failure after the reservation undoes what was done.
    pub async fn settle(&self, booking: Booking) -> LedgerResult<Booking> {
        ensure_transition(&booking, BookingStatus::Confirmed, "confirm")?;

        let lot = self.find_lot(booking.parking_id).await?;
        let cost = parkir_inventory::booking_cost(&lot, booking.vehicle_type, booking.duration_hours)?;

        let remaining = self
            .retry
            .run("reserve_slot", || self.store.reserve_slot(lot.id, booking.vehicle_type))
            .await?;

        if let Err(err) = self
            .retry
            .run("debit_balance", || self.store.adjust_balance(booking.user_id, -cost))
            .await
        {
            self.release(&booking).await;
            return Err(err);
        }

        let mut confirmed = booking.clone();
        confirmed.cost = Some(cost);
        confirmed.update_status(BookingStatus::Confirmed);

        let written = self
            .retry
            .run("confirm_booking", || {
                self.store.update_booking_if(&confirmed, BookingStatus::Pending)
            })
            .await;

        match written {
            Ok(true) => {}
            Ok(false) => {
                self.refund(&booking, cost).await;
                self.release(&booking).await;
                return Err(self.lost_race(booking.id, "confirm").await);
            }
            Err(err) => {
                self.refund(&booking, cost).await;
                self.release(&booking).await;
                return Err(err);
            }
        }

        info!(
            booking_id = %confirmed.id,
            parking_id = %confirmed.parking_id,
            cost,
            remaining,
            "Booking confirmed"
        );
        self.notifications.booking_updated(&confirmed);
        Ok(confirmed)
    }

    pub async fn cancel_booking(&self, caller: &Caller, booking_id: Uuid) -> LedgerResult<Booking> {
        let booking = self.load_owned_booking(caller, booking_id).await?;
        self.cancel(booking).await
    }

    /// Cancels a booking the gateway reported as unpaid. Anything no longer
    /// pending is left alone.
    pub async fn cancel_unpaid(&self, booking_id: Uuid) -> LedgerResult<Option<Booking>> {
        let booking = self.find_booking(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Ok(None);
        }
        match self.cancel(booking).await {
            Ok(cancelled) => Ok(Some(cancelled)),
            Err(LedgerError::InvalidState { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn cancel(&self, booking: Booking) -> LedgerResult<Booking> {
        ensure_transition(&booking, BookingStatus::Cancelled, "cancel")?;

        let previous = booking.status;
        let mut cancelled = booking.clone();
        cancelled.update_status(BookingStatus::Cancelled);

        let written = self
            .retry
            .run("cancel_booking", || self.store.update_booking_if(&cancelled, previous))
            .await?;
        if !written {
            return Err(self.lost_race(booking.id, "cancel").await);
        }

        // Only the writer that won the status change gives back slot and money.
        if previous == BookingStatus::Confirmed {
            if let Some(cost) = booking.cost {
                self.refund(&booking, cost).await;
            }
            self.release(&booking).await;
        }

        info!(booking_id = %cancelled.id, from = %previous, "Booking cancelled");
        self.notifications.booking_updated(&cancelled);
        Ok(cancelled)
    }

    pub async fn issue_entry_qr(&self, caller: &Caller, booking_id: Uuid) -> LedgerResult<IssuedQr> {
        self.issue_qr(caller, booking_id, QrKind::Entry).await
    }

    pub async fn issue_exit_qr(&self, caller: &Caller, booking_id: Uuid) -> LedgerResult<IssuedQr> {
        self.issue_qr(caller, booking_id, QrKind::Exit).await
    }

    /// Mints a pass and stores it on the booking, superseding any earlier one.
    async fn issue_qr(&self, caller: &Caller, booking_id: Uuid, kind: QrKind) -> LedgerResult<IssuedQr> {
        let booking = self.load_owned_booking(caller, booking_id).await?;
        let (required, action) = match kind {
            QrKind::Entry => (BookingStatus::Confirmed, "issue an entry pass for"),
            QrKind::Exit => (BookingStatus::Active, "issue an exit pass for"),
        };
        if booking.status != required {
            return Err(LedgerError::InvalidState {
                status: booking.status,
                action,
            });
        }

        let issued = self.qr.mint(booking.id, kind, Utc::now())?;
        let mut updated = booking.clone();
        updated.set_qr_token(kind, issued.token.clone());

        let written = self
            .retry
            .run("store_qr", || self.store.update_booking_if(&updated, required))
            .await?;
        if !written {
            return Err(self.lost_race(booking.id, action).await);
        }

        info!(booking_id = %booking.id, kind = %kind, expires_at = %issued.expires_at, "QR pass issued");
        Ok(issued)
    }

    pub async fn validate_entry(&self, scanner: &Caller, token: &str) -> LedgerResult<Booking> {
        self.validate_scan(scanner, token, QrKind::Entry).await
    }

    pub async fn validate_exit(&self, scanner: &Caller, token: &str) -> LedgerResult<Booking> {
        self.validate_scan(scanner, token, QrKind::Exit).await
    }

    /// Gate scan by the lot owner. The token is burned before the status check,
    /// so a replayed token always fails as a used token.
    async fn validate_scan(&self, scanner: &Caller, token: &str, kind: QrKind) -> LedgerResult<Booking> {
        let now = Utc::now();
        let claims = self.qr.verify(token, kind, now)?;

        let booking = self
            .store
            .find_booking(claims.booking_id)
            .await?
            .ok_or_else(|| LedgerError::TokenInvalid("token refers to an unknown booking".into()))?;
        let lot = self.find_lot(booking.parking_id).await?;
        if lot.owner_id != scanner.account_id {
            warn!(booking_id = %booking.id, scanner = %scanner.account_id, "Gate scan by non-owner rejected");
            return Err(LedgerError::Authorization);
        }

        if booking.qr_token(kind) != Some(token) {
            return Err(LedgerError::TokenInvalid("token has been superseded".into()));
        }

        if !self.replay_guard.mark_used(claims.jti, now).await? {
            warn!(booking_id = %booking.id, jti = %claims.jti, kind = %kind, "QR replay rejected");
            return Err(LedgerError::TokenInvalid("token already used".into()));
        }

        let (target, action) = match kind {
            QrKind::Entry => (BookingStatus::Active, "admit"),
            QrKind::Exit => (BookingStatus::Completed, "release"),
        };
        ensure_transition(&booking, target, action)?;

        let previous = booking.status;
        let mut updated = booking.clone();
        updated.update_status(target);

        let written = match self
            .retry
            .run("gate_transition", || self.store.update_booking_if(&updated, previous))
            .await
        {
            Ok(written) => written,
            Err(err) => {
                // The scan never took effect, so the token stays usable.
                self.unburn(claims.jti, booking.id).await;
                return Err(err);
            }
        };
        if !written {
            return Err(self.lost_race(booking.id, action).await);
        }

        if kind == QrKind::Exit {
            self.release(&booking).await;
        }

        info!(booking_id = %updated.id, kind = %kind, status = %updated.status, "Gate scan accepted");
        self.notifications.booking_updated(&updated);
        Ok(updated)
    }

    /// Loads a booking the caller created.
    pub async fn load_owned_booking(&self, caller: &Caller, booking_id: Uuid) -> LedgerResult<Booking> {
        let booking = self.find_booking(booking_id).await?;
        if booking.user_id != caller.account_id {
            return Err(LedgerError::Authorization);
        }
        Ok(booking)
    }

    pub async fn find_booking(&self, booking_id: Uuid) -> LedgerResult<Booking> {
        self.store
            .find_booking(booking_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("booking", booking_id))
    }

    async fn find_lot(&self, parking_id: Uuid) -> LedgerResult<ParkingLot> {
        self.store
            .find_parking(parking_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("parking", parking_id))
    }

    async fn lost_race(&self, booking_id: Uuid, action: &'static str) -> LedgerError {
        match self.store.find_booking(booking_id).await {
            Ok(Some(current)) => LedgerError::InvalidState {
                status: current.status,
                action,
            },
            Ok(None) => LedgerError::not_found("booking", booking_id),
            Err(err) => err,
        }
    }

    async fn unburn(&self, jti: Uuid, booking_id: Uuid) {
        if let Err(err) = self
            .retry
            .run("release_qr_use", || self.replay_guard.release_use(jti))
            .await
        {
            error!(booking_id = %booking_id, jti = %jti, "Gate write failed and token stays burned: {}", err);
        }
    }

    async fn release(&self, booking: &Booking) {
        if let Err(err) = self
            .retry
            .run("release_slot", || {
                self.store.release_slot(booking.parking_id, booking.vehicle_type)
            })
            .await
        {
            error!(booking_id = %booking.id, parking_id = %booking.parking_id, "Slot release failed: {}", err);
        }
    }

    async fn refund(&self, booking: &Booking, cost: i64) {
        if let Err(err) = self
            .retry
            .run("refund_balance", || self.store.adjust_balance(booking.user_id, cost))
            .await
        {
            error!(booking_id = %booking.id, user_id = %booking.user_id, cost, "Refund failed: {}", err);
        }
    }
}
