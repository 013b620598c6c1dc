use crate::account::Account;
use crate::booking::{Booking, BookingQuery, BookingSlice, BookingStats, BookingStatus};
use crate::chat::{Message, Room};
use crate::error::LedgerResult;
use crate::parking::{LotStatus, ParkingDetails, ParkingLot, PerVehicle, VehicleType};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Repository trait for account data access
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Fails `Conflict` when the email is taken.
    async fn insert_account(&self, account: &Account) -> LedgerResult<()>;

    async fn find_account(&self, id: Uuid) -> LedgerResult<Option<Account>>;

    async fn find_account_by_email(&self, email: &str) -> LedgerResult<Option<Account>>;

    /// Conditional update: fails `InsufficientFunds` instead of going negative.
    async fn adjust_balance(&self, id: Uuid, delta: i64) -> LedgerResult<i64>;
}

/// Repository trait for parking lots and their slot counters
#[async_trait]
pub trait ParkingRepository: Send + Sync {
    async fn insert_parking(&self, lot: &ParkingLot) -> LedgerResult<()>;

    async fn find_parking(&self, id: Uuid) -> LedgerResult<Option<ParkingLot>>;

    async fn update_parking_details(&self, id: Uuid, details: &ParkingDetails) -> LedgerResult<ParkingLot>;

    /// Resizes capacity while keeping the occupied count.
    async fn set_capacity(&self, id: Uuid, capacity: PerVehicle<u32>) -> LedgerResult<ParkingLot>;

    async fn set_parking_status(&self, id: Uuid, status: LotStatus) -> LedgerResult<ParkingLot>;

    /// Atomic check-and-decrement. Returns the remaining count.
    async fn reserve_slot(&self, id: Uuid, vehicle_type: VehicleType) -> LedgerResult<u32>;

    /// Increment clamped at capacity. Returns the new count.
    async fn release_slot(&self, id: Uuid, vehicle_type: VehicleType) -> LedgerResult<u32>;

    /// Active lots whose name or address contains `query`, case-insensitively.
    async fn search_parkings(&self, query: &str) -> LedgerResult<Vec<ParkingLot>>;
}

/// Repository trait for booking records
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert_booking(&self, booking: &Booking) -> LedgerResult<()>;

    async fn find_booking(&self, id: Uuid) -> LedgerResult<Option<Booking>>;

    /// Compare-and-set: writes `booking` only if the stored status is still
    /// `expected`. Returns whether the write happened.
    async fn update_booking_if(&self, booking: &Booking, expected: BookingStatus) -> LedgerResult<bool>;

    /// Newest first.
    async fn list_bookings(&self, query: &BookingQuery) -> LedgerResult<BookingSlice>;

    async fn booking_stats(&self, parking_id: Uuid, today: NaiveDate) -> LedgerResult<BookingStats>;
}

/// Single-use bookkeeping for QR tokens.
#[async_trait]
pub trait QrTokenRepository: Send + Sync {
    /// Atomically records first use of `jti`. `false` means it was already used.
    async fn mark_used(&self, jti: Uuid, used_at: DateTime<Utc>) -> LedgerResult<bool>;

    /// Undoes `mark_used` when the scan it guarded could not be recorded.
    async fn release_use(&self, jti: Uuid) -> LedgerResult<()>;
}

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn find_or_create_room(&self, parking_id: Uuid, seeker_id: Uuid, owner_id: Uuid) -> LedgerResult<Room>;

    async fn find_room(&self, id: Uuid) -> LedgerResult<Option<Room>>;

    /// Most recently active first.
    async fn rooms_for_user(&self, account_id: Uuid) -> LedgerResult<Vec<Room>>;

    /// Idempotent on (room, sender, client_message_id). The flag is `true`
    /// when a new message was stored.
    async fn append_message(
        &self,
        room_id: Uuid,
        sender_id: Uuid,
        content: &str,
        client_message_id: Option<&str>,
    ) -> LedgerResult<(Message, bool)>;

    /// Ascending by sequence, optionally only those after `after_seq`.
    async fn messages(&self, room_id: Uuid, after_seq: Option<u64>) -> LedgerResult<Vec<Message>>;
}

/// Dedupe log for payment gateway notifications.
#[async_trait]
pub trait PaymentEventRepository: Send + Sync {
    /// `false` when `transaction_id` was already processed.
    async fn record_payment_event(&self, transaction_id: &str, received_at: DateTime<Utc>) -> LedgerResult<bool>;

    /// Drops the marker so a redelivery of `transaction_id` is processed again.
    async fn forget_payment_event(&self, transaction_id: &str) -> LedgerResult<()>;
}

/// Everything the ledger needs from one storage backend.
pub trait Store:
    AccountRepository
    + ParkingRepository
    + BookingRepository
    + QrTokenRepository
    + ChatRepository
    + PaymentEventRepository
{
}

impl<T> Store for T where
    T: AccountRepository
        + ParkingRepository
        + BookingRepository
        + QrTokenRepository
        + ChatRepository
        + PaymentEventRepository
{
}
