use crate::error::LedgerError;
use crate::parking::VehicleType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Active,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Statuses whose cost has been settled and not refunded.
    pub fn holds_revenue(&self) -> bool {
        matches!(
            self,
            BookingStatus::Confirmed | BookingStatus::Active | BookingStatus::Completed
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| LedgerError::Validation(format!("unknown booking status '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QrKind {
    Entry,
    Exit,
}

impl QrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QrKind::Entry => "entry",
            QrKind::Exit => "exit",
        }
    }
}

impl fmt::Display for QrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub parking_id: Uuid,
    pub vehicle_type: VehicleType,
    pub start_time: DateTime<Utc>,
    pub duration_hours: u32,
    /// Set once, at confirmation.
    pub cost: Option<i64>,
    pub status: BookingStatus,
    pub entry_qr: Option<String>,
    pub exit_qr: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        user_id: Uuid,
        parking_id: Uuid,
        vehicle_type: VehicleType,
        start_time: DateTime<Utc>,
        duration_hours: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            parking_id,
            vehicle_type,
            start_time,
            duration_hours,
            cost: None,
            status: BookingStatus::Pending,
            entry_qr: None,
            exit_qr: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn qr_token(&self, kind: QrKind) -> Option<&str> {
        match kind {
            QrKind::Entry => self.entry_qr.as_deref(),
            QrKind::Exit => self.exit_qr.as_deref(),
        }
    }

    pub fn set_qr_token(&mut self, kind: QrKind, token: String) {
        match kind {
            QrKind::Entry => self.entry_qr = Some(token),
            QrKind::Exit => self.exit_qr = Some(token),
        }
        self.updated_at = Utc::now();
    }

    pub fn update_status(&mut self, status: BookingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

/// Filter + page for booking listings. `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct BookingQuery {
    pub user_id: Option<Uuid>,
    pub parking_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl BookingQuery {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.user_id.map_or(true, |id| booking.user_id == id)
            && self.parking_id.map_or(true, |id| booking.parking_id == id)
            && self.status.map_or(true, |status| booking.status == status)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingSlice {
    pub items: Vec<Booking>,
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingStats {
    pub pending: u64,
    pub confirmed: u64,
    pub active: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub revenue: i64,
    pub today: u64,
}

impl BookingStats {
    pub fn record(&mut self, booking: &Booking, today: NaiveDate) {
        self.record_counts(booking.status, 1, booking.cost.unwrap_or(0));
        if booking.created_at.date_naive() == today {
            self.today += 1;
        }
    }

    /// Add `count` bookings of one status whose costs sum to `cost_sum`.
    pub fn record_counts(&mut self, status: BookingStatus, count: u64, cost_sum: i64) {
        match status {
            BookingStatus::Pending => self.pending += count,
            BookingStatus::Confirmed => self.confirmed += count,
            BookingStatus::Active => self.active += count,
            BookingStatus::Completed => self.completed += count,
            BookingStatus::Cancelled => self.cancelled += count,
        }
        if status.holds_revenue() {
            self.revenue += cost_sum;
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.confirmed + self.active + self.completed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("archived".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn stats_only_count_settled_revenue() {
        let today = Utc::now().date_naive();
        let mut stats = BookingStats::default();

        let mut completed = Booking::new(Uuid::new_v4(), Uuid::new_v4(), VehicleType::Car, Utc::now(), 2);
        completed.cost = Some(20_000);
        completed.status = BookingStatus::Completed;

        let mut cancelled = completed.clone();
        cancelled.status = BookingStatus::Cancelled;

        stats.record(&completed, today);
        stats.record(&cancelled, today);

        assert_eq!(stats.completed, 1);
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.revenue, 20_000);
        assert_eq!(stats.today, 2);
        assert_eq!(stats.total(), 2);
    }
}
