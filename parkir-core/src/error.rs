use crate::booking::BookingStatus;
use crate::parking::VehicleType;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Auth(String),
    #[error("not authorized to access this resource")]
    Authorization,
    #[error("{0} not found")]
    NotFound(String),
    #[error("insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },
    #[error("no {vehicle_type} slot available at parking {parking_id}")]
    CapacityExceeded {
        parking_id: Uuid,
        vehicle_type: VehicleType,
    },
    #[error("cannot {action} a {status} booking")]
    InvalidState {
        status: BookingStatus,
        action: &'static str,
    },
    #[error("QR token invalid: {0}")]
    TokenInvalid(String),
    #[error("payment gateway error: {0}")]
    Upstream(String),
    #[error("storage contention: {0}")]
    Contention(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    /// The one credential failure message. Never says which field was wrong.
    pub fn invalid_credentials() -> Self {
        LedgerError::Auth("invalid email or password".to_string())
    }

    pub fn unauthenticated() -> Self {
        LedgerError::Auth("authentication required".to_string())
    }

    pub fn not_found(kind: &str, id: Uuid) -> Self {
        LedgerError::NotFound(format!("{} {}", kind, id))
    }

    /// Only storage contention is worth retrying; business failures are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Contention(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
