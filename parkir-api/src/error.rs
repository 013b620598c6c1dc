use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use parkir_core::LedgerError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Ledger(LedgerError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Ledger(err) => match err {
                LedgerError::Validation(_) => StatusCode::BAD_REQUEST,
                LedgerError::Conflict(_)
                | LedgerError::InvalidState { .. }
                | LedgerError::CapacityExceeded { .. } => StatusCode::CONFLICT,
                LedgerError::Auth(_) => StatusCode::UNAUTHORIZED,
                LedgerError::Authorization => StatusCode::FORBIDDEN,
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                LedgerError::TokenInvalid(_) => StatusCode::GONE,
                LedgerError::Upstream(_) => StatusCode::BAD_GATEWAY,
                LedgerError::Contention(_) => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::Ledger(LedgerError::Storage(msg)) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Ledger(err) => err.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}
