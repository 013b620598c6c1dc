use axum::{extract::State, routing::post, Extension, Json, Router};
use parkir_core::{Booking, Caller};
use serde::Deserialize;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct ScanRequest {
    token: String,
}

/// Scans made by the lot owner's gate device.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/gate/entry", post(validate_entry))
        .route("/v1/gate/exit", post(validate_exit))
}

async fn validate_entry(
    State(state): State<AppState>,
    Extension(scanner): Extension<Caller>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.ledger.validate_entry(&scanner, req.token.trim()).await?))
}

async fn validate_exit(
    State(state): State<AppState>,
    Extension(scanner): Extension<Caller>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.ledger.validate_exit(&scanner, req.token.trim()).await?))
}
