use axum::{extract::State, routing::post, Json, Router};
use parkir_booking::WebhookOutcome;
use parkir_core::payment::PaymentNotification;
use serde::Serialize;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize)]
struct WebhookAck {
    outcome: WebhookOutcome,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Payment gateway status notifications, authenticated by signature.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentNotification>,
) -> Result<Json<WebhookAck>, AppError> {
    tracing::info!(
        "Received webhook: {} for booking {} (transaction {})",
        payload.transaction_status,
        payload.order_id,
        payload.transaction_id
    );

    let outcome = state.payments.handle_notification(&payload).await?;
    Ok(Json(WebhookAck { outcome }))
}
