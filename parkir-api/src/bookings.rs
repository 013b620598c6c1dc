use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::Stream;
use parkir_booking::{BookingPage, IssuedQr, NewBooking, PageRequest, PaymentOutcome};
use parkir_core::{Booking, Caller};
use parkir_shared::models::events::Notification;
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;
use crate::{error::AppError, sse::notification_stream, state::AppState};

#[derive(Debug, Deserialize)]
struct PaymentRequest {
    method: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(my_bookings))
        .route("/v1/bookings/stream", get(booking_stream))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
        .route("/v1/bookings/{id}/entry-qr", post(entry_qr))
        .route("/v1/bookings/{id}/exit-qr", post(exit_qr))
        .route("/v1/bookings/{id}/payment", post(process_payment))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.ledger.create_booking(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn my_bookings(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(page): Query<PageRequest>,
) -> Result<Json<BookingPage>, AppError> {
    Ok(Json(state.queries.my_bookings(&caller, &page).await?))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.queries.get_booking(&caller, id).await?))
}

async fn confirm_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.ledger.confirm_booking(&caller, id).await?))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.ledger.cancel_booking(&caller, id).await?))
}

async fn entry_qr(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<IssuedQr>, AppError> {
    Ok(Json(state.ledger.issue_entry_qr(&caller, id).await?))
}

async fn exit_qr(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<IssuedQr>, AppError> {
    Ok(Json(state.ledger.issue_exit_qr(&caller, id).await?))
}

async fn process_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<PaymentOutcome>, AppError> {
    Ok(Json(state.payments.process_booking_payment(&caller, id, &req.method).await?))
}

/// Status changes of the caller's own bookings.
async fn booking_stream(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let user_id = caller.account_id;
    notification_stream(state.notifications.subscribe(), move |notification| {
        matches!(notification, Notification::BookingUpdated(event) if event.user_id == user_id)
    })
}
