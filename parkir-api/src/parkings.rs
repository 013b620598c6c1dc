use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Extension, Json, Router,
};
use parkir_booking::{PageRequest, ParkingBookings, ParkingSpot};
use parkir_core::{Caller, LedgerError, LotStatus, ParkingDetails, ParkingLot, PerVehicle};
use parkir_inventory::NewParking;
use serde::Deserialize;
use uuid::Uuid;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    query: String,
    lat: Option<f64>,
    lng: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: LotStatus,
}

/// Browsing needs no session.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/parkings/search", get(search_parking))
        .route("/v1/parkings/{id}", get(get_parking))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/parkings", post(create_parking))
        .route("/v1/parkings/{id}", put(update_parking))
        .route("/v1/parkings/{id}/capacity", put(set_capacity))
        .route("/v1/parkings/{id}/status", put(set_status))
        .route("/v1/parkings/{id}/bookings", get(parking_bookings))
}

async fn search_parking(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ParkingSpot>>, AppError> {
    let position = match (params.lat, params.lng) {
        (Some(lat), Some(lng)) => Some((lat, lng)),
        (None, None) => None,
        _ => return Err(LedgerError::Validation("lat and lng must be given together".into()).into()),
    };
    let spots = state.queries.search_parking(&params.query, position).await?;
    Ok(Json(spots))
}

async fn get_parking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ParkingLot>, AppError> {
    Ok(Json(state.queries.get_parking(id).await?))
}

async fn create_parking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<NewParking>,
) -> Result<(StatusCode, Json<ParkingLot>), AppError> {
    let lot = state.parkings.create_parking(&caller, req).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

async fn update_parking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<ParkingDetails>,
) -> Result<Json<ParkingLot>, AppError> {
    Ok(Json(state.parkings.update_parking(&caller, id, req).await?))
}

async fn set_capacity(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<PerVehicle<u32>>,
) -> Result<Json<ParkingLot>, AppError> {
    Ok(Json(state.parkings.set_capacity(&caller, id, req).await?))
}

async fn set_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<ParkingLot>, AppError> {
    Ok(Json(state.parkings.set_status(&caller, id, req.status).await?))
}

async fn parking_bookings(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Query(page): Query<PageRequest>,
) -> Result<Json<ParkingBookings>, AppError> {
    Ok(Json(state.queries.parking_bookings(&caller, id, &page).await?))
}
