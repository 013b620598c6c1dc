use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use parkir_booking::{NewAccount, Session};
use parkir_core::{Account, Caller};
use serde::Deserialize;
use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct GoogleLoginRequest {
    id_token: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/auth/register", post(register))
        .route("/v1/auth/login", post(login))
        .route("/v1/auth/google", post(login_google))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new().route("/v1/accounts/me", get(me))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let account = state.accounts.register(req).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<Session>, AppError> {
    let session = state.accounts.authenticate(&req.email, &req.password).await?;
    Ok(Json(session))
}

async fn login_google(
    State(state): State<AppState>,
    Json(req): Json<GoogleLoginRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state.accounts.login_google(&req.id_token).await?;
    Ok(Json(session))
}

async fn me(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> Result<Json<Account>, AppError> {
    Ok(Json(state.accounts.get_account(&caller).await?))
}
