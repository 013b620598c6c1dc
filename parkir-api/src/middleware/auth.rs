use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use parkir_core::LedgerError;

use crate::{error::AppError, state::AppState};

/// Resolves the bearer session into a `Caller` for the handlers behind it.
pub async fn session_auth_middleware(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|_| LedgerError::unauthenticated())?;

    let caller = state.accounts.sessions().verify(bearer.token())?;
    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}
