//! Authentication middleware
//!
//! Extracts and validates bearer tokens, then hands the decoded actor to
//! handlers through request extensions.

use crate::auth::Actor;
use crate::error::AppError;
use crate::state::SharedState;
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

/// Decode the bearer token and attach the actor to the request
pub async fn auth_middleware(
    State(state): State<SharedState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) = bearer.map_err(|rejection| {
        if rejection.is_missing() {
            AppError::Unauthorized("Missing authorization header".to_string())
        } else {
            AppError::Unauthorized("Invalid authorization format".to_string())
        }
    })?;

    let claims = state.jwt.decode(bearer.token())?;

    request.extensions_mut().insert(Actor::from(claims));

    Ok(next.run(request).await)
}
