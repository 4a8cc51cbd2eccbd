//! Authentication route handlers
//!
//! Login against the seeded accounts and a token introspection endpoint.

use crate::auth::{verify_password, Actor};
use crate::error::{validation_error, ApiResult, AppError};
use crate::models::{AuthResponse, LoginRequest, MeResponse, UserResponse};
use crate::state::SharedState;
use axum::{extract::State, Extension, Json};
use tracing::info;
use validator::Validate;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// POST /api/auth/login
///
/// Authenticate with email and password, receive a bearer token.
pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate().map_err(|e| validation_error(e.to_string()))?;

    let user = state
        .users
        .find_by_email(&req.email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    let token = state.jwt.issue(user.id, &user.name, &user.email, user.role)?;
    info!("User {} logged in ({})", user.id, user.role);

    Ok(Json(AuthResponse {
        success: true,
        user: UserResponse::from(&user),
        token,
    }))
}

/// GET /api/auth/me
pub async fn me(Extension(actor): Extension<Actor>) -> Json<MeResponse> {
    Json(MeResponse {
        success: true,
        user: UserResponse::from(&actor),
    })
}
