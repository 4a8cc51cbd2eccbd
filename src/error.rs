//! Error handling module
//!
//! Provides unified error types and handling for the entire application.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Query generation failed: {0}")]
    Generation(String),

    #[error("Schema introspection failed: {0}")]
    Introspection(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("No pending confirmation: {0}")]
    Confirmation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl AppError {
    /// Status, machine-readable code, user-facing message and optional details
    fn parts(&self) -> (StatusCode, &'static str, String, Option<String>) {
        match self {
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "POOL_EXHAUSTED",
                    "Database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Unauthorized(msg) => {
                warn!("Authentication failed: {}", msg);
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), None)
            }
            AppError::Forbidden(msg) => {
                info!("Request denied by policy: {}", msg);
                (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), None)
            }
            AppError::Generation(msg) => {
                error!("Generation error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "GENERATION_FAILED",
                    "The request could not be translated into a query".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Introspection(msg) => {
                error!("Introspection error: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "INTROSPECTION_FAILED",
                    "The database schema could not be read".to_string(),
                    Some(msg.clone()),
                )
            }
            AppError::Execution(msg) => {
                warn!("Execution error: {}", msg);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "EXECUTION_FAILED",
                    msg.clone(),
                    Some(msg.clone()),
                )
            }
            AppError::Confirmation(msg) => {
                warn!("Confirmation state error: {}", msg);
                (StatusCode::CONFLICT, "NO_PENDING_CONFIRMATION", msg.clone(), None)
            }
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                None,
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg.clone()),
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = self.parts();

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
        });

        (status, body).into_response()
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}
