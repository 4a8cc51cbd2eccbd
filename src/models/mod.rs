//! Data models and DTOs (Data Transfer Objects)
//!
//! Contains all request/response structures used by the API.

pub mod auth;
pub mod chat;

// Re-export commonly used types
pub use auth::*;
pub use chat::*;
