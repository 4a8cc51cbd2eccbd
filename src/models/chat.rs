//! Mediation DTOs

use crate::db::service::ChatLogEntry;
use crate::mediation::{PendingConfirmation, SchemaDescriptor};
use crate::store::Row;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 2000, message = "Message must be 1-2000 characters"))]
    pub message: String,
}

/// Reply to a mediation request.
///
/// Exactly one shape is filled: executed (`data`), awaiting confirmation
/// (`requires_confirmation`), or denied (`denied`).
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub denied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub confirm: bool,
    /// Id from the awaiting-confirmation reply; guards against a stale dialog
    #[serde(default)]
    pub confirmation_id: Option<Uuid>,
    /// Text the client believes it is confirming; never executed
    #[serde(default)]
    pub sql: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
}

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub success: bool,
    pub pending: Option<PendingConfirmation>,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub fingerprint: String,
    #[serde(flatten)]
    pub schema: SchemaDescriptor,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<ChatLogEntry>,
}
