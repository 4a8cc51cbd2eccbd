// Database services for users and the conversation log
//
// These use bound parameters and the service's own statements; they are not
// part of the mediated query path.

use crate::auth::{Actor, Role};
use crate::db::queries::{
    FIND_USER_BY_EMAIL, INSERT_CHAT_LOG, LIST_CHAT_LOGS, LIST_CHAT_LOGS_FOR_SENDER,
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Sender recorded for replies produced by the service
pub const AGENT_SENDER: &str = "agent";

// User record from database
#[derive(Clone, Debug)]
pub struct DbUser {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

// User service for database operations
pub struct UserService {
    pool: Pool,
}

impl UserService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    // Find user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<DbUser>, AppError> {
        let client = self.pool.get().await?;

        let row = client.query_opt(FIND_USER_BY_EMAIL, &[&email]).await?;

        row.map(|r| {
            let role: String = r.get("role");
            Ok(DbUser {
                id: r.get("id"),
                name: r.get("name"),
                email: r.get("email"),
                password_hash: r.get("password_hash"),
                role: role.parse().map_err(AppError::Internal)?,
            })
        })
        .transpose()
    }
}

// One conversation log row
#[derive(Clone, Debug, Serialize)]
pub struct ChatLogEntry {
    pub id: i32,
    pub sender: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Value>,
}

/// Append-only conversation log.
///
/// `record` never fails the request; implementations swallow and report
/// their own write errors.
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn record(&self, sender: &str, message: &str, metadata: Option<Value>);

    /// Log visible to the actor: everything for admins, own rows otherwise
    async fn history(&self, actor: &Actor) -> Result<Vec<ChatLogEntry>, AppError>;
}

// Conversation log backed by the chat_logs table
pub struct ChatLogService {
    pool: Pool,
}

impl ChatLogService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn try_record(&self, sender: &str, message: &str, metadata: Option<Value>) -> Result<(), AppError> {
        let client = self.pool.get().await?;
        client
            .execute(INSERT_CHAT_LOG, &[&sender, &message, &metadata])
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConversationLog for ChatLogService {
    async fn record(&self, sender: &str, message: &str, metadata: Option<Value>) {
        if let Err(e) = self.try_record(sender, message, metadata).await {
            warn!("Failed to write conversation log: {}", e);
        }
    }

    async fn history(&self, actor: &Actor) -> Result<Vec<ChatLogEntry>, AppError> {
        let client = self.pool.get().await?;

        let rows = if actor.is_admin() {
            client.query(LIST_CHAT_LOGS, &[]).await?
        } else {
            client.query(LIST_CHAT_LOGS_FOR_SENDER, &[&actor.name]).await?
        };

        Ok(rows
            .into_iter()
            .map(|r| ChatLogEntry {
                id: r.get("id"),
                sender: r.get("sender"),
                message: r.get("message"),
                timestamp: r.get("timestamp"),
                metadata: r.get("metadata"),
            })
            .collect())
    }
}
