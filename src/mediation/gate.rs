//! Confirmation Gate
//!
//! Holds at most one destructive query per session until the human who saw
//! it confirms or cancels. Entries are single-use: resolving one removes it
//! under the same write lock that read it, so two racing confirms cannot
//! both execute.

use crate::auth::Actor;
use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// A destructive query waiting for a human decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    pub id: Uuid,
    /// Exact text shown to the human and later executed
    pub query: String,
    pub actor_id: i32,
    pub actor_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Per-session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Pending(PendingConfirmation),
}

pub struct ConfirmationGate {
    pending: Arc<RwLock<HashMap<Uuid, PendingConfirmation>>>,
    ttl: Duration,
}

impl ConfirmationGate {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::minutes(5)),
        }
    }

    /// Hold `query` for the actor's session, replacing anything held before
    pub async fn park(&self, actor: &Actor, query: String) -> PendingConfirmation {
        let now = Utc::now();
        let entry = PendingConfirmation {
            id: Uuid::new_v4(),
            query,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        };

        let mut pending = self.pending.write().await;
        pending.retain(|_, p| !p.is_expired());
        if let Some(previous) = pending.insert(actor.session_id, entry.clone()) {
            info!("Confirmation {} superseded by {}", previous.id, entry.id);
        }

        entry
    }

    /// Drop whatever the session holds; a new request supersedes an unanswered one
    pub async fn discard(&self, session_id: Uuid) -> Option<PendingConfirmation> {
        let removed = self.pending.write().await.remove(&session_id);
        if let Some(entry) = &removed {
            debug!("Discarded unanswered confirmation {}", entry.id);
        }
        removed
    }

    /// Remove and return the session's pending query for execution
    pub async fn take(&self, actor: &Actor, expected: Option<Uuid>) -> Result<PendingConfirmation, AppError> {
        self.resolve(actor, expected).await
    }

    /// Remove the session's pending query without running it
    pub async fn cancel(&self, actor: &Actor, expected: Option<Uuid>) -> Result<PendingConfirmation, AppError> {
        let entry = self.resolve(actor, expected).await?;
        info!("Confirmation {} cancelled by actor {}", entry.id, actor.id);
        Ok(entry)
    }

    pub async fn state(&self, session_id: Uuid) -> GateState {
        match self.pending.read().await.get(&session_id) {
            Some(entry) if !entry.is_expired() => GateState::Pending(entry.clone()),
            _ => GateState::Idle,
        }
    }

    async fn resolve(&self, actor: &Actor, expected: Option<Uuid>) -> Result<PendingConfirmation, AppError> {
        let mut pending = self.pending.write().await;

        let entry = pending
            .get(&actor.session_id)
            .ok_or_else(|| AppError::Confirmation("no query is awaiting confirmation".to_string()))?;

        if entry.is_expired() {
            pending.remove(&actor.session_id);
            return Err(AppError::Confirmation(
                "the pending query expired; submit the request again".to_string(),
            ));
        }
        if entry.actor_id != actor.id {
            return Err(AppError::Confirmation(
                "the pending query belongs to another actor".to_string(),
            ));
        }
        if expected.is_some_and(|id| id != entry.id) {
            return Err(AppError::Confirmation(
                "confirmation does not match the pending query".to_string(),
            ));
        }

        pending
            .remove(&actor.session_id)
            .ok_or_else(|| AppError::Internal("pending entry vanished under lock".to_string()))
    }
}
