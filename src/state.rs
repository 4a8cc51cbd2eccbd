//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::auth::JwtKeys;
use crate::config::Settings;
use crate::db::service::{ChatLogService, ConversationLog, UserService};
use crate::error::AppError;
use crate::generator::{OpenRouterGenerator, QueryGenerator};
use crate::mediation::Mediator;
use crate::store::{PgStore, QueryStore};
use deadpool_postgres::Pool;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Database connection pool (required)
    pub db_pool: Pool,

    /// Account lookups for login
    pub users: UserService,

    /// Conversation log
    pub chat_log: Arc<dyn ConversationLog>,

    /// Query mediation engine; owns the confirmation gate
    pub mediator: Mediator,

    /// Token signing keys
    pub jwt: JwtKeys,
}

impl AppState {
    /// Wire the live collaborators: the pooled PostgreSQL store and the HTTP generator
    pub fn new(pool: Pool, settings: &Settings) -> Result<Self, AppError> {
        let store: Arc<dyn QueryStore> = Arc::new(PgStore::new(pool.clone()));
        let generator: Arc<dyn QueryGenerator> = Arc::new(OpenRouterGenerator::new(&settings.generation)?);

        Ok(Self::from_parts(
            pool,
            Mediator::new(store, generator, &settings.mediation),
            JwtKeys::from_config(&settings.auth),
        ))
    }

    pub fn from_parts(pool: Pool, mediator: Mediator, jwt: JwtKeys) -> Self {
        Self {
            users: UserService::new(pool.clone()),
            chat_log: Arc::new(ChatLogService::new(pool.clone())),
            db_pool: pool,
            mediator,
            jwt,
        }
    }

    /// Replace the conversation log sink
    pub fn with_chat_log(mut self, chat_log: Arc<dyn ConversationLog>) -> Self {
        self.chat_log = chat_log;
        self
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
