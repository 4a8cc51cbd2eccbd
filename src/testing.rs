//! Test doubles shared by unit tests

use crate::auth::{Actor, JwtKeys, Role};
use crate::config::{DatabaseConfig, MediationConfig};
use crate::db::create_pool;
use crate::db::service::{ChatLogEntry, ConversationLog};
use crate::error::AppError;
use crate::generator::QueryGenerator;
use crate::mediation::{Mediator, SchemaDescriptor};
use crate::state::{AppState, SharedState};
use crate::store::{QueryStore, Row, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Actor with a fresh session; admins get id 1, users id 2
pub fn actor(role: Role, name: &str) -> Actor {
    Actor {
        id: if role.is_admin() { 1 } else { 2 },
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        role,
        session_id: Uuid::new_v4(),
    }
}

pub fn mediator(store: Arc<RecordingStore>, generator: CannedGenerator) -> Mediator {
    Mediator::new(store, Arc::new(generator), &MediationConfig::default())
}

/// Application state around the doubles, logging into a fresh [`RecordingLog`]
pub fn state_with(store: Arc<RecordingStore>, generator: CannedGenerator) -> SharedState {
    state_with_log(store, generator, Arc::new(RecordingLog::default()))
}

/// Application state around the doubles.
///
/// The pool points at a closed port and is never used by the doubles.
pub fn state_with_log(
    store: Arc<RecordingStore>,
    generator: CannedGenerator,
    log: Arc<RecordingLog>,
) -> SharedState {
    let database = DatabaseConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        ..Default::default()
    };
    let pool = create_pool(&database, MediationConfig::default().statement_timeout).unwrap();

    Arc::new(AppState::from_parts(
        pool,
        mediator(store, generator),
        JwtKeys::new(b"test-secret", 60),
    )
    .with_chat_log(log))
}

/// One recorded conversation log write
#[derive(Clone, Debug, PartialEq)]
pub struct LoggedMessage {
    pub sender: String,
    pub message: String,
    pub metadata: Option<Value>,
}

/// Conversation log double keeping every write in memory
#[derive(Default)]
pub struct RecordingLog {
    messages: Mutex<Vec<LoggedMessage>>,
}

impl RecordingLog {
    pub fn messages(&self) -> Vec<LoggedMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Metadata of the most recent write
    pub fn last_metadata(&self) -> Option<Value> {
        self.messages.lock().unwrap().last().and_then(|m| m.metadata.clone())
    }
}

#[async_trait]
impl ConversationLog for RecordingLog {
    async fn record(&self, sender: &str, message: &str, metadata: Option<Value>) {
        self.messages.lock().unwrap().push(LoggedMessage {
            sender: sender.to_string(),
            message: message.to_string(),
            metadata,
        });
    }

    async fn history(&self, actor: &Actor) -> Result<Vec<ChatLogEntry>, AppError> {
        Ok(self
            .messages()
            .into_iter()
            .enumerate()
            .filter(|(_, m)| actor.is_admin() || m.sender == actor.name)
            .map(|(i, m)| ChatLogEntry {
                id: i as i32 + 1,
                sender: m.sender,
                message: m.message,
                timestamp: chrono::Utc::now(),
                metadata: m.metadata,
            })
            .collect())
    }
}

/// In-memory store that records every executed statement
#[derive(Default)]
pub struct RecordingStore {
    tables: Mutex<Vec<(String, Vec<String>)>>,
    rows: Mutex<HashMap<String, Vec<Row>>>,
    executed: Mutex<Vec<String>>,
    rejection: Option<String>,
    unavailable: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, columns: &[&str]) -> Self {
        self.add_table(name, columns);
        self
    }

    /// Canned result for one exact statement text
    pub fn with_rows(self, sql: &str, rows: Vec<Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.rows.lock().unwrap().insert(sql.to_string(), rows);
        self
    }

    /// Every statement is rejected with `message`
    pub fn rejecting(mut self, message: &str) -> Self {
        self.rejection = Some(message.to_string());
        self
    }

    /// Every call fails as if the connection were down
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn add_table(&self, name: &str, columns: &[&str]) {
        self.tables.lock().unwrap().push((
            name.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        ));
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryStore for RecordingStore {
    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(self.tables.lock().unwrap().iter().map(|(n, _)| n.clone()).collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == table)
            .map(|(_, c)| c.clone())
            .unwrap_or_default())
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(message) = &self.rejection {
            return Err(StoreError::Rejected(message.clone()));
        }
        Ok(self.rows.lock().unwrap().get(sql).cloned().unwrap_or_default())
    }
}

/// Generator double replaying scripted replies in order (the last one repeats)
#[derive(Clone)]
pub struct CannedGenerator {
    replies: Arc<Vec<Result<String, String>>>,
    calls: Arc<Mutex<usize>>,
    last_schema: Arc<Mutex<Option<SchemaDescriptor>>>,
}

impl CannedGenerator {
    pub fn new(sql: &str) -> Self {
        Self::sequence(&[sql])
    }

    pub fn sequence(sqls: &[&str]) -> Self {
        Self::from_replies(sqls.iter().map(|s| Ok(s.to_string())).collect())
    }

    pub fn failing(message: &str) -> Self {
        Self::from_replies(vec![Err(message.to_string())])
    }

    fn from_replies(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Arc::new(replies),
            calls: Arc::new(Mutex::new(0)),
            last_schema: Arc::new(Mutex::new(None)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }

    pub fn last_schema(&self) -> Option<SchemaDescriptor> {
        self.last_schema.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryGenerator for CannedGenerator {
    async fn generate(&self, _message: &str, schema: &SchemaDescriptor) -> Result<String, AppError> {
        *self.last_schema.lock().unwrap() = Some(schema.clone());
        let call = {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            *calls - 1
        };
        let reply = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_else(|| Err("no scripted reply".to_string()));
        reply.map_err(AppError::Generation)
    }
}
