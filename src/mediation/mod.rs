//! Query Mediation Engine
//!
//! One mediation cycle: describe the live schema, ask the generation
//! collaborator for a candidate query, authorize it against the actor's role,
//! then either execute it or park it behind the confirmation gate.
//!
//! - [`introspect`]: live table and column names
//! - [`classifier`]: safe / destructive by leading verb
//! - [`policy`]: allow, rewrite, confirm or deny
//! - [`gate`]: per-session pending confirmations
//! - [`executor`]: verbatim execution against the store

pub mod classifier;
pub mod executor;
pub mod gate;
pub mod introspect;
pub mod policy;

pub use executor::{ExecutionResult, Executor};
pub use gate::{ConfirmationGate, GateState, PendingConfirmation};
pub use introspect::{SchemaDescriptor, SchemaIntrospector};
pub use policy::{AuthDecision, AuthorizationPolicy};

use crate::auth::Actor;
use crate::config::MediationConfig;
use crate::error::AppError;
use crate::generator::QueryGenerator;
use crate::store::QueryStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of one mediation cycle
#[derive(Debug, Clone, PartialEq)]
pub enum MediationOutcome {
    /// The query ran; `sql` is the text actually executed
    Executed { sql: String, result: ExecutionResult },
    /// A destructive query is waiting for the human
    AwaitingConfirmation(PendingConfirmation),
    /// The policy refused the query
    Denied { sql: String, reason: String },
}

pub struct Mediator {
    store: Arc<dyn QueryStore>,
    generator: Arc<dyn QueryGenerator>,
    policy: AuthorizationPolicy,
    gate: ConfirmationGate,
    executor: Executor,
}

impl Mediator {
    pub fn new(
        store: Arc<dyn QueryStore>,
        generator: Arc<dyn QueryGenerator>,
        config: &MediationConfig,
    ) -> Self {
        Self {
            executor: Executor::new(Arc::clone(&store), config.statement_timeout),
            policy: AuthorizationPolicy::new(config.scoped_tables.clone()),
            gate: ConfirmationGate::new(config.confirmation_ttl),
            store,
            generator,
        }
    }

    pub async fn describe_schema(&self) -> Result<SchemaDescriptor, AppError> {
        SchemaIntrospector::describe(self.store.as_ref()).await
    }

    /// Run a full cycle for a natural-language request
    pub async fn mediate(&self, message: &str, actor: &Actor) -> Result<MediationOutcome, AppError> {
        self.gate.discard(actor.session_id).await;

        let schema = self.describe_schema().await?;
        let candidate = self.generator.generate(message, &schema).await?;

        self.submit(&candidate, actor).await
    }

    /// Authorize a candidate query and act on the decision
    pub async fn submit(&self, candidate: &str, actor: &Actor) -> Result<MediationOutcome, AppError> {
        match self.policy.authorize(candidate, actor) {
            AuthDecision::Allow(sql) => {
                let result = self.executor.execute(&sql).await?;
                Ok(MediationOutcome::Executed { sql, result })
            }
            AuthDecision::RequireConfirmation(sql) => {
                let pending = self.gate.park(actor, sql).await;
                info!("Destructive query held for confirmation {}", pending.id);
                Ok(MediationOutcome::AwaitingConfirmation(pending))
            }
            AuthDecision::Deny(reason) => {
                info!("Query denied for actor {} ({}): {}", actor.id, actor.role, reason);
                Ok(MediationOutcome::Denied {
                    sql: candidate.to_string(),
                    reason,
                })
            }
        }
    }

    /// Execute the session's held query.
    ///
    /// Only the text captured when the query was parked is ever run;
    /// `supplied_sql` is compared for logging and otherwise ignored.
    pub async fn confirm(
        &self,
        actor: &Actor,
        expected: Option<Uuid>,
        supplied_sql: Option<&str>,
    ) -> Result<(PendingConfirmation, ExecutionResult), AppError> {
        let pending = self.gate.take(actor, expected).await?;

        if let Some(supplied) = supplied_sql {
            if supplied.trim() != pending.query.trim() {
                warn!(
                    "Confirmation {} supplied different text; executing the held query",
                    pending.id
                );
            }
        }

        let sql = match self.policy.authorize(&pending.query, actor) {
            AuthDecision::Allow(sql) | AuthDecision::RequireConfirmation(sql) => sql,
            AuthDecision::Deny(reason) => return Err(AppError::Forbidden(reason)),
        };

        let result = self.executor.execute(&sql).await?;
        info!(
            "Confirmation {} executed by actor {} ({} rows)",
            pending.id,
            actor.id,
            result.row_count()
        );

        Ok((pending, result))
    }

    pub async fn cancel(&self, actor: &Actor, expected: Option<Uuid>) -> Result<PendingConfirmation, AppError> {
        self.gate.cancel(actor, expected).await
    }

    pub async fn pending(&self, actor: &Actor) -> Option<PendingConfirmation> {
        match self.gate.state(actor.session_id).await {
            GateState::Pending(entry) if entry.actor_id == actor.id => Some(entry),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::testing::{actor, mediator, CannedGenerator, RecordingStore};
    use serde_json::json;

    fn shop_store() -> RecordingStore {
        RecordingStore::new()
            .with_table("products", &["id", "name", "price", "stock"])
            .with_table("chat_logs", &["id", "sender", "message", "timestamp", "metadata"])
    }

    #[tokio::test]
    async fn test_user_read_of_chat_logs_is_scoped() {
        let store = Arc::new(shop_store().with_rows(
            "SELECT * FROM (SELECT * FROM chat_logs WHERE sender = 'Bob User')",
            vec![json!({"id": 4, "sender": "Bob User", "message": "hi"})],
        ));
        let mediator = mediator(store.clone(), CannedGenerator::new("SELECT * FROM chat_logs"));
        let bob = actor(Role::User, "Bob User");

        let outcome = mediator.mediate("show my messages", &bob).await.unwrap();

        let MediationOutcome::Executed { sql, result } = outcome else {
            panic!("expected execution");
        };
        assert_eq!(sql, "SELECT * FROM (SELECT * FROM chat_logs WHERE sender = 'Bob User')");
        assert_eq!(result.row_count(), 1);
        assert_eq!(store.executed(), vec![sql]);
    }

    #[tokio::test]
    async fn test_user_write_is_denied_without_store_access() {
        let store = Arc::new(shop_store());
        let mediator = mediator(store.clone(), CannedGenerator::new("DELETE FROM products"));
        let bob = actor(Role::User, "Bob User");

        let outcome = mediator.mediate("remove all products", &bob).await.unwrap();

        assert_eq!(
            outcome,
            MediationOutcome::Denied {
                sql: "DELETE FROM products".to_string(),
                reason: policy::READ_ONLY_DENIAL.to_string(),
            }
        );
        assert!(store.executed().is_empty());
        assert_eq!(mediator.pending(&bob).await, None);
    }

    #[tokio::test]
    async fn test_admin_drop_then_cancel() {
        let store = Arc::new(shop_store());
        let mediator = mediator(store.clone(), CannedGenerator::new("DROP TABLE products"));
        let alice = actor(Role::Admin, "Alice Admin");

        let outcome = mediator.mediate("drop the products table", &alice).await.unwrap();
        let MediationOutcome::AwaitingConfirmation(pending) = outcome else {
            panic!("expected a pending confirmation");
        };
        assert_eq!(pending.query, "DROP TABLE products");

        let cancelled = mediator.cancel(&alice, Some(pending.id)).await.unwrap();
        assert_eq!(cancelled.id, pending.id);
        assert!(store.executed().is_empty());
        assert_eq!(mediator.pending(&alice).await, None);
    }

    #[tokio::test]
    async fn test_admin_drop_then_confirm_runs_once() {
        let store = Arc::new(shop_store());
        let mediator = mediator(store.clone(), CannedGenerator::new("DROP TABLE products"));
        let alice = actor(Role::Admin, "Alice Admin");

        mediator.mediate("drop the products table", &alice).await.unwrap();
        let (pending, _) = mediator.confirm(&alice, None, None).await.unwrap();

        assert_eq!(pending.query, "DROP TABLE products");
        assert_eq!(store.executed(), vec!["DROP TABLE products"]);

        let again = mediator.confirm(&alice, None, None).await;
        assert!(matches!(again, Err(AppError::Confirmation(_))));
        assert_eq!(store.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_confirm_ignores_substituted_text() {
        let store = Arc::new(shop_store());
        let mediator = mediator(store.clone(), CannedGenerator::new("DELETE FROM products WHERE id = 3"));
        let alice = actor(Role::Admin, "Alice Admin");

        mediator.mediate("delete product 3", &alice).await.unwrap();
        mediator
            .confirm(&alice, None, Some("DROP TABLE users"))
            .await
            .unwrap();

        assert_eq!(store.executed(), vec!["DELETE FROM products WHERE id = 3"]);
    }

    #[tokio::test]
    async fn test_new_request_discards_unanswered_confirmation() {
        let store = Arc::new(shop_store());
        let generator = CannedGenerator::sequence(&["DROP TABLE products", "SELECT * FROM products"]);
        let mediator = mediator(store.clone(), generator);
        let alice = actor(Role::Admin, "Alice Admin");

        mediator.mediate("drop products", &alice).await.unwrap();
        mediator.mediate("list products", &alice).await.unwrap();

        assert!(matches!(
            mediator.confirm(&alice, None, None).await,
            Err(AppError::Confirmation(_))
        ));
        assert_eq!(store.executed(), vec!["SELECT * FROM products"]);
    }

    #[tokio::test]
    async fn test_confirm_without_pending_is_state_error() {
        let mediator = mediator(Arc::new(shop_store()), CannedGenerator::new("SELECT 1"));
        let alice = actor(Role::Admin, "Alice Admin");

        assert!(matches!(
            mediator.confirm(&alice, None, None).await,
            Err(AppError::Confirmation(_))
        ));
        assert!(matches!(
            mediator.cancel(&alice, None).await,
            Err(AppError::Confirmation(_))
        ));
    }

    #[tokio::test]
    async fn test_introspection_failure_blocks_cycle() {
        let store = Arc::new(RecordingStore::new().unavailable());
        let generator = CannedGenerator::new("SELECT 1");
        let mediator = mediator(store.clone(), generator.clone());
        let bob = actor(Role::User, "Bob User");

        let result = mediator.mediate("anything", &bob).await;

        assert!(matches!(result, Err(AppError::Introspection(_))));
        assert_eq!(generator.calls(), 0);
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn test_generation_failure_executes_nothing() {
        let store = Arc::new(shop_store());
        let mediator = mediator(store.clone(), CannedGenerator::failing("provider returned 500"));
        let bob = actor(Role::User, "Bob User");

        let result = mediator.mediate("anything", &bob).await;

        assert!(matches!(result, Err(AppError::Generation(_))));
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn test_generator_sees_live_schema() {
        let store = Arc::new(shop_store());
        let generator = CannedGenerator::new("SELECT * FROM imported_sales");
        let mediator = mediator(store.clone(), generator.clone());
        let bob = actor(Role::User, "Bob User");

        store.add_table("imported_sales", &["id", "amount"]);
        mediator.mediate("show imported sales", &bob).await.unwrap();

        let seen = generator.last_schema().unwrap();
        assert!(seen.tables.iter().any(|t| t.name == "imported_sales"));
        assert_eq!(store.executed(), vec!["SELECT * FROM imported_sales"]);
    }
}
