//! Executor
//!
//! Runs the final, already-authorized text verbatim. No rewriting and no
//! retries happen here: a failed destructive statement must not be re-run
//! behind the human's back.

use crate::error::AppError;
use crate::store::{QueryStore, Row, StoreError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Time the server gets to report its own statement timeout before the
/// client stops waiting
const CLIENT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
}

impl ExecutionResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

pub struct Executor {
    store: Arc<dyn QueryStore>,
    timeout: Duration,
}

impl Executor {
    pub fn new(store: Arc<dyn QueryStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Run `sql` once. The statement timeout itself is enforced by the
    /// store session; the wait here only guards against a store that never
    /// answers, in which case the outcome is unknown.
    pub async fn execute(&self, sql: &str) -> Result<ExecutionResult, AppError> {
        debug!("Executing: {}", sql);

        let deadline = self.timeout + CLIENT_GRACE;
        let rows = tokio::time::timeout(deadline, self.store.run(sql))
            .await
            .map_err(|_| {
                warn!("Store gave no answer within {:?}", deadline);
                AppError::Execution(format!(
                    "no answer from the database within {} seconds; the statement may still have completed",
                    deadline.as_secs()
                ))
            })?
            .map_err(|e| match e {
                StoreError::Rejected(msg) => AppError::Execution(msg),
                unavailable @ StoreError::Unavailable(_) => AppError::Execution(unavailable.to_string()),
            })?;

        debug!("Statement returned {} rows", rows.len());
        Ok(ExecutionResult { rows })
    }
}
