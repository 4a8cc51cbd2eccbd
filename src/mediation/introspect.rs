//! Schema Introspection
//!
//! Reads the live table and column names that the generation collaborator
//! is prompted with. Nothing is cached: every mediation cycle describes the
//! store again, so tables created moments ago are already visible.

use crate::error::AppError;
use crate::store::QueryStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

/// One table and its columns in ordinal order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Ordered `(table, columns)` pairs as currently held by the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableSchema>,
}

impl SchemaDescriptor {
    /// Render as the bullet list used in generation prompts
    pub fn to_prompt(&self) -> String {
        self.tables
            .iter()
            .map(|t| format!("- {} ({})", t.name, t.columns.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Content hash, stable for identical table and column lists
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for table in &self.tables {
            hasher.update(table.name.as_bytes());
            for column in &table.columns {
                hasher.update(b".");
                hasher.update(column.as_bytes());
            }
            hasher.update(b";");
        }
        format!("{:x}", hasher.finalize())
    }
}

pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Describe every user table of the store
    pub async fn describe(store: &dyn QueryStore) -> Result<SchemaDescriptor, AppError> {
        let names = store
            .list_tables()
            .await
            .map_err(|e| AppError::Introspection(e.to_string()))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = store
                .list_columns(&name)
                .await
                .map_err(|e| AppError::Introspection(e.to_string()))?;
            tables.push(TableSchema { name, columns });
        }

        let descriptor = SchemaDescriptor { tables };
        debug!(
            "Introspected {} tables (fingerprint {})",
            descriptor.tables.len(),
            &descriptor.fingerprint()[..12]
        );

        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingStore;

    #[tokio::test]
    async fn test_describe_reports_tables_in_store_order() {
        let store = RecordingStore::new()
            .with_table("users", &["id", "name", "email", "password_hash", "role"])
            .with_table("products", &["id", "name", "price", "stock"]);

        let schema = SchemaIntrospector::describe(&store).await.unwrap();

        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.tables[0].name, "users");
        assert_eq!(schema.tables[1].columns, vec!["id", "name", "price", "stock"]);
        assert!(store.executed().is_empty());
    }

    #[tokio::test]
    async fn test_new_table_visible_on_next_describe() {
        let store = RecordingStore::new().with_table("products", &["id", "name"]);
        let before = SchemaIntrospector::describe(&store).await.unwrap();

        store.add_table("imported_sales", &["id", "amount"]);
        let after = SchemaIntrospector::describe(&store).await.unwrap();

        assert_eq!(before.tables.len(), 1);
        assert_eq!(after.tables.len(), 2);
        assert_ne!(before.fingerprint(), after.fingerprint());
    }

    #[tokio::test]
    async fn test_unavailable_store_is_introspection_failure() {
        let store = RecordingStore::new().unavailable();
        let result = SchemaIntrospector::describe(&store).await;
        assert!(matches!(result, Err(AppError::Introspection(_))));
    }

    #[test]
    fn test_prompt_rendering() {
        let schema = SchemaDescriptor {
            tables: vec![TableSchema {
                name: "chat_logs".to_string(),
                columns: vec!["id".to_string(), "sender".to_string()],
            }],
        };
        assert_eq!(schema.to_prompt(), "- chat_logs (id, sender)");
    }
}
