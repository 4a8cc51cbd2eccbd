//! Shared relational store
//!
//! Every mediation component reaches the database through [`QueryStore`], so
//! the PostgreSQL pool can be swapped for an in-memory double in tests.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use deadpool_postgres::Pool;
use postgres_types::{FromSql, Kind, Type};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// One result row: column name to value, in select-list order
pub type Row = Map<String, Value>;

/// Store-level failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// No connection could be obtained
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the statement (syntax, constraint, type)
    #[error("{0}")]
    Rejected(String),
}

impl From<deadpool_postgres::PoolError> for StoreError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl From<tokio_postgres::Error> for StoreError {
    fn from(e: tokio_postgres::Error) -> Self {
        // Prefer the server's own message over the generic "db error" wrapper
        match e.as_db_error() {
            Some(db) => StoreError::Rejected(db.message().to_string()),
            None if e.is_closed() => StoreError::Unavailable(e.to_string()),
            None => StoreError::Rejected(e.to_string()),
        }
    }
}

#[async_trait]
pub trait QueryStore: Send + Sync {
    /// User tables in catalog order; tables outside `public` are schema-qualified
    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Column names of one table in ordinal order
    async fn list_columns(&self, table: &str) -> Result<Vec<String>, StoreError>;

    /// Run a single statement verbatim
    async fn run(&self, sql: &str) -> Result<Vec<Row>, StoreError>;
}

const LIST_USER_TABLES: &str = r#"
    SELECT table_schema, table_name
    FROM information_schema.tables
    WHERE table_type = 'BASE TABLE'
      AND table_schema NOT IN ('pg_catalog', 'information_schema')
      AND table_schema NOT LIKE 'pg_toast%'
    ORDER BY table_schema, table_name
"#;

const LIST_TABLE_COLUMNS: &str = r#"
    SELECT column_name
    FROM information_schema.columns
    WHERE table_schema = $1 AND table_name = $2
    ORDER BY ordinal_position
"#;

/// PostgreSQL-backed store
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryStore for PgStore {
    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client.query(LIST_USER_TABLES, &[]).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let schema: String = row.get("table_schema");
                let name: String = row.get("table_name");
                if schema == "public" {
                    name
                } else {
                    format!("{}.{}", schema, name)
                }
            })
            .collect())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let (schema, name) = table.split_once('.').unwrap_or(("public", table));

        let client = self.pool.get().await?;
        let rows = client.query(LIST_TABLE_COLUMNS, &[&schema, &name]).await?;

        Ok(rows.iter().map(|row| row.get("column_name")).collect())
    }

    async fn run(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        let client = self.pool.get().await?;

        // Extended protocol: the server refuses more than one statement
        let rows = client.query(sql, &[]).await?;
        debug!("Statement returned {} rows", rows.len());

        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Convert a driver row into a JSON object.
///
/// Keys keep select-list order. A column name that appears twice keeps the
/// value of its last occurrence.
fn row_to_json(row: &tokio_postgres::Row) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name().to_string(), column_value(row, idx, column.type_())))
        .collect()
}

fn column_value(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    match row.try_get::<_, Option<WireValue>>(idx) {
        Ok(Some(WireValue(raw))) => decode(ty, raw),
        Ok(None) => Value::Null,
        Err(e) => {
            debug!("Column {} could not be read: {}", idx, e);
            Value::Null
        }
    }
}

/// A column value as sent by the server, before any type decoding
struct WireValue<'a>(&'a [u8]);

impl<'a> FromSql<'a> for WireValue<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(WireValue(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

type BoxError = Box<dyn std::error::Error + Sync + Send>;

/// JSON for one binary-format value. Types without a mapping, and values a
/// mapping cannot read (such as `NaN` numerics), come back as `\x` hex
/// text rather than null.
fn decode(ty: &Type, raw: &[u8]) -> Value {
    match try_decode(ty, raw) {
        Ok(value) => value,
        Err(e) => {
            debug!("No JSON mapping for a {} value ({}); returning raw bytes", ty, e);
            hex_text(raw)
        }
    }
}

fn try_decode(ty: &Type, raw: &[u8]) -> Result<Value, BoxError> {
    if let Kind::Array(member) = ty.kind() {
        let items = Vec::<Option<WireValue>>::from_sql(ty, raw)?;
        return Ok(Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, |WireValue(raw)| decode(member, raw)))
                .collect(),
        ));
    }

    let value = if *ty == Type::BOOL {
        Value::from(bool::from_sql(ty, raw)?)
    } else if *ty == Type::INT2 {
        Value::from(i16::from_sql(ty, raw)?)
    } else if *ty == Type::INT4 {
        Value::from(i32::from_sql(ty, raw)?)
    } else if *ty == Type::INT8 {
        Value::from(i64::from_sql(ty, raw)?)
    } else if *ty == Type::OID {
        Value::from(u32::from_sql(ty, raw)?)
    } else if *ty == Type::FLOAT4 {
        Value::from(f32::from_sql(ty, raw)?)
    } else if *ty == Type::FLOAT8 {
        Value::from(f64::from_sql(ty, raw)?)
    } else if *ty == Type::NUMERIC {
        // Exact decimal text; a JSON number would round through f64
        Value::String(Decimal::from_sql(ty, raw)?.to_string())
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        Value::from_sql(ty, raw)?
    } else if *ty == Type::UUID {
        Value::String(Uuid::from_sql(ty, raw)?.to_string())
    } else if *ty == Type::TIMESTAMPTZ {
        serde_json::to_value(DateTime::<Utc>::from_sql(ty, raw)?)?
    } else if *ty == Type::TIMESTAMP {
        serde_json::to_value(NaiveDateTime::from_sql(ty, raw)?)?
    } else if *ty == Type::DATE {
        serde_json::to_value(NaiveDate::from_sql(ty, raw)?)?
    } else if *ty == Type::TIME {
        serde_json::to_value(NaiveTime::from_sql(ty, raw)?)?
    } else if *ty == Type::INTERVAL {
        interval_value(raw)?
    } else if *ty == Type::BYTEA {
        hex_text(raw)
    } else if matches!(ty.kind(), Kind::Enum(_)) || <String as FromSql>::accepts(ty) {
        // Enum labels and text types travel as UTF-8
        Value::String(String::from_sql(ty, raw)?)
    } else {
        return Err(format!("unsupported type {}", ty).into());
    };

    Ok(value)
}

/// `INTERVAL` wire format: microseconds, days, months
fn interval_value(raw: &[u8]) -> Result<Value, BoxError> {
    let raw: [u8; 16] = raw.try_into()?;
    let microseconds = i64::from_be_bytes(raw[0..8].try_into()?);
    let days = i32::from_be_bytes(raw[8..12].try_into()?);
    let months = i32::from_be_bytes(raw[12..16].try_into()?);

    Ok(json!({ "months": months, "days": days, "microseconds": microseconds }))
}

fn hex_text(raw: &[u8]) -> Value {
    let mut text = String::with_capacity(2 + raw.len() * 2);
    text.push_str("\\x");
    for byte in raw {
        text.push_str(&format!("{:02x}", byte));
    }
    Value::String(text)
}
