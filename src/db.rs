//! Database connection management
//!
//! Builds the connection pool and prepares the tables the service itself
//! relies on (users, conversation log) plus the demo catalogue.

pub mod queries;
pub mod service;

use crate::auth::hash_password;
use crate::config::DatabaseConfig;
use anyhow::Context;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::info;

/// Startup options for every pooled session. The server enforces the
/// statement timeout, so a statement that overruns is cancelled there and
/// cannot commit after the caller gave up on it.
pub fn session_options(statement_timeout: Duration) -> String {
    format!("-c statement_timeout={}", statement_timeout.as_millis())
}

/// Create a connection pool; TLS is used when the configuration requires it
pub fn create_pool(config: &DatabaseConfig, statement_timeout: Duration) -> anyhow::Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.options = Some(session_options(statement_timeout));
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });

    let pool = if config.require_tls {
        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);
        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .context("Failed to create TLS pool")?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create pool")?
    };

    Ok(pool)
}

/// Verify connectivity, create missing tables and seed an empty database
pub async fn bootstrap(pool: &Pool) -> anyhow::Result<()> {
    let client = pool.get().await.context("Failed to get pool connection")?;

    client
        .query_one("SELECT 1 AS ok", &[])
        .await
        .context("Failed to verify database connection")?;

    for ddl in [
        queries::CREATE_USERS,
        queries::CREATE_PRODUCTS,
        queries::CREATE_CHAT_LOGS,
        queries::CREATE_CHAT_LOGS_SENDER_INDEX,
    ] {
        client.execute(ddl, &[]).await?;
    }

    let users: i64 = client.query_one(queries::COUNT_USERS, &[]).await?.get(0);
    if users == 0 {
        for (name, email, password, role) in [
            ("Alice Admin", "admin@example.com", "admin123", "admin"),
            ("Bob User", "user@example.com", "user123", "user"),
        ] {
            let password_hash = hash_password(password)?;
            client
                .execute(queries::INSERT_USER, &[&name, &email, &password_hash, &role])
                .await?;
        }
        info!("Seeded users table");
    }

    let products: i64 = client.query_one(queries::COUNT_PRODUCTS, &[]).await?.get(0);
    if products == 0 {
        for (name, price, stock) in [("Laptop", 999.99_f64, 10_i32), ("Mouse", 29.99, 100), ("Keyboard", 59.99, 50)] {
            client
                .execute(queries::INSERT_PRODUCT, &[&name, &price, &stock])
                .await?;
        }
        info!("Seeded products table");
    }

    info!("✅ Database tables initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_options_carry_statement_timeout_in_millis() {
        assert_eq!(session_options(Duration::from_secs(30)), "-c statement_timeout=30000");
        assert_eq!(session_options(Duration::from_millis(1500)), "-c statement_timeout=1500");
    }

    #[test]
    fn test_pool_is_built_without_connecting() {
        let config = DatabaseConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        };
        let pool = create_pool(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(pool.status().size, 0);
    }
}
