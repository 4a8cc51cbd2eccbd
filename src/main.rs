//! QueryGate API - Natural-language database access with guard rails
//!
//! A chat endpoint turns a question into SQL through an external model, and
//! every candidate query passes the mediation engine before it touches the
//! database:
//! - Introspection: the model only sees live tables and columns
//! - Authorization: read-only for users, owner-scoped rows on shared tables
//! - Confirmation: destructive statements wait for an explicit yes
//! - Execution: the held text runs verbatim, once

mod auth;
mod config;
mod db;
mod error;
mod generator;
mod mediation;
mod models;
mod routes;
mod state;
mod store;
#[cfg(test)]
mod testing;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for structured logging
    init_tracing();

    info!("🚀 Starting QueryGate...");

    // Load configuration
    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    if settings.generation.api_key.is_none() {
        warn!("⚠️  OPENROUTER_API_KEY not set, chat requests will fail until it is configured");
    }

    // Database is required: introspection and execution both run against it
    let pool = db::create_pool(&settings.database, settings.mediation.statement_timeout)?;
    db::bootstrap(&pool)
        .await
        .context("DATABASE_URL must point at a reachable PostgreSQL database")?;
    info!("✅ Database pool ready (TLS: {})", settings.database.require_tls);

    let state = Arc::new(AppState::new(pool, &settings)?);

    // Build the router
    let app = create_router(state, &settings);

    // Create socket address
    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("📚 API Endpoints:");
    info!("   GET  /health                   - Liveness");
    info!("   POST /api/auth/login           - Login with email/password");
    info!("   GET  /api/auth/me              - Current actor");
    info!("   GET  /api/schema               - Live schema");
    info!("   POST /api/chat                 - Ask a question");
    info!("   GET  /api/confirm-query        - Query awaiting confirmation");
    info!("   POST /api/confirm-query        - Confirm or cancel it");
    info!("   GET  /api/history              - Conversation log");

    // Create TCP listener and serve
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,querygate_api=debug,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
