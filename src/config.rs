//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3001,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub require_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "querygate".to_string(),
            max_pool_size: 10,
            require_tls: false,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

/// Bearer token configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// `None` means no secret was configured and a per-process one is generated
    pub jwt_secret: Option<String>,
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_minutes: 12 * 60,
        }
    }
}

/// Text-generation collaborator configuration
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "anthropic/claude-3-haiku".to_string(),
            max_tokens: 150,
            timeout: Duration::from_secs(30),
        }
    }
}

/// A table whose rows belong to individual actors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedTable {
    pub table: String,
    pub owner_column: String,
}

impl ScopedTable {
    pub fn new(table: impl Into<String>, owner_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            owner_column: owner_column.into(),
        }
    }
}

/// Mediation engine configuration
#[derive(Debug, Clone)]
pub struct MediationConfig {
    pub scoped_tables: Vec<ScopedTable>,
    pub confirmation_ttl: Duration,
    pub statement_timeout: Duration,
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            scoped_tables: vec![ScopedTable::new("chat_logs", "sender")],
            confirmation_ttl: Duration::from_secs(300),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub generation: GenerationConfig,
    pub mediation: MediationConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: parse_var("HOST")?.unwrap_or_else(|| ServerConfig::default().host),
            port: parse_var("PORT")?.unwrap_or_else(|| ServerConfig::default().port),
        };

        // Try DATABASE_URL first, fall back to individual vars
        let database = if let Ok(database_url) = std::env::var("DATABASE_URL") {
            Self::parse_database_url(&database_url)?
        } else {
            let defaults = DatabaseConfig::default();
            DatabaseConfig {
                host: std::env::var("DB_HOST").unwrap_or(defaults.host),
                port: parse_var("DB_PORT")?.unwrap_or(defaults.port),
                user: std::env::var("DB_USER").unwrap_or(defaults.user),
                password: std::env::var("DB_PASSWORD").unwrap_or_default(),
                database: std::env::var("DB_NAME").unwrap_or(defaults.database),
                max_pool_size: parse_var("DB_MAX_CONNECTIONS")?.unwrap_or(defaults.max_pool_size),
                require_tls: std::env::var("DB_SSLMODE")
                    .map(|mode| mode.eq_ignore_ascii_case("require"))
                    .unwrap_or(false),
            }
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let auth = AuthConfig {
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            token_ttl_minutes: parse_var("TOKEN_TTL_MINUTES")?
                .unwrap_or_else(|| AuthConfig::default().token_ttl_minutes),
        };

        let generation_defaults = GenerationConfig::default();
        let generation = GenerationConfig {
            base_url: std::env::var("GENERATION_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(generation_defaults.base_url),
            api_key: std::env::var("OPENROUTER_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("DEFAULT_MODEL").unwrap_or(generation_defaults.model),
            max_tokens: parse_var("GENERATION_MAX_TOKENS")?
                .unwrap_or(generation_defaults.max_tokens),
            timeout: parse_var("GENERATION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(generation_defaults.timeout),
        };

        let mediation_defaults = MediationConfig::default();
        let mediation = MediationConfig {
            scoped_tables: match std::env::var("SCOPED_TABLES") {
                Ok(spec) => Self::parse_scoped_tables(&spec)?,
                Err(_) => mediation_defaults.scoped_tables,
            },
            confirmation_ttl: parse_var("CONFIRMATION_TTL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(mediation_defaults.confirmation_ttl),
            statement_timeout: parse_var("STATEMENT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(mediation_defaults.statement_timeout),
        };

        Ok(Self {
            server,
            database,
            cors,
            auth,
            generation,
            mediation,
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        if database.is_empty() {
            return Err(ConfigError::MissingVar("database name in DATABASE_URL".to_string()));
        }

        let require_tls = parsed
            .query_pairs()
            .any(|(k, v)| k == "sslmode" && v == "require");

        Ok(DatabaseConfig {
            host,
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().map(|p| p.to_string()).unwrap_or_default(),
            database,
            max_pool_size: parse_var("DB_MAX_CONNECTIONS")?.unwrap_or(10),
            require_tls,
        })
    }

    /// Parse `table:owner_column` pairs separated by commas
    fn parse_scoped_tables(spec: &str) -> Result<Vec<ScopedTable>, ConfigError> {
        spec.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.split_once(':') {
                Some((table, column)) if !table.trim().is_empty() && !column.trim().is_empty() => {
                    Ok(ScopedTable::new(table.trim(), column.trim()))
                }
                _ => Err(ConfigError::InvalidValue(format!(
                    "SCOPED_TABLES entry '{}' must look like table:owner_column",
                    entry
                ))),
            })
            .collect()
    }
}

/// Read and parse an optional environment variable
fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{}={}", name, raw))),
        Err(_) => Ok(None),
    }
}
