//! SQL query constants
//!
//! Statements the service issues on its own behalf. Generated queries never
//! pass through here.

pub const CREATE_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin'))
    )
"#;

pub const CREATE_PRODUCTS: &str = r#"
    CREATE TABLE IF NOT EXISTS products (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        stock INTEGER NOT NULL DEFAULT 0
    )
"#;

pub const CREATE_CHAT_LOGS: &str = r#"
    CREATE TABLE IF NOT EXISTS chat_logs (
        id SERIAL PRIMARY KEY,
        sender TEXT NOT NULL,
        message TEXT NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
        metadata JSONB
    )
"#;

pub const CREATE_CHAT_LOGS_SENDER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_chat_logs_sender ON chat_logs(sender)";

pub const COUNT_USERS: &str = "SELECT count(*) FROM users";

pub const COUNT_PRODUCTS: &str = "SELECT count(*) FROM products";

pub const INSERT_USER: &str =
    "INSERT INTO users (name, email, password_hash, role) VALUES ($1, $2, $3, $4)";

pub const INSERT_PRODUCT: &str = "INSERT INTO products (name, price, stock) VALUES ($1, $2, $3)";

pub const FIND_USER_BY_EMAIL: &str =
    "SELECT id, name, email, password_hash, role FROM users WHERE email = $1";

pub const INSERT_CHAT_LOG: &str =
    "INSERT INTO chat_logs (sender, message, metadata) VALUES ($1, $2, $3)";

pub const LIST_CHAT_LOGS: &str = r#"
    SELECT id, sender, message, timestamp, metadata
    FROM chat_logs
    ORDER BY timestamp ASC, id ASC
"#;

pub const LIST_CHAT_LOGS_FOR_SENDER: &str = r#"
    SELECT id, sender, message, timestamp, metadata
    FROM chat_logs
    WHERE sender = $1
    ORDER BY timestamp ASC, id ASC
"#;
