//! JWT token management
//!
//! Issues and validates the bearer credential that carries the actor's
//! identity, role and session id.

use crate::auth::Role;
use crate::config::AuthConfig;
use crate::error::AppError;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: i32,
    /// Display name, used for row-level scoping
    pub name: String,
    /// User email
    pub email: String,
    /// User role
    pub role: Role,
    /// Session ID, fresh per login
    pub sid: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Token response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Signing and verification keys for bearer tokens
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_minutes: i64,
}

impl JwtKeys {
    pub fn new(secret: &[u8], ttl_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_minutes,
        }
    }

    /// Build keys from configuration, generating a per-process secret when none is set
    pub fn from_config(config: &AuthConfig) -> Self {
        match &config.jwt_secret {
            Some(secret) => Self::new(secret.as_bytes(), config.token_ttl_minutes),
            None => {
                warn!("⚠️  JWT_SECRET not set, using a random per-process secret (tokens will not survive restarts)");
                let secret: [u8; 32] = rand::thread_rng().gen();
                Self::new(&secret, config.token_ttl_minutes)
            }
        }
    }

    /// Issue a token for a freshly authenticated user, opening a new session
    pub fn issue(&self, user_id: i32, name: &str, email: &str, role: Role) -> Result<AccessToken, AppError> {
        let now = Utc::now();

        let claims = Claims {
            sub: user_id,
            name: name.to_string(),
            email: email.to_string(),
            role,
            sid: Uuid::new_v4(),
            exp: (now + Duration::minutes(self.ttl_minutes)).timestamp(),
            iat: now.timestamp(),
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("Failed to create access token: {}", e)))?;

        Ok(AccessToken {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.ttl_minutes * 60,
        })
    }

    /// Decode and validate a token
    pub fn decode(&self, token: &str) -> Result<Claims, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::Unauthorized("Token expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AppError::Unauthorized("Invalid token".to_string())
                }
                _ => AppError::Unauthorized(format!("Token validation failed: {}", e)),
            })?;

        Ok(token_data.claims)
    }
}
