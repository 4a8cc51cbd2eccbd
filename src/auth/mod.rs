//! Authentication and authorization module
//!
//! Bearer-token authentication and the two-role trust model the mediation
//! engine authorizes against.

mod jwt;
mod middleware;
mod password;

pub use jwt::{AccessToken, Claims, JwtKeys};
pub use middleware::auth_middleware;
pub use password::{hash_password, verify_password};

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Actor roles. The role is the only authorization axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May only read, and only its own rows of scoped tables
    #[default]
    User,
    /// May run any statement; destructive ones still need confirmation
    Admin,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Authenticated identity attached to every mediated request.
///
/// Decoded from the bearer token on each request and never persisted by the
/// mediation engine. `session_id` identifies the login the token belongs to
/// and keys the confirmation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub session_id: Uuid,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<Claims> for Actor {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            session_id: claims.sid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" USER ".parse::<Role>(), Ok(Role::User));
        assert!("viewer".parse::<Role>().is_err());
    }

    #[test]
    fn test_default_role_is_unprivileged() {
        assert!(!Role::default().is_admin());
    }
}
