//! Credential checks for the stored accounts

use crate::error::AppError;
use bcrypt::{hash, verify, DEFAULT_COST};
use tracing::warn;

pub fn hash_password(password: &str) -> Result<String, AppError> {
    hash(password, DEFAULT_COST).map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Check a login attempt. An unreadable stored hash is a failed login,
/// not a server fault.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match verify(password, stored_hash) {
        Ok(matches) => matches,
        Err(e) => {
            warn!("Stored password hash could not be read: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_password_matches_only_itself() {
        let stored = bcrypt::hash("user123", 4).unwrap();
        assert!(verify_password("user123", &stored));
        assert!(!verify_password("admin123", &stored));
    }

    #[test]
    fn test_corrupt_hash_is_a_mismatch() {
        assert!(!verify_password("user123", "plaintext-not-a-hash"));
    }
}
