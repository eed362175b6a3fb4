// Operator password hashing (bcrypt)

use bcrypt::{hash, verify, DEFAULT_COST};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Rejects passwords that are too short or all whitespace
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.trim().is_empty() {
        return Err("Password cannot be blank".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, String> {
    hash(password, DEFAULT_COST).map_err(|e| e.to_string())
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is malformed
pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, String> {
    verify(password, password_hash).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_password_verifies() {
        let stored = hash_password("correct horse").expect("hash");
        assert!(verify_password("correct horse", &stored).expect("verify"));
        assert!(!verify_password("battery staple", &stored).expect("verify"));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("correct horse").expect("hash");
        let second = hash_password("correct horse").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-bcrypt-hash").is_err());
    }

    #[test]
    fn short_and_blank_passwords_are_rejected() {
        assert!(validate_password("short").is_err());
        assert!(validate_password("          ").is_err());
        assert!(validate_password("long enough").is_ok());
    }
}
