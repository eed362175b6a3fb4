use serde::{Deserialize, Serialize};
use std::fmt;

/// Login address of an operator account
///
/// Stored lowercased so lookups are case-insensitive.
///
/// # Invariants
/// - Exactly one '@' with a non-empty local part and domain
/// - No whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    /// Validates and normalises an address
    ///
    /// # Example
    /// ```
    /// use agentteam_api::domain::operator::value_objects::Email;
    ///
    /// let email = Email::new(" Lead@Example.com ").expect("valid email");
    /// assert_eq!(email.as_str(), "lead@example.com");
    /// ```
    pub fn new(email: impl Into<String>) -> Result<Self, String> {
        let normalised = email.into().trim().to_lowercase();
        if Self::is_valid(&normalised) {
            Ok(Email(normalised))
        } else {
            Err(format!("Invalid email: {}", normalised))
        }
    }

    fn is_valid(email: &str) -> bool {
        if email.chars().any(char::is_whitespace) {
            return false;
        }
        match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
