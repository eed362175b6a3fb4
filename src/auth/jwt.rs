// Bearer tokens for operators
//
// Tokens are HS256-signed and live for TOKEN_TTL_HOURS. The subject is the
// operator id; the email rides along so handlers can log who acted.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TOKEN_TTL_HOURS: i64 = 8;

/// Claims carried by an operator token
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Operator id
    pub sub: Uuid,
    pub email: String,
    /// Issued at, seconds since epoch
    pub iat: usize,
    /// Expiry, seconds since epoch
    pub exp: usize,
}

/// Signs a token for `operator_id`
///
/// # Example
/// ```
/// use agentteam_api::auth::jwt::{issue_token, verify_token};
/// use uuid::Uuid;
///
/// let operator_id = Uuid::new_v4();
/// let token = issue_token(operator_id, "ops@example.com", "secret").unwrap();
/// assert_eq!(verify_token(&token, "secret").unwrap().sub, operator_id);
/// ```
pub fn issue_token(operator_id: Uuid, email: &str, secret: &str) -> Result<String, String> {
    let now = Utc::now();
    let claims = Claims {
        sub: operator_id,
        email: email.to_string(),
        iat: now.timestamp() as usize,
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| e.to_string())
}

/// Checks signature and expiry, returning the claims
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}
