// Operator authentication: bcrypt password hashes and HS256 bearer tokens

pub mod jwt;
pub mod password;

pub use jwt::{issue_token, verify_token, Claims};
pub use password::{hash_password, validate_password, verify_password};
