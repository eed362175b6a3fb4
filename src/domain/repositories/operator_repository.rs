use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::operator::Email;

/// An account allowed to launch and steer projects
#[derive(Debug, Clone)]
pub struct Operator {
    pub id: Uuid,
    pub email: Email,
    pub password_hash: String,
    pub display_name: String,
    pub is_active: bool,
}

#[async_trait]
pub trait OperatorRepository: Send + Sync {
    /// Create an operator; duplicate emails are rejected with a "duplicate" error
    async fn create(&self, operator: Operator) -> Result<Uuid, String>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Operator>, String>;

    async fn find_by_email(&self, email: &Email) -> Result<Option<Operator>, String>;

    async fn update_last_login(&self, operator_id: Uuid) -> Result<(), String>;
}
