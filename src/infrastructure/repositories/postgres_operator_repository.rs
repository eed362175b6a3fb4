use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::operator::Email;
use crate::domain::repositories::{Operator, OperatorRepository};

#[derive(sqlx::FromRow)]
struct OperatorRow {
    id: Uuid,
    email: String,
    password_hash: String,
    display_name: String,
    is_active: bool,
}

impl TryFrom<OperatorRow> for Operator {
    type Error = String;

    fn try_from(r: OperatorRow) -> Result<Self, Self::Error> {
        let email = Email::new(&r.email)
            .map_err(|e| format!("Invalid email from database: {}", e))?;
        Ok(Operator {
            id: r.id,
            email,
            password_hash: r.password_hash,
            display_name: r.display_name,
            is_active: r.is_active,
        })
    }
}

/// PostgreSQL implementation of OperatorRepository
pub struct PostgresOperatorRepository {
    pool: PgPool,
}

impl PostgresOperatorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperatorRepository for PostgresOperatorRepository {
    async fn create(&self, operator: Operator) -> Result<Uuid, String> {
        sqlx::query(
            r#"
            INSERT INTO operators (id, email, password_hash, display_name, is_active)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(operator.id)
        .bind(operator.email.as_str())
        .bind(&operator.password_hash)
        .bind(&operator.display_name)
        .bind(operator.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to create operator: {}", e))?;

        Ok(operator.id)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Operator>, String> {
        let row = sqlx::query_as::<_, OperatorRow>(
            r#"
            SELECT id, email, password_hash, display_name, is_active
            FROM operators
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to find operator by id: {}", e))?;

        row.map(Operator::try_from).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Operator>, String> {
        let row = sqlx::query_as::<_, OperatorRow>(
            r#"
            SELECT id, email, password_hash, display_name, is_active
            FROM operators
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| format!("Failed to find operator by email: {}", e))?;

        row.map(Operator::try_from).transpose()
    }

    async fn update_last_login(&self, operator_id: Uuid) -> Result<(), String> {
        sqlx::query("UPDATE operators SET last_login_at = NOW() WHERE id = $1")
            .bind(operator_id)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to update last login: {}", e))?;

        Ok(())
    }
}
