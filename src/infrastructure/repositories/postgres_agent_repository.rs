use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::agent::{AgentOutput, AgentProfile, AgentRole, AgentStatus};
use crate::domain::repositories::{AgentOutputRepository, AgentRepository};

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    role: AgentRole,
    llm_provider: String,
    mcp_config: Value,
    current_status: AgentStatus,
    current_project_id: Option<Uuid>,
    current_task_id: Option<Uuid>,
    tasks_completed: i32,
    average_task_time: f64,
    quality_score: f64,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl From<AgentRow> for AgentProfile {
    fn from(r: AgentRow) -> Self {
        AgentProfile::from_persistence(
            r.id,
            r.role,
            r.llm_provider,
            r.mcp_config,
            r.current_status,
            r.current_project_id,
            r.current_task_id,
            r.tasks_completed,
            r.average_task_time,
            r.quality_score,
            r.created_at,
            r.last_active_at,
        )
    }
}

#[derive(sqlx::FromRow)]
struct OutputRow {
    id: Uuid,
    agent_id: String,
    project_id: Uuid,
    task_id: Option<Uuid>,
    output_type: String,
    content: Value,
    confidence_score: f64,
    validated: bool,
    validation_score: Option<f64>,
    validation_feedback: Option<String>,
    processing_time: f64,
    tokens_used: i32,
    created_at: DateTime<Utc>,
}

impl From<OutputRow> for AgentOutput {
    fn from(r: OutputRow) -> Self {
        AgentOutput::from_persistence(
            r.id,
            r.agent_id,
            r.project_id,
            r.task_id,
            r.output_type,
            r.content,
            r.confidence_score,
            r.validated,
            r.validation_score,
            r.validation_feedback,
            r.processing_time,
            r.tokens_used,
            r.created_at,
        )
    }
}

/// PostgreSQL implementation of AgentRepository and AgentOutputRepository
pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn save(&self, agent: &AgentProfile) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                id, role, llm_provider, mcp_config, current_status, current_project_id,
                current_task_id, tasks_completed, average_task_time, quality_score,
                created_at, last_active_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                llm_provider = EXCLUDED.llm_provider,
                mcp_config = EXCLUDED.mcp_config,
                current_status = EXCLUDED.current_status,
                current_project_id = EXCLUDED.current_project_id,
                current_task_id = EXCLUDED.current_task_id,
                tasks_completed = EXCLUDED.tasks_completed,
                average_task_time = EXCLUDED.average_task_time,
                quality_score = EXCLUDED.quality_score,
                last_active_at = EXCLUDED.last_active_at
            "#,
        )
        .bind(agent.id())
        .bind(agent.role())
        .bind(agent.llm_provider())
        .bind(agent.mcp_config())
        .bind(agent.current_status())
        .bind(agent.current_project_id())
        .bind(agent.current_task_id())
        .bind(agent.tasks_completed())
        .bind(agent.average_task_time())
        .bind(agent.quality_score())
        .bind(agent.created_at())
        .bind(agent.last_active_at())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save agent: {}", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AgentProfile>, String> {
        let row = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to find agent by id: {}", e))?;

        Ok(row.map(AgentProfile::from))
    }

    async fn find_all(&self) -> Result<Vec<AgentProfile>, String> {
        let rows = sqlx::query_as::<_, AgentRow>("SELECT * FROM agents ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to list agents: {}", e))?;

        Ok(rows.into_iter().map(AgentProfile::from).collect())
    }

    async fn find_by_role(&self, role: AgentRole) -> Result<Vec<AgentProfile>, String> {
        let rows =
            sqlx::query_as::<_, AgentRow>("SELECT * FROM agents WHERE role = $1 ORDER BY id")
                .bind(role)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| format!("Failed to find agents by role: {}", e))?;

        Ok(rows.into_iter().map(AgentProfile::from).collect())
    }
}

#[async_trait]
impl AgentOutputRepository for PostgresAgentRepository {
    async fn save(&self, output: &AgentOutput) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO agent_outputs (
                id, agent_id, project_id, task_id, output_type, content, confidence_score,
                validated, validation_score, validation_feedback, processing_time,
                tokens_used, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                validated = EXCLUDED.validated,
                validation_score = EXCLUDED.validation_score,
                validation_feedback = EXCLUDED.validation_feedback
            "#,
        )
        .bind(output.id())
        .bind(output.agent_id())
        .bind(output.project_id())
        .bind(output.task_id())
        .bind(output.output_type())
        .bind(output.content())
        .bind(output.confidence_score())
        .bind(output.validated())
        .bind(output.validation_score())
        .bind(output.validation_feedback())
        .bind(output.processing_time())
        .bind(output.tokens_used())
        .bind(output.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save agent output: {}", e))?;

        Ok(())
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<AgentOutput>, String> {
        let rows = sqlx::query_as::<_, OutputRow>(
            "SELECT * FROM agent_outputs WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find outputs by project: {}", e))?;

        Ok(rows.into_iter().map(AgentOutput::from).collect())
    }

    async fn find_by_agent(&self, agent_id: &str) -> Result<Vec<AgentOutput>, String> {
        let rows = sqlx::query_as::<_, OutputRow>(
            "SELECT * FROM agent_outputs WHERE agent_id = $1 ORDER BY created_at",
        )
        .bind(agent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find outputs by agent: {}", e))?;

        Ok(rows.into_iter().map(AgentOutput::from).collect())
    }
}
