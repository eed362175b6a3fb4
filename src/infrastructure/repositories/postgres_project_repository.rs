use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::project::{Project, ProjectStatus};
use crate::domain::repositories::ProjectRepository;

const PROJECT_COLUMNS: &str = r#"
    id, name, description, project_type, status, tech_stack, team_config,
    repository_url, documentation_url, budget, created_at, updated_at, completed_at
"#;

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    name: String,
    description: String,
    project_type: String,
    status: ProjectStatus,
    tech_stack: Value,
    team_config: Value,
    repository_url: Option<String>,
    documentation_url: Option<String>,
    budget: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Project::from_persistence(
            r.id,
            r.name,
            r.description,
            r.project_type,
            r.status,
            r.tech_stack,
            r.team_config,
            r.repository_url,
            r.documentation_url,
            r.budget,
            r.created_at,
            r.updated_at,
            r.completed_at,
        )
    }
}

/// PostgreSQL implementation of ProjectRepository
///
/// Child rows (sprints, tasks, outputs, conflicts) are removed by the
/// `ON DELETE CASCADE` foreign keys in the schema.
pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn save(&self, project: &Project) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO projects (
                id, name, description, project_type, status, tech_stack, team_config,
                repository_url, documentation_url, budget, created_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                project_type = EXCLUDED.project_type,
                status = EXCLUDED.status,
                tech_stack = EXCLUDED.tech_stack,
                team_config = EXCLUDED.team_config,
                repository_url = EXCLUDED.repository_url,
                documentation_url = EXCLUDED.documentation_url,
                budget = EXCLUDED.budget,
                updated_at = EXCLUDED.updated_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(project.id())
        .bind(project.name())
        .bind(project.description())
        .bind(project.project_type())
        .bind(project.status())
        .bind(project.tech_stack())
        .bind(project.team_config())
        .bind(project.repository_url())
        .bind(project.documentation_url())
        .bind(project.budget())
        .bind(project.created_at())
        .bind(project.updated_at())
        .bind(project.completed_at())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save project: {}", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, String> {
        let sql = format!("SELECT {} FROM projects WHERE id = $1", PROJECT_COLUMNS);
        let row = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to find project by id: {}", e))?;

        Ok(row.map(Project::from))
    }

    async fn find_all(&self) -> Result<Vec<Project>, String> {
        let sql = format!(
            "SELECT {} FROM projects ORDER BY created_at DESC",
            PROJECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to list projects: {}", e))?;

        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn find_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>, String> {
        let sql = format!(
            "SELECT {} FROM projects WHERE status = $1 ORDER BY created_at DESC",
            PROJECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ProjectRow>(&sql)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| format!("Failed to find projects by status: {}", e))?;

        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), String> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to delete project: {}", e))?;

        if result.rows_affected() == 0 {
            return Err(format!("Project not found: {}", id));
        }

        Ok(())
    }
}
