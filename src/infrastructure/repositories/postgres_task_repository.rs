use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::agent::AgentRole;
use crate::domain::repositories::TaskRepository;
use crate::domain::task::{Task, TaskStatus};

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    project_id: Uuid,
    sprint_id: Option<Uuid>,
    title: String,
    description: String,
    task_type: String,
    status: TaskStatus,
    priority: i32,
    story_points: Option<i32>,
    assigned_agent_id: Option<String>,
    assigned_role: Option<AgentRole>,
    acceptance_criteria: Value,
    dependencies: Value,
    blockers: Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<TaskRow> for Task {
    fn from(r: TaskRow) -> Self {
        Task::from_persistence(
            r.id,
            r.project_id,
            r.sprint_id,
            r.title,
            r.description,
            r.task_type,
            r.status,
            r.priority,
            r.story_points,
            r.assigned_agent_id,
            r.assigned_role,
            r.acceptance_criteria,
            r.dependencies,
            r.blockers,
            r.created_at,
            r.started_at,
            r.completed_at,
        )
    }
}

/// PostgreSQL implementation of TaskRepository
pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn save(&self, task: &Task) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, project_id, sprint_id, title, description, task_type, status, priority,
                story_points, assigned_agent_id, assigned_role, acceptance_criteria,
                dependencies, blockers, created_at, started_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                sprint_id = EXCLUDED.sprint_id,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                task_type = EXCLUDED.task_type,
                status = EXCLUDED.status,
                priority = EXCLUDED.priority,
                story_points = EXCLUDED.story_points,
                assigned_agent_id = EXCLUDED.assigned_agent_id,
                assigned_role = EXCLUDED.assigned_role,
                acceptance_criteria = EXCLUDED.acceptance_criteria,
                dependencies = EXCLUDED.dependencies,
                blockers = EXCLUDED.blockers,
                started_at = EXCLUDED.started_at,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(task.id())
        .bind(task.project_id())
        .bind(task.sprint_id())
        .bind(task.title())
        .bind(task.description())
        .bind(task.task_type())
        .bind(task.status())
        .bind(task.priority())
        .bind(task.story_points())
        .bind(task.assigned_agent_id())
        .bind(task.assigned_role())
        .bind(task.acceptance_criteria())
        .bind(task.dependencies())
        .bind(task.blockers())
        .bind(task.created_at())
        .bind(task.started_at())
        .bind(task.completed_at())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save task: {}", e))?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, String> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to find task by id: {}", e))?;

        Ok(row.map(Task::from))
    }

    async fn find_by_sprint(&self, sprint_id: Uuid) -> Result<Vec<Task>, String> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE sprint_id = $1 ORDER BY priority DESC, created_at",
        )
        .bind(sprint_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find tasks by sprint: {}", e))?;

        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Task>, String> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find tasks by project: {}", e))?;

        Ok(rows.into_iter().map(Task::from).collect())
    }
}
