use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::repositories::SprintRepository;
use crate::domain::sprint::{Sprint, SprintStatus};

#[derive(sqlx::FromRow)]
struct SprintRow {
    id: Uuid,
    project_id: Uuid,
    sprint_number: i32,
    name: String,
    goal: String,
    status: SprintStatus,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    planning_notes: Value,
    review_notes: Value,
    retrospective_notes: Value,
    daily_standups: Value,
    created_at: DateTime<Utc>,
}

impl From<SprintRow> for Sprint {
    fn from(r: SprintRow) -> Self {
        Sprint::from_persistence(
            r.id,
            r.project_id,
            r.sprint_number,
            r.name,
            r.goal,
            r.status,
            r.start_date,
            r.end_date,
            r.planning_notes,
            r.review_notes,
            r.retrospective_notes,
            r.daily_standups,
            r.created_at,
        )
    }
}

/// PostgreSQL implementation of SprintRepository
pub struct PostgresSprintRepository {
    pool: PgPool,
}

impl PostgresSprintRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SprintRepository for PostgresSprintRepository {
    async fn save(&self, sprint: &Sprint) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO sprints (
                id, project_id, sprint_number, name, goal, status, start_date, end_date,
                planning_notes, review_notes, retrospective_notes, daily_standups, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                goal = EXCLUDED.goal,
                status = EXCLUDED.status,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                planning_notes = EXCLUDED.planning_notes,
                review_notes = EXCLUDED.review_notes,
                retrospective_notes = EXCLUDED.retrospective_notes,
                daily_standups = EXCLUDED.daily_standups
            "#,
        )
        .bind(sprint.id())
        .bind(sprint.project_id())
        .bind(sprint.sprint_number())
        .bind(sprint.name())
        .bind(sprint.goal())
        .bind(sprint.status())
        .bind(sprint.start_date())
        .bind(sprint.end_date())
        .bind(sprint.planning_notes())
        .bind(sprint.review_notes())
        .bind(sprint.retrospective_notes())
        .bind(sprint.daily_standups())
        .bind(sprint.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error().and_then(|d| d.code()) {
            Some(code) if code == "23505" => format!(
                "Sprint number {} is a duplicate for project {}",
                sprint.sprint_number(),
                sprint.project_id()
            ),
            _ => format!("Failed to save sprint: {}", e),
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Sprint>, String> {
        let row = sqlx::query_as::<_, SprintRow>("SELECT * FROM sprints WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| format!("Failed to find sprint by id: {}", e))?;

        Ok(row.map(Sprint::from))
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Sprint>, String> {
        let rows = sqlx::query_as::<_, SprintRow>(
            "SELECT * FROM sprints WHERE project_id = $1 ORDER BY sprint_number",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find sprints by project: {}", e))?;

        Ok(rows.into_iter().map(Sprint::from).collect())
    }
}
