use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::knowledge::{ConflictResolution, SharedKnowledge};
use crate::domain::repositories::KnowledgeRepository;

#[derive(sqlx::FromRow)]
struct ConflictRow {
    id: Uuid,
    project_id: Uuid,
    agent1_id: String,
    agent2_id: String,
    conflict_type: String,
    description: String,
    resolution_method: String,
    decision: String,
    rationale: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
}

impl From<ConflictRow> for ConflictResolution {
    fn from(r: ConflictRow) -> Self {
        ConflictResolution::from_persistence(
            r.id,
            r.project_id,
            r.agent1_id,
            r.agent2_id,
            r.conflict_type,
            r.description,
            r.resolution_method,
            r.decision,
            r.rationale,
            r.created_at,
            r.resolved_at,
            r.resolved_by,
        )
    }
}

#[derive(sqlx::FromRow)]
struct KnowledgeRow {
    id: Uuid,
    knowledge_type: String,
    title: String,
    content: Value,
    source_project_id: Option<Uuid>,
    applicable_domains: Json<Vec<String>>,
    tags: Json<Vec<String>>,
    usage_count: i32,
    effectiveness_score: f64,
    created_by_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<KnowledgeRow> for SharedKnowledge {
    fn from(r: KnowledgeRow) -> Self {
        SharedKnowledge::from_persistence(
            r.id,
            r.knowledge_type,
            r.title,
            r.content,
            r.source_project_id,
            r.applicable_domains.0,
            r.tags.0,
            r.usage_count,
            r.effectiveness_score,
            r.created_by_agent,
            r.created_at,
        )
    }
}

/// PostgreSQL implementation of KnowledgeRepository
pub struct PostgresKnowledgeRepository {
    pool: PgPool,
}

impl PostgresKnowledgeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KnowledgeRepository for PostgresKnowledgeRepository {
    async fn save_conflict(&self, conflict: &ConflictResolution) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO conflict_resolutions (
                id, project_id, agent1_id, agent2_id, conflict_type, description,
                resolution_method, decision, rationale, created_at, resolved_at, resolved_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                resolution_method = EXCLUDED.resolution_method,
                decision = EXCLUDED.decision,
                rationale = EXCLUDED.rationale,
                resolved_at = EXCLUDED.resolved_at,
                resolved_by = EXCLUDED.resolved_by
            "#,
        )
        .bind(conflict.id())
        .bind(conflict.project_id())
        .bind(conflict.agent1_id())
        .bind(conflict.agent2_id())
        .bind(conflict.conflict_type())
        .bind(conflict.description())
        .bind(conflict.resolution_method())
        .bind(conflict.decision())
        .bind(conflict.rationale())
        .bind(conflict.created_at())
        .bind(conflict.resolved_at())
        .bind(conflict.resolved_by())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save conflict: {}", e))?;

        Ok(())
    }

    async fn find_conflicts_by_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ConflictResolution>, String> {
        let rows = sqlx::query_as::<_, ConflictRow>(
            "SELECT * FROM conflict_resolutions WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find conflicts by project: {}", e))?;

        Ok(rows.into_iter().map(ConflictResolution::from).collect())
    }

    async fn save_knowledge(&self, knowledge: &SharedKnowledge) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO shared_knowledge (
                id, knowledge_type, title, content, source_project_id, applicable_domains,
                tags, usage_count, effectiveness_score, created_by_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                content = EXCLUDED.content,
                applicable_domains = EXCLUDED.applicable_domains,
                tags = EXCLUDED.tags,
                usage_count = EXCLUDED.usage_count,
                effectiveness_score = EXCLUDED.effectiveness_score
            "#,
        )
        .bind(knowledge.id())
        .bind(knowledge.knowledge_type())
        .bind(knowledge.title())
        .bind(knowledge.content())
        .bind(knowledge.source_project_id())
        .bind(Json(knowledge.applicable_domains()))
        .bind(Json(knowledge.tags()))
        .bind(knowledge.usage_count())
        .bind(knowledge.effectiveness_score())
        .bind(knowledge.created_by_agent())
        .bind(knowledge.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to save knowledge: {}", e))?;

        Ok(())
    }

    async fn find_knowledge_by_id(&self, id: Uuid) -> Result<Option<SharedKnowledge>, String> {
        let row =
            sqlx::query_as::<_, KnowledgeRow>("SELECT * FROM shared_knowledge WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| format!("Failed to find knowledge by id: {}", e))?;

        Ok(row.map(SharedKnowledge::from))
    }

    async fn find_knowledge_by_type(
        &self,
        knowledge_type: &str,
    ) -> Result<Vec<SharedKnowledge>, String> {
        let rows = sqlx::query_as::<_, KnowledgeRow>(
            r#"
            SELECT * FROM shared_knowledge
            WHERE knowledge_type = $1
            ORDER BY effectiveness_score DESC, usage_count DESC
            "#,
        )
        .bind(knowledge_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to find knowledge by type: {}", e))?;

        Ok(rows.into_iter().map(SharedKnowledge::from).collect())
    }
}
