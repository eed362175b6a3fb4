use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::services::COORDINATOR;
use crate::api::errors::ApiError;
use crate::api::middleware::JwtAuth;
use crate::api::state::AppState;
use crate::domain::knowledge::{ConflictResolution, SharedKnowledge};
use crate::evolution::{EvolutionError, KnowledgeItem};
use crate::memory::rag::{SimilarityQuery, ALL_PROJECTS};

const DEFAULT_LIMIT: usize = 5;

/// Body of POST /api/projects/:id/conflicts
#[derive(Debug, Deserialize)]
pub struct ConflictRequest {
    pub agent1_id: String,
    pub agent2_id: String,
    #[serde(rename = "type")]
    pub conflict_type: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct ExperienceRequest {
    pub agent_id: String,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub experience: Value,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub agent_id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    pub context: Value,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeQuery {
    #[serde(rename = "type")]
    pub knowledge_type: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn conflict_json(conflict: &ConflictResolution) -> Value {
    json!({
        "id": conflict.id(),
        "project_id": conflict.project_id(),
        "agent1_id": conflict.agent1_id(),
        "agent2_id": conflict.agent2_id(),
        "type": conflict.conflict_type(),
        "description": conflict.description(),
        "resolution_method": conflict.resolution_method(),
        "decision": conflict.decision(),
        "rationale": conflict.rationale(),
        "resolved_by": conflict.resolved_by(),
        "created_at": conflict.created_at(),
        "resolved_at": conflict.resolved_at(),
    })
}

fn knowledge_json(entry: &SharedKnowledge) -> Value {
    json!({
        "id": entry.id(),
        "type": entry.knowledge_type(),
        "title": entry.title(),
        "content": entry.content(),
        "source_project_id": entry.source_project_id(),
        "applicable_domains": entry.applicable_domains(),
        "tags": entry.tags(),
        "usage_count": entry.usage_count(),
        "effectiveness_score": entry.effectiveness_score(),
        "created_by_agent": entry.created_by_agent(),
        "created_at": entry.created_at(),
    })
}

fn item_json(item: &KnowledgeItem) -> Value {
    json!({
        "id": item.id,
        "type": item.knowledge_type.as_str(),
        "source": item.source.as_str(),
        "title": item.title,
        "confidence": item.confidence,
        "success_rate": item.success_rate,
        "usage_count": item.usage_count,
        "quality_score": item.quality_score(),
    })
}

async fn require_project(state: &AppState, id: Uuid) -> Result<(), ApiError> {
    state
        .projects
        .find_by_id(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found(format!("Project not found: {}", id)))
}

/// Has the manager arbitrate and stores the settled conflict
///
/// POST /api/projects/:id/conflicts
pub async fn resolve_conflict(
    State(state): State<AppState>,
    auth: JwtAuth,
    Path(project_id): Path<Uuid>,
    Json(req): Json<ConflictRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    require_project(&state, project_id).await?;
    let mut conflict = ConflictResolution::new(
        project_id,
        req.agent1_id.clone(),
        req.agent2_id.clone(),
        req.conflict_type.to_lowercase(),
        req.description.clone(),
    )
    .map_err(ApiError::bad_request)?;

    let payload = json!({
        "type": conflict.conflict_type(),
        "agent1_id": req.agent1_id,
        "agent2_id": req.agent2_id,
        "description": req.description,
    });
    let output = state
        .launcher
        .lock()
        .await
        .resolve_conflict(&project_id.to_string(), &payload)
        .await?;

    let resolution = &output["conflict_resolution"]["resolution"];
    let field = |key: &str| resolution.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    conflict
        .resolve(field("method"), field("decision"), field("rationale"), COORDINATOR)
        .map_err(ApiError::internal_server_error)?;
    state.knowledge.save_conflict(&conflict).await?;

    info!(
        project_id = %project_id,
        conflict_id = %conflict.id(),
        method = conflict.resolution_method(),
        operator = %auth.email,
        "Conflict resolved"
    );
    Ok((StatusCode::CREATED, Json(conflict_json(&conflict))))
}

/// GET /api/projects/:id/conflicts
pub async fn list_conflicts(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    require_project(&state, project_id).await?;
    let conflicts = state.knowledge.find_conflicts_by_project(project_id).await?;
    let resolved = conflicts.iter().filter(|c| c.is_resolved()).count();

    Ok(Json(json!({
        "conflicts": conflicts.iter().map(conflict_json).collect::<Vec<_>>(),
        "summary": {"total": conflicts.len(), "resolved": resolved},
    })))
}

/// Extracts knowledge from an agent's experience report and stores the
/// entries confident enough to keep
///
/// POST /api/knowledge/experience
pub async fn submit_experience(
    State(state): State<AppState>,
    auth: JwtAuth,
    Json(req): Json<ExperienceRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if let Some(project_id) = req.project_id {
        require_project(&state, project_id).await?;
    }

    let mut context = match req.context {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    if let Some(project_id) = req.project_id {
        context.insert("project_id".into(), json!(project_id.to_string()));
    }
    let context = Value::Object(context);

    let items = {
        let mut launcher = state.launcher.lock().await;
        launcher
            .services_mut()
            .knowledge
            .extract_from_experience(&req.experience, &req.agent_id, &context)
    };

    for item in &items {
        state.knowledge.save_knowledge(&item.to_shared(item.source_project())).await?;
    }

    info!(agent_id = %req.agent_id, stored = items.len(), operator = %auth.email, "Experience processed");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "knowledge": items.iter().map(item_json).collect::<Vec<_>>(),
            "stored": items.len(),
        })),
    ))
}

/// GET /api/knowledge?type=pattern
pub async fn list_knowledge(
    State(state): State<AppState>,
    Query(query): Query<KnowledgeQuery>,
) -> Result<Json<Value>, ApiError> {
    let entries = state.knowledge.find_knowledge_by_type(&query.knowledge_type).await?;
    Ok(Json(json!({
        "knowledge": entries.iter().map(knowledge_json).collect::<Vec<_>>(),
        "total": entries.len(),
    })))
}

/// Ranks learned knowledge against a task context
///
/// POST /api/knowledge/recommend
pub async fn recommend_knowledge(
    State(state): State<AppState>,
    Json(req): Json<RecommendRequest>,
) -> Result<Json<Value>, ApiError> {
    let launcher = state.launcher.lock().await;
    let ranked = launcher
        .services()
        .knowledge
        .recommend(&req.context, req.limit.unwrap_or(DEFAULT_LIMIT));

    let recommendations: Vec<Value> = ranked
        .iter()
        .map(|(item, relevance)| {
            let mut entry = item_json(item);
            entry["relevance"] = json!(relevance);
            entry
        })
        .collect();
    Ok(Json(json!({ "recommendations": recommendations })))
}

/// POST /api/knowledge/:id/feedback
pub async fn knowledge_feedback(
    State(state): State<AppState>,
    auth: JwtAuth,
    Path(id): Path<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<Value>, ApiError> {
    let updated = {
        let mut launcher = state.launcher.lock().await;
        launcher
            .services_mut()
            .knowledge
            .record_feedback(id, req.success, req.result, &req.agent_id)
            .map_err(|e| match e {
                EvolutionError::KnowledgeNotFound(_) => ApiError::not_found(e.to_string()),
                other => ApiError::internal_server_error(other.to_string()),
            })?
            .clone()
    };
    state
        .knowledge
        .save_knowledge(&updated.to_shared(updated.source_project()))
        .await?;

    info!(knowledge_id = %id, success = req.success, operator = %auth.email, "Knowledge feedback recorded");
    Ok(Json(item_json(&updated)))
}

/// Drops obsolete entries, fuses near duplicates and lifts proven ones;
/// surviving entries are written back to the store
///
/// POST /api/knowledge/evolve
pub async fn evolve_knowledge(
    State(state): State<AppState>,
    auth: JwtAuth,
) -> Result<Json<Value>, ApiError> {
    let (summary, survivors) = {
        let mut launcher = state.launcher.lock().await;
        let engine = &mut launcher.services_mut().knowledge;
        let summary = engine.evolve(Utc::now());
        let survivors: Vec<SharedKnowledge> = engine
            .items()
            .map(|item| item.to_shared(item.source_project()))
            .collect();
        (summary, survivors)
    };

    for entry in &survivors {
        if let Err(e) = state.knowledge.save_knowledge(entry).await {
            warn!(knowledge_id = %entry.id(), error = %e, "Evolved knowledge not stored");
        }
    }

    info!(operator = %auth.email, after = summary.after_count, "Knowledge base evolved");
    Ok(Json(json!(summary)))
}

/// Similarity search over indexed project memories
///
/// GET /api/knowledge/search?q=...
pub async fn search_memories(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::bad_request("Query text is required"));
    }
    let search = SimilarityQuery::new(query.q)
        .project(query.project_id.unwrap_or_else(|| ALL_PROJECTS.to_string()))
        .limit(query.limit.unwrap_or(DEFAULT_LIMIT));

    let results = state.launcher.lock().await.services_mut().rag.retrieve_similar(&search);
    Ok(Json(json!({ "results": results, "total": results.len() })))
}
