use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::agents::ProjectLauncher;
use crate::api::errors::ApiError;
use crate::api::middleware::JwtAuth;
use crate::api::state::AppState;
use crate::evolution::ProjectSnapshot;
use crate::memory::meetings::{Attendance, MeetingMinutesManager, MeetingType, Participant};
use crate::memory::sprint::{MemoryError, MemoryLayer};

const DEFAULT_HISTORY: usize = 10;

/// Body of POST /api/projects/:id/meetings
#[derive(Debug, Deserialize)]
pub struct MeetingRequest {
    #[serde(rename = "type")]
    pub meeting_type: String,
    /// Agent ids; the whole team when absent
    #[serde(default)]
    pub participants: Option<Vec<String>>,
    #[serde(default)]
    pub agenda: Value,
    #[serde(default)]
    pub outcomes: Value,
}

#[derive(Debug, Deserialize)]
pub struct MeetingHistoryQuery {
    #[serde(rename = "type", default)]
    pub meeting_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RetrospectiveRequest {
    #[serde(default = "default_true")]
    pub include_historical: bool,
    #[serde(default)]
    pub stakeholder_satisfaction: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn parse_meeting_type(value: &str) -> Result<MeetingType, ApiError> {
    MeetingType::parse(&value.trim().to_lowercase())
        .ok_or_else(|| ApiError::bad_request(format!("Unknown meeting type: {}", value)))
}

/// Sprint the launcher opened for the project
fn launched_sprint(launcher: &ProjectLauncher, project_id: Uuid) -> Result<String, ApiError> {
    launcher
        .get_project_status(&project_id.to_string())
        .map(|launched| launched.sprint_id.clone())
        .ok_or_else(|| ApiError::not_found(format!("Project has no active launch: {}", project_id)))
}

fn memory_error(err: MemoryError) -> ApiError {
    match err {
        MemoryError::SprintNotInitialized { .. } => ApiError::not_found(err.to_string()),
        other => ApiError::internal_server_error(other.to_string()),
    }
}

/// Sprint memory and the cached project context of a launched project
///
/// GET /api/projects/:id/memory
pub async fn project_memory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let mut launcher = state.launcher.lock().await;
    let sprint_id = launched_sprint(&launcher, id)?;
    let project_id = id.to_string();
    let services = launcher.services_mut();

    let layers: BTreeMap<&str, usize> = [
        MemoryLayer::Core,
        MemoryLayer::Working,
        MemoryLayer::Episodic,
        MemoryLayer::Semantic,
    ]
    .into_iter()
    .map(|layer| {
        (
            layer.as_str(),
            services.memory.layer_items(&project_id, &sprint_id, layer).len(),
        )
    })
    .collect();
    let core = services.memory.core(&project_id, &sprint_id).cloned();
    let summary = services
        .contexts
        .switcher_mut()
        .summary(&services.memory, &project_id);
    let tracked = services.allocator.project(&project_id).cloned();

    Ok(Json(json!({
        "project_id": project_id,
        "sprint_id": sprint_id,
        "core": core,
        "layers": layers,
        "context": summary,
        "allocation": tracked,
    })))
}

/// POST /api/projects/:id/meetings
pub async fn record_meeting(
    State(state): State<AppState>,
    auth: JwtAuth,
    Path(id): Path<Uuid>,
    Json(req): Json<MeetingRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let meeting_type = parse_meeting_type(&req.meeting_type)?;

    let mut launcher = state.launcher.lock().await;
    let sprint_id = launched_sprint(&launcher, id)?;
    let team = launcher.team();
    let participants = match req.participants {
        None => team
            .iter()
            .map(|m| Participant {
                agent_id: m.agent_id.clone(),
                role: m.role.as_str().to_string(),
                attendance: Attendance::Present,
            })
            .collect(),
        Some(ids) => ids
            .iter()
            .map(|agent_id| {
                team.iter()
                    .find(|m| &m.agent_id == agent_id)
                    .map(|m| Participant {
                        agent_id: m.agent_id.clone(),
                        role: m.role.as_str().to_string(),
                        attendance: Attendance::Present,
                    })
                    .ok_or_else(|| ApiError::bad_request(format!("Not a team member: {}", agent_id)))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    let minutes = MeetingMinutesManager::new(&mut launcher.services_mut().memory)
        .create_minutes(
            &id.to_string(),
            &sprint_id,
            meeting_type,
            participants,
            req.agenda,
            req.outcomes,
        )
        .map_err(memory_error)?;

    info!(
        project_id = %id,
        meeting_id = %minutes.meeting_id,
        operator = %auth.email,
        "Meeting minutes recorded"
    );
    let summary = minutes.summary();
    Ok((
        StatusCode::CREATED,
        Json(json!({ "minutes": minutes, "summary": summary })),
    ))
}

/// GET /api/projects/:id/meetings?type=daily&limit=5
pub async fn meeting_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MeetingHistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let meeting_type = query
        .meeting_type
        .as_deref()
        .map(parse_meeting_type)
        .transpose()?;

    let mut launcher = state.launcher.lock().await;
    let sprint_id = launched_sprint(&launcher, id)?;
    let minutes = MeetingMinutesManager::new(&mut launcher.services_mut().memory).history(
        &id.to_string(),
        &sprint_id,
        meeting_type,
        query.limit.unwrap_or(DEFAULT_HISTORY),
    );

    Ok(Json(json!({ "meetings": minutes, "total": minutes.len() })))
}

/// Scores the project from its stored records and keeps the lessons
///
/// POST /api/projects/:id/retrospective
pub async fn conduct_retrospective(
    State(state): State<AppState>,
    auth: JwtAuth,
    Path(id): Path<Uuid>,
    Json(req): Json<RetrospectiveRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Some(satisfaction) = req.stakeholder_satisfaction {
        if !(0.0..=1.0).contains(&satisfaction) {
            return Err(ApiError::bad_request(
                "Stakeholder satisfaction must be between 0 and 1",
            ));
        }
    }

    let project = state
        .projects
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project not found: {}", id)))?;
    let sprints = state.sprints.find_by_project(id).await?;
    let tasks = state.tasks.find_by_project(id).await?;
    let conflicts = state.knowledge.find_conflicts_by_project(id).await?;

    let report = {
        let mut launcher = state.launcher.lock().await;
        let phases = launcher
            .get_project_status(&id.to_string())
            .map(|launched| {
                launched
                    .phases
                    .iter()
                    .map(|(phase, outcome)| (phase.as_str().to_string(), outcome.succeeded))
                    .collect()
            })
            .unwrap_or_default();

        let mut snapshot = ProjectSnapshot::from_records(&project, &sprints, &tasks, &conflicts, phases);
        snapshot.stakeholder_satisfaction = req.stakeholder_satisfaction;

        let services = launcher.services_mut();
        services
            .retrospectives
            .conduct(&snapshot, &mut services.rag, req.include_historical)
    };

    let lessons = report.shared_knowledge(Some(id));
    for lesson in &lessons {
        state.knowledge.save_knowledge(lesson).await?;
    }

    info!(
        project_id = %id,
        score = report.overall_score,
        lessons = lessons.len(),
        operator = %auth.email,
        "Project retrospective recorded"
    );
    Ok(Json(json!(report)))
}
