use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{LaunchPhase, LaunchedProject, ProjectConfig};
use crate::api::errors::ApiError;
use crate::api::handlers::sprints::SprintResponse;
use crate::api::middleware::JwtAuth;
use crate::api::state::AppState;
use crate::domain::agent::{AgentOutput, AgentProfile};
use crate::domain::project::Project;
use crate::domain::sprint::Sprint;

/// Body of POST /api/projects/create
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(flatten)]
    pub config: ProjectConfig,
    #[serde(default)]
    pub tech_stack: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub project_type: String,
    pub status: String,
    pub tech_stack: Value,
    pub team_config: Value,
    pub budget: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Project> for ProjectResponse {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id(),
            name: project.name().to_string(),
            description: project.description().to_string(),
            project_type: project.project_type().to_string(),
            status: project.status().to_string(),
            tech_stack: project.tech_stack().clone(),
            team_config: project.team_config().clone(),
            budget: project.budget(),
            created_at: project.created_at(),
            updated_at: project.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateProjectResponse {
    pub project: ProjectResponse,
    pub sprint: SprintResponse,
    pub phases: Value,
    pub assigned_agents: Vec<String>,
    pub next_steps: Vec<String>,
}

fn phases_json(launched: &LaunchedProject) -> Value {
    let phases: serde_json::Map<String, Value> = launched
        .phases
        .iter()
        .map(|(phase, outcome)| {
            (
                phase.as_str().to_string(),
                json!({
                    "agent_id": outcome.agent_id,
                    "succeeded": outcome.succeeded,
                    "output": outcome.output,
                }),
            )
        })
        .collect();
    Value::Object(phases)
}

/// Stores a profile for every launcher agent that has none yet, so their
/// outputs satisfy the agent foreign key
async fn ensure_team_profiles(state: &AppState) -> Result<(), ApiError> {
    let team = state.launcher.lock().await.team();
    for member in team {
        if state.agents.find_by_id(&member.agent_id).await?.is_some() {
            continue;
        }
        let mut profile = AgentProfile::new(
            member.agent_id,
            member.role,
            state.settings.provider_for(member.role).to_string(),
        )
        .map_err(ApiError::internal_server_error)?;
        profile.set_status(member.status);
        state.agents.save(&profile).await?;
    }
    Ok(())
}

/// Stores the launched project with its first sprint and phase outputs
async fn persist_launch(
    state: &AppState,
    project: &mut Project,
    launched: &LaunchedProject,
) -> Result<Sprint, ApiError> {
    project.activate().map_err(ApiError::internal_server_error)?;
    state.projects.save(project).await?;

    let planning_notes = launched
        .phase(LaunchPhase::Planning)
        .map(|outcome| outcome.output.clone())
        .unwrap_or_else(|| json!({}));
    let mut sprint = Sprint::new(
        project.id(),
        1,
        format!("{} Sprint 1", project.name()),
        "Set up the project foundation".to_string(),
    )
    .map_err(ApiError::internal_server_error)?;
    sprint.set_planning_notes(planning_notes);
    state.sprints.save(&sprint).await?;

    ensure_team_profiles(state).await?;
    for (phase, outcome) in &launched.phases {
        let confidence = if outcome.succeeded { 1.0 } else { 0.0 };
        let output = AgentOutput::new(
            outcome.agent_id.clone(),
            project.id(),
            None,
            phase.as_str().to_string(),
            outcome.output.clone(),
            confidence,
        )
        .map_err(ApiError::internal_server_error)?;
        state.outputs.save(&output).await?;
    }
    Ok(sprint)
}

/// Undoes a launch whose persistence failed part way
async fn roll_back_launch(state: &AppState, project_id: Uuid) {
    state
        .launcher
        .lock()
        .await
        .forget_project(&project_id.to_string())
        .await;
    if let Err(e) = state.projects.delete(project_id).await {
        if !e.to_lowercase().contains("not found") {
            warn!(project_id = %project_id, error = %e, "Could not remove partially stored project");
        }
    }
}

/// Runs the agent team over a new project and persists the result
///
/// POST /api/projects/create
pub async fn create_project(
    State(state): State<AppState>,
    auth: JwtAuth,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<CreateProjectResponse>), ApiError> {
    let config = req.config;
    let budget = config
        .budget
        .map(|amount| {
            Decimal::from_f64_retain(amount)
                .map(|budget| budget.round_dp(2))
                .ok_or_else(|| ApiError::bad_request("Budget is not a representable amount"))
        })
        .transpose()?;

    let (mut project, _events) = Project::new(
        config.name.clone(),
        config.description.clone(),
        config.project_type.clone(),
        req.tech_stack.unwrap_or_else(|| json!({})),
        json!({ "priority": config.priority, "timeline": config.timeline }),
        budget,
    )
    .map_err(ApiError::bad_request)?;

    let launched = {
        let mut launcher = state.launcher.lock().await;
        launcher
            .launch_with_id(&project.id().to_string(), &config)
            .await?
    };

    let sprint = match persist_launch(&state, &mut project, &launched).await {
        Ok(sprint) => sprint,
        Err(e) => {
            roll_back_launch(&state, project.id()).await;
            return Err(e);
        }
    };

    info!(project_id = %project.id(), operator = %auth.email, "Project created");
    Ok((
        StatusCode::CREATED,
        Json(CreateProjectResponse {
            project: ProjectResponse::from(&project),
            sprint: SprintResponse::from(&sprint),
            phases: phases_json(&launched),
            assigned_agents: launched.assigned_agents,
            next_steps: launched.next_steps,
        }),
    ))
}

/// GET /api/projects
pub async fn list_projects(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let projects = state.projects.find_all().await?;

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    for project in &projects {
        *by_status.entry(project.status().to_string()).or_default() += 1;
    }

    let responses: Vec<ProjectResponse> = projects.iter().map(ProjectResponse::from).collect();
    Ok(Json(json!({
        "projects": responses,
        "summary": {
            "total": projects.len(),
            "by_status": by_status,
        }
    })))
}

/// GET /api/projects/:id
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let project = state
        .projects
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project not found: {}", id)))?;

    let sprints: Vec<SprintResponse> = state
        .sprints
        .find_by_project(id)
        .await?
        .iter()
        .map(SprintResponse::from)
        .collect();

    let launch = {
        let launcher = state.launcher.lock().await;
        launcher.get_project_status(&id.to_string()).map(|launched| {
            json!({
                "sprint_id": launched.sprint_id,
                "phases": phases_json(launched),
                "assigned_agents": launched.assigned_agents,
                "next_steps": launched.next_steps,
            })
        })
    };

    Ok(Json(json!({
        "project": ProjectResponse::from(&project),
        "launch": launch,
        "sprints": sprints,
    })))
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    State(state): State<AppState>,
    auth: JwtAuth,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.projects.delete(id).await?;
    state.launcher.lock().await.forget_project(&id.to_string()).await;

    info!(project_id = %id, operator = %auth.email, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}
