use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::middleware::JwtAuth;
use crate::api::state::AppState;
use crate::domain::agent::AgentRole;
use crate::domain::sprint::Sprint;
use crate::domain::task::Task;

#[derive(Debug, Deserialize)]
pub struct CreateSprintRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub goal: String,
    /// Next free number when omitted
    #[serde(default)]
    pub sprint_number: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct SprintResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sprint_number: i32,
    pub name: String,
    pub goal: String,
    pub status: String,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Sprint> for SprintResponse {
    fn from(sprint: &Sprint) -> Self {
        Self {
            id: sprint.id(),
            project_id: sprint.project_id(),
            sprint_number: sprint.sprint_number(),
            name: sprint.name().to_string(),
            goal: sprint.goal().to_string(),
            status: sprint.status().to_string(),
            start_date: sprint.start_date(),
            end_date: sprint.end_date(),
            created_at: sprint.created_at(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub story_points: Option<i32>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Hands the task to the launcher's agent for this role
    #[serde(default)]
    pub assign_to_role: Option<String>,
}

fn default_task_type() -> String {
    "feature".to_string()
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub sprint_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub task_type: String,
    pub status: String,
    pub priority: i32,
    pub story_points: Option<i32>,
    pub assigned_agent_id: Option<String>,
    pub assigned_role: Option<AgentRole>,
    pub acceptance_criteria: Value,
    pub created_at: DateTime<Utc>,
}

impl From<&Task> for TaskResponse {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id(),
            project_id: task.project_id(),
            sprint_id: task.sprint_id(),
            title: task.title().to_string(),
            description: task.description().to_string(),
            task_type: task.task_type().to_string(),
            status: task.status().to_string(),
            priority: task.priority(),
            story_points: task.story_points(),
            assigned_agent_id: task.assigned_agent_id().map(str::to_string),
            assigned_role: task.assigned_role(),
            acceptance_criteria: task.acceptance_criteria().clone(),
            created_at: task.created_at(),
        }
    }
}

/// POST /api/projects/:id/sprints
pub async fn create_sprint(
    State(state): State<AppState>,
    _auth: JwtAuth,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateSprintRequest>,
) -> Result<(StatusCode, Json<SprintResponse>), ApiError> {
    let project = state
        .projects
        .find_by_id(project_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Project not found: {}", project_id)))?;

    let existing = state.sprints.find_by_project(project_id).await?;
    let number = req.sprint_number.unwrap_or_else(|| {
        existing.iter().map(Sprint::sprint_number).max().unwrap_or(0) + 1
    });
    let name = req
        .name
        .unwrap_or_else(|| format!("{} Sprint {}", project.name(), number));

    let sprint = Sprint::new(project_id, number, name, req.goal).map_err(ApiError::bad_request)?;
    state.sprints.save(&sprint).await?;

    info!(%project_id, sprint_number = number, "Sprint created");
    Ok((StatusCode::CREATED, Json(SprintResponse::from(&sprint))))
}

/// GET /api/projects/:id/sprints
pub async fn list_sprints(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<Vec<SprintResponse>>, ApiError> {
    if state.projects.find_by_id(project_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Project not found: {}", project_id)));
    }

    let sprints = state.sprints.find_by_project(project_id).await?;
    Ok(Json(sprints.iter().map(SprintResponse::from).collect()))
}

/// POST /api/sprints/:id/tasks
pub async fn create_task(
    State(state): State<AppState>,
    _auth: JwtAuth,
    Path(sprint_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let sprint = state
        .sprints
        .find_by_id(sprint_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Sprint not found: {}", sprint_id)))?;

    let mut task = Task::new(
        sprint.project_id(),
        Some(sprint_id),
        req.title,
        req.description,
        req.task_type,
        req.priority,
        req.story_points,
    )
    .map_err(ApiError::bad_request)?;
    task.set_acceptance_criteria(req.acceptance_criteria);

    if let Some(role) = req.assign_to_role {
        let role = AgentRole::parse(&role)
            .ok_or_else(|| ApiError::bad_request(format!("Unknown role: {}", role)))?;
        let member = state
            .launcher
            .lock()
            .await
            .team()
            .into_iter()
            .find(|m| m.role == role)
            .ok_or_else(|| ApiError::bad_request(format!("No {} agent on the team", role)))?;
        task.assign(member.agent_id, role);
    }

    state.tasks.save(&task).await?;
    info!(%sprint_id, task_id = %task.id(), "Task created");
    Ok((StatusCode::CREATED, Json(TaskResponse::from(&task))))
}

/// GET /api/sprints/:id/tasks
pub async fn list_tasks(
    State(state): State<AppState>,
    Path(sprint_id): Path<Uuid>,
) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    if state.sprints.find_by_id(sprint_id).await?.is_none() {
        return Err(ApiError::not_found(format!("Sprint not found: {}", sprint_id)));
    }

    let tasks = state.tasks.find_by_sprint(sprint_id).await?;
    Ok(Json(tasks.iter().map(TaskResponse::from).collect()))
}
