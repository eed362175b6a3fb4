use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::agents::TeamMember;
use crate::api::errors::ApiError;
use crate::api::middleware::JwtAuth;
use crate::api::state::AppState;
use crate::domain::agent::{AgentProfile, AgentRole, AgentStatus};
use crate::project_context::ContextError;

/// Window the evolution report looks back over
const EVALUATION_PERIOD_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub agent_id: String,
    pub role: String,
    #[serde(default)]
    pub llm_provider: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AgentActionRequest {
    #[serde(rename = "type")]
    pub action: String,
}

/// Body of POST /api/agents/:id/switch
#[derive(Debug, Deserialize)]
pub struct SwitchRequest {
    pub project_id: String,
    #[serde(default = "default_preserve")]
    pub preserve_working_memory: bool,
}

fn default_preserve() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentAction {
    Pause,
    Resume,
    Restart,
}

impl AgentAction {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pause" => Some(Self::Pause),
            "resume" => Some(Self::Resume),
            "restart" => Some(Self::Restart),
            _ => None,
        }
    }

    fn resulting_status(&self) -> AgentStatus {
        match self {
            Self::Pause => AgentStatus::Offline,
            Self::Resume | Self::Restart => AgentStatus::Idle,
        }
    }
}

fn team_role(team: &[TeamMember], agent_id: &str) -> Result<AgentRole, ApiError> {
    team.iter()
        .find(|m| m.agent_id == agent_id)
        .map(|m| m.role)
        .ok_or_else(|| ApiError::not_found(format!("Agent not found: {}", agent_id)))
}

fn context_error(err: ContextError) -> ApiError {
    ApiError::not_found(err.to_string())
}

fn profile_json(profile: &AgentProfile) -> Value {
    json!({
        "agent_id": profile.id(),
        "role": profile.role(),
        "status": profile.current_status(),
        "llm_provider": profile.llm_provider(),
        "current_project_id": profile.current_project_id(),
        "tasks_completed": profile.tasks_completed(),
        "quality_score": profile.quality_score(),
        "last_active_at": profile.last_active_at(),
    })
}

/// Launcher team plus any separately registered agents
///
/// GET /api/agents/status
pub async fn agents_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (team, allocation, bus) = {
        let launcher = state.launcher.lock().await;
        let team = launcher.team();
        let roles: Vec<AgentRole> = team.iter().map(|m| m.role).collect();
        let services = launcher.services();
        (team, services.allocator.report(&roles), services.bus.stats().await)
    };
    let registered = state.agents.find_all().await?;

    let mut agents: Vec<Value> = team
        .iter()
        .map(|member| {
            json!({
                "agent_id": member.agent_id,
                "role": member.role,
                "status": member.status,
                "tasks_completed": member.tasks_completed,
                "tasks_failed": member.tasks_failed,
                "source": "team",
            })
        })
        .collect();

    let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_role: BTreeMap<String, usize> = BTreeMap::new();
    for member in &team {
        *by_status.entry(member.status.to_string()).or_default() += 1;
        *by_role.entry(member.role.to_string()).or_default() += 1;
    }

    for profile in registered.iter().filter(|p| !team.iter().any(|m| m.agent_id == p.id())) {
        let mut entry = profile_json(profile);
        entry["source"] = json!("registered");
        agents.push(entry);
        *by_status.entry(profile.current_status().to_string()).or_default() += 1;
        *by_role.entry(profile.role().to_string()).or_default() += 1;
    }

    let available = by_status.get("idle").copied().unwrap_or(0)
        + by_status.get("waiting").copied().unwrap_or(0);
    Ok(Json(json!({
        "agents": agents,
        "summary": {
            "total": agents.len(),
            "available": available,
            "by_status": by_status,
            "by_role": by_role,
        },
        "allocation": allocation,
        "message_bus": bus,
    })))
}

/// POST /api/agents/register
pub async fn register_agent(
    State(state): State<AppState>,
    auth: JwtAuth,
    Json(req): Json<RegisterAgentRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let role = AgentRole::parse(&req.role)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown role: {}", req.role)))?;

    let on_team = state
        .launcher
        .lock()
        .await
        .team()
        .iter()
        .any(|m| m.agent_id == req.agent_id);
    if on_team || state.agents.find_by_id(&req.agent_id).await?.is_some() {
        return Err(ApiError::conflict(format!(
            "Agent already registered: {}",
            req.agent_id
        )));
    }

    let provider = req
        .llm_provider
        .unwrap_or_else(|| state.settings.provider_for(role).to_string());
    let profile =
        AgentProfile::new(req.agent_id, role, provider).map_err(ApiError::bad_request)?;
    state.agents.save(&profile).await?;

    info!(agent_id = profile.id(), %role, operator = %auth.email, "Agent registered");
    Ok((StatusCode::CREATED, Json(profile_json(&profile))))
}

/// POST /api/agents/:id/action
pub async fn agent_action(
    State(state): State<AppState>,
    auth: JwtAuth,
    Path(agent_id): Path<String>,
    Json(req): Json<AgentActionRequest>,
) -> Result<Json<Value>, ApiError> {
    let action = AgentAction::parse(&req.action).ok_or_else(|| {
        ApiError::bad_request(format!(
            "Unknown action '{}'. Use pause, resume or restart",
            req.action
        ))
    })?;
    let status = action.resulting_status();

    let on_team = {
        let mut launcher = state.launcher.lock().await;
        match launcher.agent_mut(&agent_id) {
            Some(agent) => {
                if action == AgentAction::Restart {
                    agent.core_mut().cleanup();
                }
                agent.core_mut().set_status(status);
                true
            }
            None => false,
        }
    };

    match state.agents.find_by_id(&agent_id).await? {
        Some(mut profile) => {
            profile.set_status(status);
            state.agents.save(&profile).await?;
        }
        None if on_team => {}
        None => return Err(ApiError::not_found(format!("Agent not found: {}", agent_id))),
    }

    info!(%agent_id, action = %req.action, operator = %auth.email, "Agent action applied");
    Ok(Json(json!({
        "agent_id": agent_id,
        "action": req.action,
        "status": status,
    })))
}

/// Moves a team agent onto another launched project
///
/// POST /api/agents/:id/switch
pub async fn switch_agent(
    State(state): State<AppState>,
    auth: JwtAuth,
    Path(agent_id): Path<String>,
    Json(req): Json<SwitchRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut launcher = state.launcher.lock().await;
    let role = team_role(&launcher.team(), &agent_id)?;

    let services = launcher.services_mut();
    let context = services
        .contexts
        .switcher_mut()
        .switch_agent(
            &services.memory,
            &agent_id,
            &req.project_id,
            role,
            req.preserve_working_memory,
        )
        .map_err(context_error)?;
    let previous = match services.allocator.switch_agent(&agent_id, &req.project_id) {
        Ok(previous) => previous,
        Err(e) => {
            warn!(%agent_id, project_id = %req.project_id, error = %e, "Allocation focus unchanged");
            None
        }
    };

    info!(%agent_id, project_id = %req.project_id, operator = %auth.email, "Agent switched project");
    Ok(Json(json!({
        "agent_id": agent_id,
        "project_id": req.project_id,
        "previous_project_id": previous,
        "context": context,
    })))
}

/// GET /api/agents/:id/context?max_tokens=500
pub async fn agent_context(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<Value>, ApiError> {
    let mut launcher = state.launcher.lock().await;
    let role = team_role(&launcher.team(), &agent_id)?;

    let services = launcher.services_mut();
    let context = services
        .contexts
        .switcher_mut()
        .agent_context(&services.memory, &agent_id, role, query.max_tokens)
        .map_err(context_error)?;
    Ok(Json(Value::Object(context)))
}

/// Metric trends, evolution state and workload of one agent
///
/// GET /api/agents/:id/evolution
pub async fn agent_evolution(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let launcher = state.launcher.lock().await;
    let services = launcher.services();
    let report = services
        .metrics
        .evaluate_agent(&agent_id, EVALUATION_PERIOD_DAYS, Utc::now());

    Ok(Json(json!({
        "agent_id": agent_id,
        "report": report,
        "evolution": services.evolution.status(Some(agent_id.as_str())),
        "workload": services.allocator.workload(&agent_id),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_case_insensitively() {
        assert_eq!(AgentAction::parse("Pause"), Some(AgentAction::Pause));
        assert_eq!(AgentAction::parse(" restart "), Some(AgentAction::Restart));
        assert_eq!(AgentAction::parse("terminate"), None);
    }

    #[test]
    fn pause_takes_agent_offline() {
        assert_eq!(AgentAction::Pause.resulting_status(), AgentStatus::Offline);
        assert_eq!(AgentAction::Resume.resulting_status(), AgentStatus::Idle);
    }
}
