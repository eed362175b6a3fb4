// Project launcher
//
// Runs a new project through the team in a fixed order: planning,
// requirements, architecture, development setup and QA planning. The first
// three phases gate the launch; the last two are recorded even when they fail.
// Launched projects are then wired into the team services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::architect::ArchitectAgent;
use super::base::{is_success, Agent, AgentContext, AgentCore};
use super::developer::DeveloperAgent;
use super::errors::{AgentError, AgentResult};
use super::manager::ManagerAgent;
use super::pm::PmAgent;
use super::qa::QaAgent;
use super::services::TeamServices;
use crate::config::Settings;
use crate::domain::agent::{AgentRole, AgentStatus};

/// What the operator asks for when starting a project
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_project_type")]
    pub project_type: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub timeline: Option<String>,
    #[serde(default)]
    pub requirements: Vec<Value>,
    #[serde(default)]
    pub business_goals: Vec<String>,
}

fn default_project_type() -> String {
    "web".to_string()
}

fn default_priority() -> String {
    "medium".to_string()
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            project_type: default_project_type(),
            priority: default_priority(),
            budget: None,
            timeline: None,
            requirements: Vec::new(),
            business_goals: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPhase {
    Planning,
    Requirements,
    Architecture,
    Development,
    QaPlanning,
}

impl LaunchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Requirements => "requirements",
            Self::Architecture => "architecture",
            Self::Development => "development",
            Self::QaPlanning => "qa_planning",
        }
    }

    /// Failures in these phases abort the launch
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Planning | Self::Requirements | Self::Architecture)
    }
}

/// Outcome of a single launch phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseOutcome {
    pub agent_id: String,
    pub succeeded: bool,
    pub output: Value,
}

/// A project that made it through launch
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedProject {
    pub project_id: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub sprint_id: String,
    pub phases: BTreeMap<LaunchPhase, PhaseOutcome>,
    pub assigned_agents: Vec<String>,
    pub next_steps: Vec<String>,
}

impl LaunchedProject {
    pub fn phase(&self, phase: LaunchPhase) -> Option<&PhaseOutcome> {
        self.phases.get(&phase)
    }
}

/// Snapshot of one team member for status endpoints
#[derive(Debug, Clone, Serialize)]
pub struct TeamMember {
    pub agent_id: String,
    pub role: AgentRole,
    pub status: AgentStatus,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
}

pub struct ProjectLauncher {
    manager: ManagerAgent,
    pm: PmAgent,
    architect: ArchitectAgent,
    developer: DeveloperAgent,
    qa: QaAgent,
    projects: HashMap<String, LaunchedProject>,
    services: TeamServices,
}

impl ProjectLauncher {
    pub fn new(settings: &Settings) -> Self {
        let core = |id: &str, role| AgentCore::from_settings(id, role, settings);
        Self {
            manager: ManagerAgent::new(core("manager-001", AgentRole::Manager)),
            pm: PmAgent::new(core("pm-001", AgentRole::Pm)),
            architect: ArchitectAgent::new(core("arch-001", AgentRole::Architect)),
            developer: DeveloperAgent::new(core("dev-001", AgentRole::Developer)),
            qa: QaAgent::new(core("qa-001", AgentRole::Qa)),
            projects: HashMap::new(),
            services: TeamServices::new(settings),
        }
    }

    pub async fn launch_project(&mut self, config: &ProjectConfig) -> AgentResult<LaunchedProject> {
        let project_id = Uuid::new_v4().to_string();
        self.launch_with_id(&project_id, config).await
    }

    /// Launches under a caller-chosen id, e.g. the id of an already persisted project
    pub async fn launch_with_id(&mut self, project_id: &str, config: &ProjectConfig) -> AgentResult<LaunchedProject> {
        if config.name.trim().is_empty() {
            return Err(AgentError::InvalidInput("project name is required".into()));
        }

        let sprint_id = format!("sprint-{project_id}-001");
        let ctx = AgentContext::for_project(project_id).with_sprint(sprint_id.clone());
        info!(project_id, name = %config.name, "Launching project");

        let plan = [
            (
                LaunchPhase::Planning,
                json!({
                    "type": "project_planning",
                    "project_info": {
                        "name": config.name,
                        "description": config.description,
                        "type": config.project_type,
                        "priority": config.priority,
                        "budget": config.budget,
                        "timeline": config.timeline,
                        "requirements": config.requirements,
                    },
                }),
            ),
            (
                LaunchPhase::Requirements,
                json!({
                    "type": "analyze_requirements",
                    "requirements": config.requirements,
                    "business_goals": config.business_goals,
                }),
            ),
            (
                LaunchPhase::Architecture,
                json!({
                    "type": "design_architecture",
                    "requirements": config.requirements,
                }),
            ),
            (
                LaunchPhase::Development,
                json!({
                    "type": "setup_project",
                    "project_config": {"name": config.name, "description": config.description},
                }),
            ),
            (
                LaunchPhase::QaPlanning,
                json!({
                    "type": "create_test_suite",
                    "requirements": config.requirements,
                }),
            ),
        ];

        let mut phases = BTreeMap::new();
        for (phase, task) in plan {
            let agent = self.agent_for(phase);
            let agent_id = agent.id().to_string();
            let (succeeded, output) = match agent.execute(&task, &ctx).await {
                Ok(output) if is_success(&output) => (true, output),
                Ok(output) => (false, output),
                Err(e) => (false, json!({"status": "error", "message": e.to_string()})),
            };

            if !succeeded {
                let reason = output.get("message").and_then(Value::as_str).unwrap_or("unsuccessful output").to_string();
                if phase.is_fatal() {
                    error!(project_id, phase = phase.as_str(), %reason, "Launch aborted");
                    return Err(AgentError::PhaseFailed {
                        phase: phase.as_str().to_string(),
                        reason,
                    });
                }
                warn!(project_id, phase = phase.as_str(), %reason, "Launch phase failed, continuing");
            }
            phases.insert(phase, PhaseOutcome { agent_id, succeeded, output });
        }

        let project = LaunchedProject {
            project_id: project_id.to_string(),
            name: config.name.clone(),
            status: "active".to_string(),
            created_at: Utc::now(),
            sprint_id,
            phases,
            assigned_agents: self.team().into_iter().map(|m| m.agent_id).collect(),
            next_steps: vec![
                "Review the project plan and timeline".to_string(),
                "Refine the user stories with stakeholders".to_string(),
                "Approve the architecture design".to_string(),
                "Start the first development sprint".to_string(),
                "Run the initial test suite".to_string(),
            ],
        };

        info!(project_id, "Project launched");
        self.projects.insert(project_id.to_string(), project.clone());
        let team = self.team();
        self.services.on_launch(&project, config, &team).await;
        Ok(project)
    }

    pub fn get_project_status(&self, project_id: &str) -> Option<&LaunchedProject> {
        self.projects.get(project_id)
    }

    pub fn list_active_projects(&self) -> Vec<&LaunchedProject> {
        let mut active: Vec<&LaunchedProject> = self.projects.values().filter(|p| p.status == "active").collect();
        active.sort_by_key(|p| p.created_at);
        active
    }

    /// Drops the launch record and releases the project from the team
    /// services; returns whether a record existed
    pub async fn forget_project(&mut self, project_id: &str) -> bool {
        if self.projects.remove(project_id).is_none() {
            return false;
        }
        let team = self.team();
        self.services.on_forget(project_id, &team).await;
        true
    }

    /// Has the manager arbitrate a conflict between two agents
    ///
    /// The conflict is also reported on the message bus, and for launched
    /// projects the decision lands in the current sprint's memory.
    pub async fn resolve_conflict(&mut self, project_id: &str, conflict: &Value) -> AgentResult<Value> {
        self.services.report_conflict(project_id, conflict).await;

        let task = json!({"type": "resolve_conflict", "conflict": conflict});
        let ctx = AgentContext::for_project(project_id);
        let output = self.manager.execute(&task, &ctx).await?;

        if let Some(launched) = self.projects.get(project_id) {
            let record = &output["conflict_resolution"];
            let decision = json!({
                "type": "conflict_resolution",
                "description": record["resolution"]["decision"],
                "rationale": record["resolution"]["rationale"],
                "agents": [record["agent1_id"], record["agent2_id"]],
            });
            if let Err(e) = self.services.memory.add_decision(project_id, &launched.sprint_id, decision) {
                warn!(project_id, error = %e, "Conflict decision not stored in sprint memory");
            }
        }
        Ok(output)
    }

    pub fn services(&self) -> &TeamServices {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut TeamServices {
        &mut self.services
    }

    pub fn team(&self) -> Vec<TeamMember> {
        let members: [&dyn Agent; 5] = [&self.manager, &self.pm, &self.architect, &self.developer, &self.qa];
        members
            .iter()
            .map(|agent| TeamMember {
                agent_id: agent.id().to_string(),
                role: agent.role(),
                status: agent.status(),
                tasks_completed: agent.core().tasks_completed(),
                tasks_failed: agent.core().tasks_failed(),
            })
            .collect()
    }

    pub fn agent_mut(&mut self, agent_id: &str) -> Option<&mut dyn Agent> {
        let members: [&mut dyn Agent; 5] = [
            &mut self.manager,
            &mut self.pm,
            &mut self.architect,
            &mut self.developer,
            &mut self.qa,
        ];
        members.into_iter().find(|agent| agent.id() == agent_id)
    }

    fn agent_for(&mut self, phase: LaunchPhase) -> &mut dyn Agent {
        match phase {
            LaunchPhase::Planning => &mut self.manager,
            LaunchPhase::Requirements => &mut self.pm,
            LaunchPhase::Architecture => &mut self.architect,
            LaunchPhase::Development => &mut self.developer,
            LaunchPhase::QaPlanning => &mut self.qa,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher() -> ProjectLauncher {
        ProjectLauncher::new(&Settings::default())
    }

    fn config() -> ProjectConfig {
        let mut config = ProjectConfig::new("Storefront");
        config.description = "Online shop".into();
        config.requirements = vec![json!("Users should browse products"), json!("Users should pay by card")];
        config.business_goals = vec!["increase sales".into()];
        config
    }

    #[tokio::test]
    async fn launch_runs_every_phase() {
        let mut launcher = launcher();
        let project = launcher.launch_project(&config()).await.unwrap();

        assert_eq!(project.status, "active");
        assert_eq!(project.phases.len(), 5);
        assert!(project.phases.values().all(|p| p.succeeded));
        assert_eq!(project.sprint_id, format!("sprint-{}-001", project.project_id));
        assert_eq!(project.assigned_agents.len(), 5);
        assert_eq!(project.next_steps.len(), 5);

        let planning = project.phase(LaunchPhase::Planning).unwrap();
        assert_eq!(planning.agent_id, "manager-001");
        assert!(planning.output["project_plan"].is_object());
        assert_eq!(
            project.phase(LaunchPhase::Requirements).unwrap().output["analysis"]["total_requirements"],
            2
        );
    }

    #[tokio::test]
    async fn launched_projects_are_listed() {
        let mut launcher = launcher();
        let project = launcher.launch_with_id("p-1", &config()).await.unwrap();
        assert_eq!(project.project_id, "p-1");
        assert!(launcher.get_project_status("p-1").is_some());
        assert_eq!(launcher.list_active_projects().len(), 1);
        assert!(launcher.forget_project("p-1").await);
        assert!(!launcher.forget_project("p-1").await);
        assert!(launcher.list_active_projects().is_empty());
    }

    #[tokio::test]
    async fn team_is_idle_after_launch() {
        let mut launcher = launcher();
        launcher.launch_project(&config()).await.unwrap();
        let team = launcher.team();
        assert!(team.iter().all(|m| m.status == AgentStatus::Idle));
        assert!(team.iter().all(|m| m.tasks_completed == 1));
    }

    #[tokio::test]
    async fn offline_planner_aborts_launch() {
        let mut launcher = launcher();
        launcher.agent_mut("manager-001").unwrap().core_mut().cleanup();

        let err = launcher.launch_project(&config()).await.unwrap_err();
        assert!(matches!(err, AgentError::PhaseFailed { ref phase, .. } if phase == "planning"));
        assert!(launcher.list_active_projects().is_empty());
    }

    #[tokio::test]
    async fn late_phase_failures_are_recorded() {
        let mut launcher = launcher();
        launcher.agent_mut("qa-001").unwrap().core_mut().cleanup();

        let project = launcher.launch_project(&config()).await.unwrap();
        let qa = project.phase(LaunchPhase::QaPlanning).unwrap();
        assert!(!qa.succeeded);
        assert_eq!(qa.output["status"], "error");
    }

    #[tokio::test]
    async fn blank_names_are_rejected() {
        let mut launcher = launcher();
        let err = launcher.launch_project(&ProjectConfig::new("  ")).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn launch_is_wired_into_team_services() {
        let mut launcher = launcher();
        let project = launcher.launch_with_id("p-1", &config()).await.unwrap();
        let services = launcher.services();

        let tracked = services.allocator.project("p-1").unwrap();
        assert_eq!(tracked.team.len(), 5);
        assert!(services.memory.is_initialized("p-1", &project.sprint_id));
        assert!(services.memory.is_initialized("p-1", crate::project_context::INIT_SPRINT));
        assert_eq!(services.rag.indexed(), 5);
        assert_eq!(services.metrics.history("dev-001", crate::agents::services::COMPLETION_METRIC).len(), 1);
        assert!(!services.knowledge.is_empty());
        // one report per phase run by another agent; invites go to the rest
        assert_eq!(services.bus.queue_size("manager-001").await, 4);
        assert_eq!(services.bus.queue_size("dev-001").await, 1);

        let minutes = crate::memory::MeetingMinutesManager::new(&mut launcher.services_mut().memory)
            .history("p-1", &project.sprint_id, None, 10);
        assert_eq!(minutes.len(), 1);
        assert_eq!(minutes[0].participants.len(), 5);
    }

    #[tokio::test]
    async fn forgetting_releases_team_services() {
        let mut launcher = launcher();
        let project = launcher.launch_with_id("p-1", &config()).await.unwrap();

        launcher.forget_project("p-1").await;
        let services = launcher.services();

        assert!(services.allocator.project("p-1").is_none());
        assert!(!services.memory.is_initialized("p-1", &project.sprint_id));
        assert_eq!(services.rag.indexed(), 0);
        assert_eq!(services.allocator.workload("dev-001").total_allocation, 0.0);
    }

    #[tokio::test]
    async fn developer_capacity_limits_concurrent_launches() {
        let mut launcher = launcher();
        for id in ["p-1", "p-2", "p-3"] {
            launcher.launch_with_id(id, &config()).await.unwrap();
        }
        let allocator = &launcher.services().allocator;

        assert_eq!(allocator.project("p-2").unwrap().team.len(), 5);
        assert!(!allocator.project("p-3").unwrap().team.contains(&"dev-001".to_string()));
        let report = allocator.report(&[AgentRole::Developer]);
        assert_eq!(report.missing_roles, vec![("p-3".to_string(), vec![AgentRole::Developer])]);
    }

    #[tokio::test]
    async fn conflicts_are_arbitrated_and_remembered() {
        let mut launcher = launcher();
        let project = launcher.launch_with_id("p-1", &config()).await.unwrap();
        let conflict = json!({
            "type": "technical",
            "agent1_id": "dev-001",
            "agent2_id": "arch-001",
            "description": "ORM versus raw SQL",
        });

        let output = launcher.resolve_conflict("p-1", &conflict).await.unwrap();

        assert_eq!(output["status"], "success");
        assert_eq!(output["conflict_resolution"]["resolution"]["method"], "rule_based");
        let core = launcher.services().memory.core("p-1", &project.sprint_id).unwrap();
        let decisions = core["key_decisions"].as_array().unwrap();
        assert_eq!(decisions.last().unwrap()["type"], "conflict_resolution");
        // launch reports, kickoff invites and the conflict report
        assert_eq!(launcher.services().bus.queue_size("manager-001").await, 5);
    }
}
