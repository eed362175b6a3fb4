// Team services
//
// The supporting machinery every launched project is wired into: agent
// allocation, sprint memory, retrieval, messaging, evolution tracking, the
// knowledge base and project contexts.

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::launcher::{LaunchPhase, LaunchedProject, ProjectConfig, TeamMember};
use crate::allocation::{ProjectAllocator, ProjectPriority};
use crate::communication::bus::{DeliveryMode, MessageBus};
use crate::communication::protocol;
use crate::config::Settings;
use crate::evolution::knowledge::experience;
use crate::evolution::{
    AgentEvolutionEngine, EvolutionMetricsEngine, KnowledgeEvolutionEngine, ProjectRetrospectiveEngine,
};
use crate::memory::embedding::HashEmbedding;
use crate::memory::meetings::{Attendance, MeetingMinutesManager, MeetingType, Participant};
use crate::memory::rag::RagRetriever;
use crate::memory::sprint::SprintMemoryManager;
use crate::project_context::ProjectContextManager;

/// Agent every launch report and conflict goes to
pub const COORDINATOR: &str = "manager-001";

/// Share of an agent's time a launch claims
pub const LAUNCH_ALLOCATION: f64 = 0.5;

/// Metric every phase outcome is recorded under
pub const COMPLETION_METRIC: &str = "task_completion_rate";

pub struct TeamServices {
    pub allocator: ProjectAllocator,
    pub memory: SprintMemoryManager,
    pub rag: RagRetriever,
    pub bus: MessageBus,
    pub metrics: EvolutionMetricsEngine,
    pub evolution: AgentEvolutionEngine,
    pub knowledge: KnowledgeEvolutionEngine,
    pub retrospectives: ProjectRetrospectiveEngine,
    pub contexts: ProjectContextManager,
}

impl TeamServices {
    pub fn new(settings: &Settings) -> Self {
        let embedder = HashEmbedding::new(settings.embedding_dimension, settings.embedding_cache_size);
        Self {
            allocator: ProjectAllocator::from_settings(settings),
            memory: SprintMemoryManager::new(),
            rag: RagRetriever::new(Box::new(embedder)),
            bus: MessageBus::new(),
            metrics: EvolutionMetricsEngine::new(),
            evolution: AgentEvolutionEngine::new(),
            knowledge: KnowledgeEvolutionEngine::new(),
            retrospectives: ProjectRetrospectiveEngine::new(),
            contexts: ProjectContextManager::new(),
        }
    }

    /// Wires a freshly launched project into every service
    ///
    /// Failures here are logged and skipped; a launch that got this far is
    /// never undone by its bookkeeping.
    pub async fn on_launch(&mut self, project: &LaunchedProject, config: &ProjectConfig, team: &[TeamMember]) {
        self.allocate(project, config, team);
        self.open_memory(project, config, team);
        self.announce(project, team).await;
        self.index_outputs(project);
        self.learn_from(project, config);
        info!(project_id = %project.project_id, "Launch recorded in team services");
    }

    /// Releases everything held for the project
    pub async fn on_forget(&mut self, project_id: &str, team: &[TeamMember]) {
        let tracked = self.allocator.release_project(project_id);
        let released = self.contexts.archive(&mut self.memory, project_id);
        let documents = self.rag.forget_project(project_id);
        for member in team {
            self.bus.leave_project(&member.agent_id, project_id).await;
        }
        info!(
            project_id,
            tracked,
            agents = released.len(),
            documents,
            "Released project from team services"
        );
    }

    /// Feeds one task outcome into both the metric history and the
    /// evolution engine's decline detection
    pub fn record_outcome(&mut self, agent_id: &str, project_id: &str, value: f64, context: Value) {
        if let Err(e) = self
            .metrics
            .record_metric(agent_id, COMPLETION_METRIC, value, context.clone(), Some(project_id))
        {
            warn!(agent_id, error = %e, "Metric not recorded");
        }
        if let Some(trigger) = self
            .evolution
            .record_performance(agent_id, COMPLETION_METRIC, value, context)
        {
            info!(agent_id, ?trigger, "Evolution trigger raised");
        }
    }

    /// Posts a conflict report to the coordinator's mailbox
    pub async fn report_conflict(&self, project_id: &str, conflict: &Value) {
        let from = conflict.get("agent1_id").and_then(Value::as_str).unwrap_or_default();
        let other = conflict.get("agent2_id").and_then(Value::as_str).unwrap_or_default();
        let report = protocol::conflict_report(from, other, conflict, project_id);
        if let Err(e) = self.bus.send(report, DeliveryMode::Direct).await {
            warn!(project_id, error = %e, "Conflict report not delivered");
        }
    }

    fn allocate(&mut self, project: &LaunchedProject, config: &ProjectConfig, team: &[TeamMember]) {
        let project_id = project.project_id.as_str();
        let priority = ProjectPriority::parse(&config.priority);
        if let Err(e) = self.allocator.track_project(project_id, &project.name, priority) {
            warn!(project_id, error = %e, "Project not tracked for allocation");
            return;
        }
        for member in team {
            if let Err(e) = self
                .allocator
                .assign_agent(project_id, &member.agent_id, member.role, LAUNCH_ALLOCATION)
            {
                warn!(project_id, agent_id = %member.agent_id, error = %e, "Agent not allocated");
            }
        }
    }

    fn open_memory(&mut self, project: &LaunchedProject, config: &ProjectConfig, team: &[TeamMember]) {
        let project_id = project.project_id.as_str();
        let members: Vec<&str> = team.iter().map(|m| m.agent_id.as_str()).collect();
        let profile = json!({
            "name": project.name,
            "type": config.project_type,
            "team_members": members,
        });
        self.contexts.initialize(&mut self.memory, project_id, &profile);

        let goal = format!("Deliver the first increment of {}", project.name);
        self.memory
            .initialize_sprint(project_id, &project.sprint_id, &goal, json!(config.business_goals));
        self.contexts
            .switcher_mut()
            .set_current_sprint(project_id, &project.sprint_id);

        let stories = project
            .phase(LaunchPhase::Requirements)
            .and_then(|p| p.output.get("user_stories"))
            .cloned()
            .unwrap_or_else(|| json!([]));
        let participants = team
            .iter()
            .map(|m| Participant {
                agent_id: m.agent_id.clone(),
                role: m.role.as_str().to_string(),
                attendance: Attendance::Present,
            })
            .collect();
        let outcomes = json!({"sprint_goal": goal, "user_stories": stories});

        if let Err(e) = MeetingMinutesManager::new(&mut self.memory).create_minutes(
            project_id,
            &project.sprint_id,
            MeetingType::Planning,
            participants,
            Value::Null,
            outcomes,
        ) {
            warn!(project_id, error = %e, "Planning minutes not recorded");
        }
    }

    async fn announce(&self, project: &LaunchedProject, team: &[TeamMember]) {
        let project_id = project.project_id.as_str();
        for member in team {
            self.bus.register_agent(&member.agent_id, member.role).await;
            if let Err(e) = self.bus.join_project(&member.agent_id, project_id).await {
                warn!(project_id, agent_id = %member.agent_id, error = %e, "Agent did not join project channel");
            }
        }

        let mut messages = Vec::new();
        for (phase, outcome) in &project.phases {
            if outcome.agent_id == COORDINATOR {
                continue;
            }
            messages.push(if outcome.succeeded {
                protocol::work_complete(
                    &outcome.agent_id,
                    COORDINATOR,
                    &json!({"task_name": phase.as_str(), "status": "success"}),
                    project_id,
                    None,
                )
            } else {
                let reason = outcome.output.get("message").cloned().unwrap_or(Value::Null);
                protocol::status_update(
                    &outcome.agent_id,
                    COORDINATOR,
                    &json!({"status": "blocked", "current_task": {"phase": phase.as_str()}, "blockers": [reason]}),
                    project_id,
                )
            });
        }

        let attendees: Vec<String> = team
            .iter()
            .filter(|m| m.agent_id != COORDINATOR)
            .map(|m| m.agent_id.clone())
            .collect();
        let kickoff = json!({
            "type": "planning",
            "title": format!("Sprint 1 kickoff: {}", project.name),
            "agenda": ["Review launch outputs", "Confirm sprint goal", "Assign first stories"],
        });
        messages.extend(protocol::meeting_invites(COORDINATOR, &attendees, &kickoff, project_id));

        let mut delivered = 0;
        for message in messages {
            match self.bus.send(message, DeliveryMode::Direct).await {
                Ok(count) => delivered += count,
                Err(e) => warn!(project_id, error = %e, "Launch message not sent"),
            }
        }
        debug!(project_id, delivered, "Launch announced on message bus");
    }

    fn index_outputs(&mut self, project: &LaunchedProject) {
        let project_id = project.project_id.as_str();
        for (phase, outcome) in project.phases.iter().filter(|(_, o)| o.succeeded) {
            let content_type = match phase {
                LaunchPhase::Development => "code",
                LaunchPhase::QaPlanning => "patterns",
                LaunchPhase::Planning | LaunchPhase::Requirements | LaunchPhase::Architecture => "decisions",
            };
            let content = json!({
                "title": format!("{} {} output", project.name, phase.as_str()),
                "phase": phase,
                "agent_id": outcome.agent_id,
                "output": outcome.output,
            });
            if let Err(e) = self.rag.index_memory(
                project_id,
                Some(&project.sprint_id),
                Some(&outcome.agent_id),
                content_type,
                &content,
            ) {
                warn!(project_id, phase = phase.as_str(), error = %e, "Phase output not indexed");
            }
        }
    }

    fn learn_from(&mut self, project: &LaunchedProject, config: &ProjectConfig) {
        let project_id = project.project_id.as_str();
        for (phase, outcome) in &project.phases {
            let value = if outcome.succeeded { 1.0 } else { 0.0 };
            self.record_outcome(
                &outcome.agent_id,
                project_id,
                value,
                json!({"phase": phase, "project_id": project_id}),
            );

            let key = if outcome.succeeded {
                "successful_actions"
            } else {
                "failed_actions"
            };
            let report = experience([(
                key,
                json!([{
                    "actions": [phase.as_str()],
                    "context": {"project_id": project_id},
                    "outcome": {"phase": phase.as_str()},
                }]),
            )]);
            let context = json!({
                "project_id": project_id,
                "project_type": config.project_type,
                "task_type": phase.as_str(),
            });
            self.knowledge
                .extract_from_experience(&report, &outcome.agent_id, &context);
        }
    }
}
