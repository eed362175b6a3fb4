// Per-project context snapshots and switching agents between projects

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::domain::agent::AgentRole;
use crate::memory::compressor::{ContextCompressor, CompressionStrategy};
use crate::memory::sprint::{MemoryLayer, SprintMemoryManager};

/// Token budget of the context handed to a switched agent
pub const SWITCH_TOKEN_BUDGET: usize = 3000;

/// Sprint id of the memory created when a project context is initialised
pub const INIT_SPRINT: &str = "project_init";

const STALE_AFTER_HOURS: i64 = 24;
const RECENT_ACTIVITY_LIMIT: usize = 10;

/// Elements `clone_context` knows how to copy
pub const CLONEABLE: [&str; 3] = ["tech_stack", "key_decisions", "knowledge_base"];

#[derive(Debug, Error, PartialEq)]
pub enum ContextError {
    #[error("No context registered for project {0}")]
    UnknownProject(String),

    #[error("Agent {0} is not working on any project")]
    NoCurrentProject(String),
}

/// Static facts about a project, registered when its context is initialised
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectProfile {
    pub name: String,
    pub project_type: String,
    pub tech_stack: Value,
    pub team_members: Vec<String>,
    pub current_sprint_id: Option<String>,
    pub knowledge_base: Value,
}

/// Everything an agent needs to pick up work on a project
#[derive(Debug, Clone, Serialize)]
pub struct ProjectContext {
    pub project_id: String,
    pub project_name: String,
    pub project_type: String,
    pub tech_stack: Value,
    pub current_sprint_id: Option<String>,
    pub sprint_goal: Option<String>,
    pub team_members: Vec<String>,
    pub key_decisions: Vec<Value>,
    pub active_blockers: Vec<Value>,
    pub recent_activities: Vec<Value>,
    pub knowledge_base: Value,
    pub last_updated: DateTime<Utc>,
}

impl ProjectContext {
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_hours: i64) -> bool {
        now - self.last_updated > Duration::hours(max_age_hours)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SwitchStats {
    pub total_switches: u64,
    pub successful_switches: u64,
    pub failed_switches: u64,
    pub average_switch_ms: f64,
    pub cached_contexts: usize,
    pub active_agent_contexts: usize,
    pub success_rate: f64,
}

/// Moves agents between project contexts
///
/// Contexts are assembled from the registered profile and the project's
/// sprint memory, cached until stale, tailored to the agent's role and
/// compressed to [`SWITCH_TOKEN_BUDGET`].
#[derive(Debug, Default)]
pub struct ProjectSwitcher {
    profiles: HashMap<String, ProjectProfile>,
    cache: HashMap<String, ProjectContext>,
    agent_projects: HashMap<String, String>,
    /// Saved working memory per (agent, project)
    working: HashMap<(String, String), Value>,
    compressor: ContextCompressor,
    stats: SwitchStats,
}

impl ProjectSwitcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, project_id: &str, profile: ProjectProfile) {
        self.cache.remove(project_id);
        self.profiles.insert(project_id.to_string(), profile);
    }

    /// Points the project's context at another sprint; false when unregistered
    pub fn set_current_sprint(&mut self, project_id: &str, sprint_id: &str) -> bool {
        let Some(profile) = self.profiles.get_mut(project_id) else {
            return false;
        };
        profile.current_sprint_id = Some(sprint_id.to_string());
        self.cache.remove(project_id);
        true
    }

    pub fn current_project(&self, agent_id: &str) -> Option<&str> {
        self.agent_projects.get(agent_id).map(String::as_str)
    }

    pub fn save_working_memory(&mut self, agent_id: &str, project_id: &str, memory: Value) {
        self.working
            .insert((agent_id.to_string(), project_id.to_string()), memory);
    }

    /// Points `agent_id` at `project_id` and returns its tailored context
    ///
    /// With `preserve_working_memory` unset the agent's saved working memory
    /// for the project it leaves is discarded.
    pub fn switch_agent(
        &mut self,
        memory: &SprintMemoryManager,
        agent_id: &str,
        project_id: &str,
        role: AgentRole,
        preserve_working_memory: bool,
    ) -> Result<Map<String, Value>, ContextError> {
        let started = Instant::now();
        self.stats.total_switches += 1;
        let previous = self.agent_projects.get(agent_id).cloned();
        info!(agent_id, from = ?previous, to = project_id, "Switching agent project");

        if let Some(previous) = previous.filter(|p| p != project_id) {
            if !preserve_working_memory {
                self.working.remove(&(agent_id.to_string(), previous));
            }
        }

        let context = match self.load(memory, project_id, false) {
            Ok(context) => context,
            Err(e) => {
                self.stats.failed_switches += 1;
                error!(agent_id, project_id, error = %e, "Agent switch failed");
                return Err(e);
            }
        };
        let tailored = self.customize(&context, agent_id, role);
        let compressed = self
            .compressor
            .compress(&tailored, SWITCH_TOKEN_BUDGET, CompressionStrategy::Hierarchical);
        self.agent_projects
            .insert(agent_id.to_string(), project_id.to_string());

        let elapsed = started.elapsed().as_secs_f64() * 1000.0;
        self.stats.successful_switches += 1;
        let n = self.stats.successful_switches as f64;
        self.stats.average_switch_ms = (self.stats.average_switch_ms * (n - 1.0) + elapsed) / n;
        info!(agent_id, project_id, elapsed_ms = elapsed, "Agent switched");
        Ok(compressed)
    }

    /// The agent's current context, compressed to `max_tokens` when given
    pub fn agent_context(
        &mut self,
        memory: &SprintMemoryManager,
        agent_id: &str,
        role: AgentRole,
        max_tokens: Option<usize>,
    ) -> Result<Map<String, Value>, ContextError> {
        let project_id = self
            .agent_projects
            .get(agent_id)
            .cloned()
            .ok_or_else(|| ContextError::NoCurrentProject(agent_id.to_string()))?;
        let context = self.load(memory, &project_id, false)?;
        let tailored = self.customize(&context, agent_id, role);
        Ok(match max_tokens {
            Some(budget) => self
                .compressor
                .compress(&tailored, budget, CompressionStrategy::Hierarchical),
            None => tailored,
        })
    }

    pub fn refresh(&mut self, memory: &SprintMemoryManager, project_id: &str) -> bool {
        self.cache.remove(project_id);
        self.load(memory, project_id, true).is_ok()
    }

    pub fn summary(&mut self, memory: &SprintMemoryManager, project_id: &str) -> Option<Value> {
        let context = self.load(memory, project_id, false).ok()?;
        Some(json!({
            "project_id": project_id,
            "project_name": context.project_name,
            "sprint_goal": context.sprint_goal,
            "team_size": context.team_members.len(),
            "decisions_count": context.key_decisions.len(),
            "blockers_count": context.active_blockers.len(),
            "last_updated": context.last_updated.to_rfc3339(),
            "is_stale": context.is_stale(Utc::now(), STALE_AFTER_HOURS),
        }))
    }

    /// Drops cached contexts older than `max_age_hours`
    pub fn cleanup_stale(&mut self, now: DateTime<Utc>, max_age_hours: i64) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, context| !context.is_stale(now, max_age_hours));
        let removed = before - self.cache.len();
        info!(removed, "Cleaned up stale project contexts");
        removed
    }

    /// Forgets the project; returns the agents that were working on it
    pub fn forget_project(&mut self, project_id: &str) -> Vec<String> {
        self.profiles.remove(project_id);
        self.cache.remove(project_id);
        self.working.retain(|(_, project), _| project != project_id);
        let released: Vec<String> = self
            .agent_projects
            .iter()
            .filter(|(_, project)| project.as_str() == project_id)
            .map(|(agent, _)| agent.clone())
            .collect();
        for agent in &released {
            self.agent_projects.remove(agent);
        }
        released
    }

    pub fn stats(&self) -> SwitchStats {
        SwitchStats {
            cached_contexts: self.cache.len(),
            active_agent_contexts: self.agent_projects.len(),
            success_rate: self.stats.successful_switches as f64 / self.stats.total_switches.max(1) as f64,
            ..self.stats.clone()
        }
    }

    fn load(
        &mut self,
        memory: &SprintMemoryManager,
        project_id: &str,
        force: bool,
    ) -> Result<ProjectContext, ContextError> {
        let now = Utc::now();
        if !force {
            if let Some(cached) = self.cache.get(project_id) {
                if !cached.is_stale(now, STALE_AFTER_HOURS) {
                    return Ok(cached.clone());
                }
            }
        }

        let profile = self
            .profiles
            .get(project_id)
            .ok_or_else(|| ContextError::UnknownProject(project_id.to_string()))?;
        let sprint = profile.current_sprint_id.as_deref().unwrap_or(INIT_SPRINT);
        let core = memory.core(project_id, sprint);
        let list = |field: &str| -> Vec<Value> {
            core.and_then(|c| c.get(field))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        let mut activities: Vec<(DateTime<Utc>, Value)> = [MemoryLayer::Working, MemoryLayer::Episodic]
            .into_iter()
            .flat_map(|layer| memory.layer_items(project_id, sprint, layer))
            .map(|item| (item.created_at, item.content.clone()))
            .collect();
        activities.sort_by(|a, b| b.0.cmp(&a.0));

        let context = ProjectContext {
            project_id: project_id.to_string(),
            project_name: profile.name.clone(),
            project_type: profile.project_type.clone(),
            tech_stack: profile.tech_stack.clone(),
            current_sprint_id: Some(sprint.to_string()),
            sprint_goal: core
                .and_then(|c| c.get("sprint_goal"))
                .and_then(Value::as_str)
                .map(str::to_string),
            team_members: profile.team_members.clone(),
            key_decisions: list("key_decisions"),
            active_blockers: list("active_blockers"),
            recent_activities: activities
                .into_iter()
                .take(RECENT_ACTIVITY_LIMIT)
                .map(|(_, content)| content)
                .collect(),
            knowledge_base: profile.knowledge_base.clone(),
            last_updated: now,
        };
        self.cache.insert(project_id.to_string(), context.clone());
        Ok(context)
    }

    fn customize(&self, context: &ProjectContext, agent_id: &str, role: AgentRole) -> Map<String, Value> {
        let mut tailored = match serde_json::to_value(context) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };

        let mentions = |items: &[Value], field: &str, words: &[&str]| -> Vec<Value> {
            items
                .iter()
                .filter(|item| {
                    let text = item.get(field).and_then(Value::as_str).unwrap_or_default().to_lowercase();
                    words.iter().any(|w| text.contains(w))
                })
                .cloned()
                .collect()
        };

        let focus: &[&str] = match role {
            AgentRole::Pm => {
                tailored.insert(
                    "relevant_decisions".into(),
                    json!(mentions(&context.key_decisions, "decision", &["requirement"])),
                );
                &["requirements", "user_stories", "priorities"]
            }
            AgentRole::Developer | AgentRole::Architect => {
                tailored.insert(
                    "relevant_decisions".into(),
                    json!(mentions(&context.key_decisions, "decision", &["technical", "architecture", "code"])),
                );
                &["tech_stack", "architecture", "code_patterns"]
            }
            AgentRole::Qa | AgentRole::Reviewer => {
                tailored.insert(
                    "relevant_blockers".into(),
                    json!(mentions(&context.active_blockers, "description", &["test"])),
                );
                &["quality_standards", "test_cases", "bugs"]
            }
            AgentRole::Ui => &["user_experience", "design_system", "mockups"],
            AgentRole::Manager | AgentRole::Scrum => &["progress", "blockers", "team_health"],
        };
        tailored.insert("focus_areas".into(), json!(focus));

        let working = self
            .working
            .get(&(agent_id.to_string(), context.project_id.clone()))
            .cloned()
            .unwrap_or_else(|| json!({}));
        tailored.insert(
            "agent_context".into(),
            json!({
                "agent_id": agent_id,
                "role": role.as_str(),
                "last_switched": Utc::now().to_rfc3339(),
                "working_memory": working,
            }),
        );
        tailored
    }
}

/// Project context lifecycle on top of sprint memory
#[derive(Debug, Default)]
pub struct ProjectContextManager {
    switcher: ProjectSwitcher,
}

impl ProjectContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn switcher(&self) -> &ProjectSwitcher {
        &self.switcher
    }

    pub fn switcher_mut(&mut self) -> &mut ProjectSwitcher {
        &mut self.switcher
    }

    /// Opens the project's init sprint memory and registers its profile
    ///
    /// `config` may carry `name`, `type`, `tech_stack`, `team_members`,
    /// `key_decisions` and `knowledge_base`; cloned decisions are replayed
    /// into the new core memory.
    pub fn initialize(&mut self, memory: &mut SprintMemoryManager, project_id: &str, config: &Value) {
        let name = config.get("name").and_then(Value::as_str).unwrap_or("project");
        memory.initialize_sprint(project_id, INIT_SPRINT, &format!("Initialize {name}"), json!([]));

        for decision in config
            .get("key_decisions")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            if let Err(e) = memory.add_decision(project_id, INIT_SPRINT, decision.clone()) {
                error!(project_id, error = %e, "Failed to replay decision");
            }
        }

        let profile = ProjectProfile {
            name: name.to_string(),
            project_type: config
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            tech_stack: config.get("tech_stack").cloned().unwrap_or_else(|| json!({})),
            team_members: config
                .get("team_members")
                .and_then(Value::as_array)
                .map(|members| members.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            current_sprint_id: None,
            knowledge_base: config.get("knowledge_base").cloned().unwrap_or_else(|| json!({})),
        };
        self.switcher.register(project_id, profile);
        info!(project_id, "Initialized project context");
    }

    /// Drops the project's memory and context; returns the released agents
    pub fn archive(&mut self, memory: &mut SprintMemoryManager, project_id: &str) -> Vec<String> {
        let sprints = memory.forget_project(project_id);
        let released = self.switcher.forget_project(project_id);
        info!(project_id, sprints, agents = released.len(), "Archived project context");
        released
    }

    /// Seeds `target` with the chosen elements of `source`
    ///
    /// Elements outside [`CLONEABLE`] are ignored.
    pub fn clone_context(
        &mut self,
        memory: &mut SprintMemoryManager,
        source: &str,
        target: &str,
        elements: &[&str],
    ) -> Result<(), ContextError> {
        let context = self.switcher.load(memory, source, false)?;

        let mut config = json!({
            "name": target,
            "type": context.project_type,
        });
        for element in elements.iter().filter(|e| CLONEABLE.contains(*e)) {
            config[*element] = match *element {
                "tech_stack" => context.tech_stack.clone(),
                "key_decisions" => json!(context.key_decisions),
                _ => context.knowledge_base.clone(),
            };
        }
        self.initialize(memory, target, &config);
        info!(source, target, "Cloned project context");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::compressor::COMPRESSION_INFO_KEY;

    fn storefront() -> Value {
        json!({
            "name": "Storefront",
            "type": "web_app",
            "tech_stack": {"backend": "Rust", "frontend": "React"},
            "team_members": ["pm-001", "dev-001", "qa-001"],
        })
    }

    fn setup() -> (SprintMemoryManager, ProjectContextManager) {
        let mut memory = SprintMemoryManager::new();
        let mut manager = ProjectContextManager::new();
        manager.initialize(&mut memory, "p-1", &storefront());
        memory
            .add_decision("p-1", INIT_SPRINT, json!({"decision": "Adopt a layered architecture"}))
            .unwrap();
        memory
            .add_decision("p-1", INIT_SPRINT, json!({"decision": "Requirement: guest checkout"}))
            .unwrap();
        memory
            .add_blocker("p-1", INIT_SPRINT, json!({"description": "Test database unavailable"}))
            .unwrap();
        (memory, manager)
    }

    #[test]
    fn initialize_opens_init_sprint_memory() {
        let (memory, mut manager) = setup();

        let core = memory.core("p-1", INIT_SPRINT).unwrap();
        assert_eq!(core["sprint_goal"], "Initialize Storefront");

        let summary = manager.switcher_mut().summary(&memory, "p-1").unwrap();
        assert_eq!(summary["team_size"], 3);
        assert_eq!(summary["decisions_count"], 2);
        assert_eq!(summary["blockers_count"], 1);
        assert_eq!(summary["is_stale"], false);
    }

    #[test]
    fn switch_tailors_context_to_the_role() {
        let (memory, mut manager) = setup();
        let switcher = manager.switcher_mut();

        let dev = switcher.switch_agent(&memory, "dev-001", "p-1", AgentRole::Developer, true).unwrap();
        let qa = switcher.switch_agent(&memory, "qa-001", "p-1", AgentRole::Qa, true).unwrap();
        let pm = switcher.switch_agent(&memory, "pm-001", "p-1", AgentRole::Pm, true).unwrap();

        assert_eq!(dev["focus_areas"][0], "tech_stack");
        assert_eq!(dev["relevant_decisions"].as_array().map(Vec::len), Some(1));
        assert_eq!(qa["relevant_blockers"][0]["description"], "Test database unavailable");
        assert_eq!(pm["relevant_decisions"][0]["decision"], "Requirement: guest checkout");
        assert_eq!(pm["agent_context"]["role"], "pm");
        assert!(!dev.contains_key(COMPRESSION_INFO_KEY));
        assert_eq!(switcher.current_project("dev-001"), Some("p-1"));

        let stats = switcher.stats();
        assert_eq!(stats.successful_switches, 3);
        assert_eq!(stats.active_agent_contexts, 3);
        assert_eq!(stats.success_rate, 1.0);
    }

    #[test]
    fn switching_to_an_unknown_project_fails_and_is_counted() {
        let (memory, mut manager) = setup();
        let switcher = manager.switcher_mut();

        let result = switcher.switch_agent(&memory, "dev-001", "nowhere", AgentRole::Developer, true);

        assert_eq!(result, Err(ContextError::UnknownProject("nowhere".to_string())));
        assert_eq!(switcher.stats().failed_switches, 1);
        assert_eq!(switcher.current_project("dev-001"), None);
        assert_eq!(
            switcher.agent_context(&memory, "dev-001", AgentRole::Developer, None),
            Err(ContextError::NoCurrentProject("dev-001".to_string()))
        );
    }

    #[test]
    fn working_memory_survives_only_when_preserved() {
        let (mut memory, mut manager) = setup();
        manager.initialize(&mut memory, "p-2", &json!({"name": "Billing"}));
        let switcher = manager.switcher_mut();
        switcher.switch_agent(&memory, "dev-001", "p-1", AgentRole::Developer, true).unwrap();
        switcher.save_working_memory("dev-001", "p-1", json!({"open_file": "cart.rs"}));

        switcher.switch_agent(&memory, "dev-001", "p-2", AgentRole::Developer, true).unwrap();
        let back = switcher.switch_agent(&memory, "dev-001", "p-1", AgentRole::Developer, true).unwrap();
        assert_eq!(back["agent_context"]["working_memory"]["open_file"], "cart.rs");

        switcher.switch_agent(&memory, "dev-001", "p-2", AgentRole::Developer, false).unwrap();
        let again = switcher.switch_agent(&memory, "dev-001", "p-1", AgentRole::Developer, true).unwrap();
        assert_eq!(again["agent_context"]["working_memory"], json!({}));
    }

    #[test]
    fn large_contexts_are_compressed_on_switch() {
        let (mut memory, mut manager) = setup();
        for n in 0..200 {
            memory
                .add_decision("p-1", INIT_SPRINT, json!({"decision": format!("Decision {n}: {}", "detail ".repeat(20))}))
                .unwrap();
        }
        let switcher = manager.switcher_mut();
        switcher.refresh(&memory, "p-1");

        let context = switcher.switch_agent(&memory, "arch-001", "p-1", AgentRole::Architect, true).unwrap();

        let info = &context[COMPRESSION_INFO_KEY];
        assert!(info["compressed_tokens"].as_u64() < info["original_tokens"].as_u64());
        assert_eq!(info["strategy"], "hierarchical");
    }

    #[test]
    fn stale_contexts_are_cleaned_up() {
        let (memory, mut manager) = setup();
        let switcher = manager.switcher_mut();
        switcher.summary(&memory, "p-1");

        assert_eq!(switcher.cleanup_stale(Utc::now(), STALE_AFTER_HOURS), 0);
        assert_eq!(switcher.cleanup_stale(Utc::now() + Duration::hours(25), STALE_AFTER_HOURS), 1);
        assert_eq!(switcher.stats().cached_contexts, 0);
    }

    #[test]
    fn archive_releases_agents_and_memory() {
        let (mut memory, mut manager) = setup();
        manager
            .switcher_mut()
            .switch_agent(&memory, "dev-001", "p-1", AgentRole::Developer, true)
            .unwrap();

        let released = manager.archive(&mut memory, "p-1");

        assert_eq!(released, vec!["dev-001".to_string()]);
        assert!(!memory.is_initialized("p-1", INIT_SPRINT));
        assert!(manager.switcher_mut().summary(&memory, "p-1").is_none());
    }

    #[test]
    fn clone_copies_selected_elements() {
        let (mut memory, mut manager) = setup();

        manager
            .clone_context(&mut memory, "p-1", "p-3", &["tech_stack", "key_decisions", "budget"])
            .unwrap();

        let summary = manager.switcher_mut().summary(&memory, "p-3").unwrap();
        assert_eq!(summary["decisions_count"], 2);
        assert_eq!(summary["team_size"], 0);
        let context = manager
            .switcher_mut()
            .switch_agent(&memory, "dev-001", "p-3", AgentRole::Developer, true)
            .unwrap();
        assert_eq!(context["tech_stack"]["backend"], "Rust");
        assert_eq!(
            manager.clone_context(&mut memory, "missing", "p-4", &["tech_stack"]),
            Err(ContextError::UnknownProject("missing".to_string()))
        );
    }
}
