use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::value_objects::{AgentRole, AgentStatus};

/// Persistent record of a registered agent
///
/// Holds the agent's role, provider and running performance figures. The
/// behaviour lives in `crate::agents`; this is what gets stored.
///
/// # Invariants
/// - Id cannot be empty
/// - `quality_score` stays within 0..=1
#[derive(Debug, Clone)]
pub struct AgentProfile {
    id: String,
    role: AgentRole,
    llm_provider: String,
    mcp_config: Value,
    current_status: AgentStatus,
    current_project_id: Option<Uuid>,
    current_task_id: Option<Uuid>,
    tasks_completed: i32,
    average_task_time: f64,
    quality_score: f64,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl AgentProfile {
    pub fn new(id: String, role: AgentRole, llm_provider: String) -> Result<Self, String> {
        if id.trim().is_empty() {
            return Err("Agent id cannot be empty".to_string());
        }

        let now = Utc::now();
        Ok(Self {
            id,
            role,
            llm_provider,
            mcp_config: json!({}),
            current_status: AgentStatus::Idle,
            current_project_id: None,
            current_task_id: None,
            tasks_completed: 0,
            average_task_time: 0.0,
            quality_score: 0.0,
            created_at: now,
            last_active_at: now,
        })
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.current_status = status;
        self.last_active_at = Utc::now();
    }

    /// Points the agent at a project/task and marks it working
    pub fn assign(&mut self, project_id: Uuid, task_id: Option<Uuid>) {
        self.current_project_id = Some(project_id);
        self.current_task_id = task_id;
        self.set_status(AgentStatus::Working);
    }

    /// Folds a finished task into the running averages
    ///
    /// `quality` is clamped to 0..=1 before averaging.
    pub fn record_task_completion(&mut self, duration_secs: f64, quality: f64) {
        let n = f64::from(self.tasks_completed);
        let quality = quality.clamp(0.0, 1.0);

        self.average_task_time = (self.average_task_time * n + duration_secs) / (n + 1.0);
        self.quality_score = (self.quality_score * n + quality) / (n + 1.0);
        self.tasks_completed += 1;
        self.current_task_id = None;
        self.set_status(AgentStatus::Idle);
    }

    // ===== Getters =====

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn llm_provider(&self) -> &str {
        &self.llm_provider
    }

    pub fn mcp_config(&self) -> &Value {
        &self.mcp_config
    }

    pub fn current_status(&self) -> AgentStatus {
        self.current_status
    }

    pub fn current_project_id(&self) -> Option<Uuid> {
        self.current_project_id
    }

    pub fn current_task_id(&self) -> Option<Uuid> {
        self.current_task_id
    }

    pub fn tasks_completed(&self) -> i32 {
        self.tasks_completed
    }

    pub fn average_task_time(&self) -> f64 {
        self.average_task_time
    }

    pub fn quality_score(&self) -> f64 {
        self.quality_score
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: String,
        role: AgentRole,
        llm_provider: String,
        mcp_config: Value,
        current_status: AgentStatus,
        current_project_id: Option<Uuid>,
        current_task_id: Option<Uuid>,
        tasks_completed: i32,
        average_task_time: f64,
        quality_score: f64,
        created_at: DateTime<Utc>,
        last_active_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            role,
            llm_provider,
            mcp_config,
            current_status,
            current_project_id,
            current_task_id,
            tasks_completed,
            average_task_time,
            quality_score,
            created_at,
            last_active_at,
        }
    }
}
