use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::errors::{AgentError, AgentResult};
use super::prompts::PromptTemplate;
use crate::communication::{BusMessage, MessagePriority, MessageType};
use crate::config::{llm_config, LlmConfig, Settings};
use crate::context::{AdaptiveContextManager, ContextImportance, ContextStats, ContextType, OptimizedContext};
use crate::domain::agent::{AgentRole, AgentStatus};

/// Where a task runs: project, sprint and whatever memory the caller attached
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentContext {
    pub project_id: String,
    pub sprint_id: Option<String>,
    pub task_id: Option<String>,
    #[serde(default)]
    pub memory_context: Map<String, Value>,
    #[serde(default)]
    pub shared_knowledge: Vec<Value>,
}

impl AgentContext {
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            ..Self::default()
        }
    }

    pub fn with_sprint(mut self, sprint_id: impl Into<String>) -> Self {
        self.sprint_id = Some(sprint_id.into());
        self
    }
}

/// A message as seen by the receiving agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub task_id: Option<String>,
    pub message_type: MessageType,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub priority: MessagePriority,
}

impl From<&BusMessage> for AgentMessage {
    fn from(message: &BusMessage) -> Self {
        Self {
            message_id: message.message_id,
            from_agent: message.from_agent.clone(),
            to_agent: message.to_agent.clone(),
            task_id: message.task_id.clone(),
            message_type: message.message_type,
            payload: message.payload.clone(),
            timestamp: message.created_at,
            priority: message.priority,
        }
    }
}

/// State every agent carries regardless of role
#[derive(Debug)]
pub struct AgentCore {
    id: String,
    role: AgentRole,
    status: AgentStatus,
    llm_provider: String,
    context: AdaptiveContextManager,
    current_task_id: Option<String>,
    current_context: Option<AgentContext>,
    inbox: Vec<AgentMessage>,
    tasks_completed: u64,
    tasks_failed: u64,
}

impl AgentCore {
    pub fn new(
        id: impl Into<String>,
        role: AgentRole,
        llm_provider: impl Into<String>,
        context_max_tokens: usize,
    ) -> Self {
        let core = Self {
            id: id.into(),
            role,
            status: AgentStatus::Idle,
            llm_provider: llm_provider.into(),
            context: AdaptiveContextManager::new(context_max_tokens),
            current_task_id: None,
            current_context: None,
            inbox: Vec::new(),
            tasks_completed: 0,
            tasks_failed: 0,
        };
        info!(agent_id = %core.id, role = %role, provider = %core.llm_provider, "Agent initialized");
        core
    }

    /// Uses the role's configured provider and context window
    pub fn from_settings(id: impl Into<String>, role: AgentRole, settings: &Settings) -> Self {
        Self::new(
            id,
            role,
            settings.provider_for(role),
            settings.context_max_tokens,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn llm_provider(&self) -> &str {
        &self.llm_provider
    }

    pub fn llm_config(&self) -> AgentResult<LlmConfig> {
        Ok(llm_config(&self.llm_provider)?)
    }

    pub fn current_task_id(&self) -> Option<&str> {
        self.current_task_id.as_deref()
    }

    pub fn current_context(&self) -> Option<&AgentContext> {
        self.current_context.as_ref()
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed
    }

    pub fn inbox(&self) -> &[AgentMessage] {
        &self.inbox
    }

    pub fn context(&self) -> &AdaptiveContextManager {
        &self.context
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        if self.status != status {
            info!(agent_id = %self.id, from = %self.status, to = %status, "Status changed");
        }
        self.status = status;
    }

    pub fn initialize_for_project(&mut self, project_id: &str, memory_context: Map<String, Value>) {
        self.current_context = Some(AgentContext {
            project_id: project_id.to_string(),
            memory_context,
            ..AgentContext::default()
        });
        info!(agent_id = %self.id, project_id, "Initialized for project");
    }

    pub fn add_context(
        &mut self,
        content: impl Into<String>,
        context_type: ContextType,
        importance: ContextImportance,
    ) -> String {
        self.context.add_context(content, context_type, importance)
    }

    pub fn add_task_context(&mut self, task: &Value) -> String {
        let kind = task.get("type").and_then(Value::as_str).unwrap_or("unknown");
        self.add_context(
            format!("Task: {kind}\nDetails: {task}"),
            ContextType::TaskContext,
            ContextImportance::Critical,
        )
    }

    pub fn add_conversation_context(&mut self, message: &str, from_agent: Option<&str>) -> String {
        let content = match from_agent {
            Some(from) => format!("Message from {from}: {message}"),
            None => format!("Agent {}: {message}", self.id),
        };
        self.add_context(content, ContextType::Conversation, ContextImportance::High)
    }

    pub fn add_decision_context(&mut self, decision: &Value) -> String {
        let field = |key: &str| decision.get(key).and_then(Value::as_str).unwrap_or("").to_string();
        self.add_context(
            format!("Decision: {}\nRationale: {}", field("decision"), field("rationale")),
            ContextType::DecisionHistory,
            ContextImportance::High,
        )
    }

    pub fn optimized_context(&mut self, query: &str) -> OptimizedContext {
        self.context.optimized_context(query, None)
    }

    pub fn context_stats(&self) -> ContextStats {
        self.context.stats()
    }

    /// Builds an outgoing message stamped with the task in progress
    pub fn compose_message(&self, to_agent: &str, message_type: MessageType, payload: Value) -> BusMessage {
        info!(agent_id = %self.id, to_agent, message_type = ?message_type, "Sending message");
        BusMessage::new(self.id.clone(), to_agent, message_type)
            .with_payload(payload)
            .for_task(self.current_task_id.clone())
    }

    pub fn receive_message(&mut self, message: &BusMessage) {
        let received = AgentMessage::from(message);
        info!(
            agent_id = %self.id,
            from_agent = %received.from_agent,
            message_type = ?received.message_type,
            "Received message"
        );
        let summary = if message.subject.is_empty() {
            received.payload.to_string()
        } else {
            message.subject.clone()
        };
        self.add_conversation_context(&summary, Some(&received.from_agent));
        self.inbox.push(received);
    }

    pub(crate) fn begin_task(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<()> {
        if self.status == AgentStatus::Offline {
            warn!(agent_id = %self.id, "Rejected task for offline agent");
            return Err(AgentError::Unavailable {
                agent_id: self.id.clone(),
                status: self.status,
            });
        }
        self.current_task_id = ctx
            .task_id
            .clone()
            .or_else(|| task.get("id").and_then(Value::as_str).map(str::to_string));
        self.current_context = Some(ctx.clone());
        self.add_task_context(task);
        self.set_status(AgentStatus::Working);
        Ok(())
    }

    pub(crate) fn finish_task(&mut self, succeeded: bool) {
        self.current_task_id = None;
        if succeeded {
            self.tasks_completed += 1;
            self.set_status(AgentStatus::Idle);
        } else {
            self.tasks_failed += 1;
            self.set_status(AgentStatus::Error);
        }
    }

    pub fn cleanup(&mut self) {
        self.set_status(AgentStatus::Offline);
        self.current_task_id = None;
        self.current_context = None;
        self.inbox.clear();
        self.context.clear();
        info!(agent_id = %self.id, "Agent cleanup completed");
    }
}

/// The contract every role implements
#[async_trait]
pub trait Agent: Send + Sync {
    fn core(&self) -> &AgentCore;

    fn core_mut(&mut self) -> &mut AgentCore;

    /// Dispatches on the task's `type` field
    async fn process_task(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value>;

    fn validate_output(&self, output: &Value) -> bool;

    fn prompt_template(&self) -> PromptTemplate;

    fn id(&self) -> &str {
        self.core().id()
    }

    fn role(&self) -> AgentRole {
        self.core().role()
    }

    fn status(&self) -> AgentStatus {
        self.core().status()
    }

    /// Runs a task with status bookkeeping: working while it runs, idle after
    /// success, error after failure
    async fn execute(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        self.core_mut().begin_task(task, ctx)?;
        let result = self.process_task(task, ctx).await;
        match &result {
            Ok(_) => self.core_mut().finish_task(true),
            Err(e) => {
                error!(agent_id = %self.core().id(), error = %e, "Task failed");
                self.core_mut().finish_task(false);
            }
        }
        result
    }
}

/// The `type` field of a task, or `default` when absent
pub(crate) fn task_kind<'a>(task: &'a Value, default: &'a str) -> &'a str {
    task.get("type").and_then(Value::as_str).unwrap_or(default)
}

pub(crate) fn str_field<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Whether a JSON value counts as present: not null, false, zero or empty
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

pub(crate) fn has_truthy(value: &Value, key: &str) -> bool {
    value.get(key).map(is_truthy).unwrap_or(false)
}

/// Outputs must report success before any deliverable checks apply
pub(crate) fn is_success(output: &Value) -> bool {
    output.get("status").and_then(Value::as_str) == Some("success")
}
