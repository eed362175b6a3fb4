use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::agent::{AgentRole, AgentStatus};

/// Errors that can occur in the agent system
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("{role} agent does not handle task type '{task_type}'")]
    UnsupportedTask { role: AgentRole, task_type: String },

    #[error("Invalid task input: {0}")]
    InvalidInput(String),

    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent {agent_id} is {status} and cannot take work")]
    Unavailable { agent_id: String, status: AgentStatus },

    #[error("Launch phase '{phase}' failed: {reason}")]
    PhaseFailed { phase: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type AgentResult<T> = Result<T, AgentError>;
