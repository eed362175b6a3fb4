use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::agent::{AgentOutput, AgentProfile, AgentRole};

/// Repository trait for registered agent profiles
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Save an agent profile (insert or update)
    async fn save(&self, agent: &AgentProfile) -> Result<(), String>;

    async fn find_by_id(&self, id: &str) -> Result<Option<AgentProfile>, String>;

    /// All agents ordered by id
    async fn find_all(&self) -> Result<Vec<AgentProfile>, String>;

    async fn find_by_role(&self, role: AgentRole) -> Result<Vec<AgentProfile>, String>;
}

/// Repository trait for documents produced by agents
#[async_trait]
pub trait AgentOutputRepository: Send + Sync {
    async fn save(&self, output: &AgentOutput) -> Result<(), String>;

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<AgentOutput>, String>;

    async fn find_by_agent(&self, agent_id: &str) -> Result<Vec<AgentOutput>, String>;
}
