use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::knowledge::{ConflictResolution, SharedKnowledge};

/// Storage for conflict records and cross-project knowledge
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    async fn save_conflict(&self, conflict: &ConflictResolution) -> Result<(), String>;

    async fn find_conflicts_by_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ConflictResolution>, String>;

    async fn save_knowledge(&self, knowledge: &SharedKnowledge) -> Result<(), String>;

    async fn find_knowledge_by_id(&self, id: Uuid) -> Result<Option<SharedKnowledge>, String>;

    /// Entries of one knowledge type, most effective first
    async fn find_knowledge_by_type(
        &self,
        knowledge_type: &str,
    ) -> Result<Vec<SharedKnowledge>, String>;
}
