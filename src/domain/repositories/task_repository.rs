use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::task::Task;

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save(&self, task: &Task) -> Result<(), String>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, String>;

    /// Tasks of a sprint, highest priority first
    async fn find_by_sprint(&self, sprint_id: Uuid) -> Result<Vec<Task>, String>;

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Task>, String>;
}
