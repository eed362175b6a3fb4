use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::sprint::Sprint;

#[async_trait]
pub trait SprintRepository: Send + Sync {
    /// Save a sprint; a second sprint with the same number in a project is rejected
    async fn save(&self, sprint: &Sprint) -> Result<(), String>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Sprint>, String>;

    /// Sprints of a project ordered by sprint number
    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Sprint>, String>;
}
