use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::project::{Project, ProjectStatus};

/// Repository trait for the Project aggregate
///
/// Deleting a project removes its sprints, tasks, outputs and conflicts.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Save a project (insert or update)
    async fn save(&self, project: &Project) -> Result<(), String>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, String>;

    /// All projects, newest first
    async fn find_all(&self) -> Result<Vec<Project>, String>;

    async fn find_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>, String>;

    /// Delete a project and everything that hangs off it
    async fn delete(&self, id: Uuid) -> Result<(), String>;
}
