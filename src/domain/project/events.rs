use uuid::Uuid;

use super::value_objects::ProjectStatus;

/// Domain events raised by the Project aggregate
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectEvent {
    /// Fired when a project is created
    Created {
        project_id: Uuid,
        name: String,
        project_type: String,
    },
    /// Fired on every lifecycle transition
    StatusChanged {
        project_id: Uuid,
        from: ProjectStatus,
        to: ProjectStatus,
    },
}

impl ProjectEvent {
    pub fn project_id(&self) -> Uuid {
        match self {
            ProjectEvent::Created { project_id, .. } => *project_id,
            ProjectEvent::StatusChanged { project_id, .. } => *project_id,
        }
    }
}
