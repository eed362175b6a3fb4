use serde::{Deserialize, Serialize};

/// Lifecycle status of a project
///
/// # Status Transitions
/// ```text
/// Planning -> Active <-> Paused
///    |          |
///    |          +-> Completed -> Archived
///    +-> Archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Created but not yet launched
    Planning,
    /// Agents are working on it
    Active,
    /// Temporarily halted
    Paused,
    /// Delivered
    Completed,
    /// Read-only
    Archived,
}

impl ProjectStatus {
    /// Checks if a transition from current status to next status is valid
    ///
    /// # Example
    /// ```
    /// use agentteam_api::domain::project::value_objects::ProjectStatus;
    ///
    /// assert!(ProjectStatus::Planning.can_transition_to(ProjectStatus::Active));
    /// assert!(!ProjectStatus::Planning.can_transition_to(ProjectStatus::Completed));
    /// ```
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Planning, Active)
                | (Planning, Archived)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Completed)
                | (Completed, Archived)
        )
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Planning => write!(f, "planning"),
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Paused => write!(f, "paused"),
            ProjectStatus::Completed => write!(f, "completed"),
            ProjectStatus::Archived => write!(f, "archived"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planning_can_activate_or_archive() {
        assert!(ProjectStatus::Planning.can_transition_to(ProjectStatus::Active));
        assert!(ProjectStatus::Planning.can_transition_to(ProjectStatus::Archived));
    }

    #[test]
    fn active_and_paused_toggle() {
        assert!(ProjectStatus::Active.can_transition_to(ProjectStatus::Paused));
        assert!(ProjectStatus::Paused.can_transition_to(ProjectStatus::Active));
    }

    #[test]
    fn paused_cannot_complete_directly() {
        assert!(!ProjectStatus::Paused.can_transition_to(ProjectStatus::Completed));
    }

    #[test]
    fn archived_is_terminal() {
        for next in [
            ProjectStatus::Planning,
            ProjectStatus::Active,
            ProjectStatus::Paused,
            ProjectStatus::Completed,
        ] {
            assert!(!ProjectStatus::Archived.can_transition_to(next));
        }
    }

    #[test]
    fn display_and_parse_agree() {
        for status in [
            ProjectStatus::Planning,
            ProjectStatus::Active,
            ProjectStatus::Paused,
            ProjectStatus::Completed,
            ProjectStatus::Archived,
        ] {
            assert_eq!(ProjectStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(ProjectStatus::parse("running"), None);
    }
}
