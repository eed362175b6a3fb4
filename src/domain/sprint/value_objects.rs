use serde::{Deserialize, Serialize};

/// Sprint lifecycle: Planning -> Active -> Review -> Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "sprint_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SprintStatus {
    Planning,
    Active,
    Review,
    Completed,
}

impl SprintStatus {
    pub fn can_transition_to(&self, next: SprintStatus) -> bool {
        use SprintStatus::*;
        matches!(
            (self, next),
            (Planning, Active) | (Active, Review) | (Review, Completed)
        )
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SprintStatus::Planning => write!(f, "planning"),
            SprintStatus::Active => write!(f, "active"),
            SprintStatus::Review => write!(f, "review"),
            SprintStatus::Completed => write!(f, "completed"),
        }
    }
}
