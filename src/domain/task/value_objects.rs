use serde::{Deserialize, Serialize};

/// Status of a task on the sprint board
///
/// # Status Transitions
/// ```text
/// Todo -> InProgress -> InReview -> Completed
///   |        ^   |          |
///   |        |   v          |
///   +----> Blocked   <------+ (InReview -> InProgress on rework)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    InReview,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Todo, InProgress)
                | (InProgress, InReview)
                | (InReview, Completed)
                | (InReview, InProgress)
                | (Todo, Blocked)
                | (InProgress, Blocked)
                | (Blocked, InProgress)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "todo"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::InReview => write!(f, "in_review"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}
