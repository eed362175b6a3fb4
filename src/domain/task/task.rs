use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::value_objects::TaskStatus;
use crate::domain::agent::value_objects::AgentRole;

pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 5;
pub const DEFAULT_PRIORITY: i32 = 3;

/// A unit of work on the sprint board
///
/// # Invariants
/// - Title cannot be empty
/// - Priority within 1..=5
/// - Story points, when given, are positive
/// - `started_at` is set on the first move to InProgress, `completed_at` on completion
#[derive(Debug, Clone)]
pub struct Task {
    id: Uuid,
    project_id: Uuid,
    sprint_id: Option<Uuid>,
    title: String,
    description: String,
    task_type: String,
    status: TaskStatus,
    priority: i32,
    story_points: Option<i32>,
    assigned_agent_id: Option<String>,
    assigned_role: Option<AgentRole>,
    acceptance_criteria: Value,
    dependencies: Value,
    blockers: Value,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        project_id: Uuid,
        sprint_id: Option<Uuid>,
        title: String,
        description: String,
        task_type: String,
        priority: Option<i32>,
        story_points: Option<i32>,
    ) -> Result<Self, String> {
        if title.trim().is_empty() {
            return Err("Task title cannot be empty".to_string());
        }

        let priority = priority.unwrap_or(DEFAULT_PRIORITY);
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(format!(
                "Priority must be between {} and {}",
                MIN_PRIORITY, MAX_PRIORITY
            ));
        }

        if matches!(story_points, Some(points) if points <= 0) {
            return Err("Story points must be positive".to_string());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            project_id,
            sprint_id,
            title,
            description,
            task_type,
            status: TaskStatus::Todo,
            priority,
            story_points,
            assigned_agent_id: None,
            assigned_role: None,
            acceptance_criteria: json!([]),
            dependencies: json!([]),
            blockers: json!([]),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        })
    }

    fn transition_to(&mut self, next: TaskStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!("Cannot move task from {} to {}", self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn assign(&mut self, agent_id: String, role: AgentRole) {
        self.assigned_agent_id = Some(agent_id);
        self.assigned_role = Some(role);
    }

    pub fn start(&mut self) -> Result<(), String> {
        self.transition_to(TaskStatus::InProgress)?;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn submit_for_review(&mut self) -> Result<(), String> {
        self.transition_to(TaskStatus::InReview)
    }

    pub fn complete(&mut self) -> Result<(), String> {
        self.transition_to(TaskStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Blocks the task and records why
    pub fn block(&mut self, reason: &str) -> Result<(), String> {
        self.transition_to(TaskStatus::Blocked)?;
        let entry = json!({"reason": reason, "added_at": Utc::now().to_rfc3339()});
        match self.blockers.as_array_mut() {
            Some(blockers) => blockers.push(entry),
            None => self.blockers = json!([entry]),
        }
        Ok(())
    }

    pub fn unblock(&mut self) -> Result<(), String> {
        self.transition_to(TaskStatus::InProgress)
    }

    pub fn set_acceptance_criteria(&mut self, criteria: Vec<String>) {
        self.acceptance_criteria = json!(criteria);
    }

    pub fn set_dependencies(&mut self, dependencies: Vec<Uuid>) {
        self.dependencies = json!(dependencies);
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn sprint_id(&self) -> Option<Uuid> {
        self.sprint_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn story_points(&self) -> Option<i32> {
        self.story_points
    }

    pub fn assigned_agent_id(&self) -> Option<&str> {
        self.assigned_agent_id.as_deref()
    }

    pub fn assigned_role(&self) -> Option<AgentRole> {
        self.assigned_role
    }

    pub fn acceptance_criteria(&self) -> &Value {
        &self.acceptance_criteria
    }

    pub fn dependencies(&self) -> &Value {
        &self.dependencies
    }

    pub fn blockers(&self) -> &Value {
        &self.blockers
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        project_id: Uuid,
        sprint_id: Option<Uuid>,
        title: String,
        description: String,
        task_type: String,
        status: TaskStatus,
        priority: i32,
        story_points: Option<i32>,
        assigned_agent_id: Option<String>,
        assigned_role: Option<AgentRole>,
        acceptance_criteria: Value,
        dependencies: Value,
        blockers: Value,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            project_id,
            sprint_id,
            title,
            description,
            task_type,
            status,
            priority,
            story_points,
            assigned_agent_id,
            assigned_role,
            acceptance_criteria,
            dependencies,
            blockers,
            created_at,
            started_at,
            completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task() -> Task {
        Task::new(
            Uuid::new_v4(),
            None,
            "Login form".to_string(),
            "Build the login form".to_string(),
            "development".to_string(),
            None,
            Some(3),
        )
        .unwrap()
    }

    #[test]
    fn defaults_to_todo_with_medium_priority() {
        let task = new_task();
        assert_eq!(task.status(), TaskStatus::Todo);
        assert_eq!(task.priority(), DEFAULT_PRIORITY);
    }

    #[test]
    fn rejects_out_of_range_priority() {
        let result = Task::new(
            Uuid::new_v4(),
            None,
            "x".to_string(),
            String::new(),
            "development".to_string(),
            Some(9),
            None,
        );
        assert!(result.unwrap_err().contains("Priority"));
    }

    #[test]
    fn rejects_zero_story_points() {
        let result = Task::new(
            Uuid::new_v4(),
            None,
            "x".to_string(),
            String::new(),
            "development".to_string(),
            None,
            Some(0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn lifecycle_sets_timestamps() {
        let mut task = new_task();
        task.start().unwrap();
        let started = task.started_at();
        task.submit_for_review().unwrap();
        task.start().unwrap();
        assert_eq!(task.started_at(), started);

        task.submit_for_review().unwrap();
        task.complete().unwrap();
        assert!(task.completed_at().is_some());
    }

    #[test]
    fn blocking_records_reason() {
        let mut task = new_task();
        task.start().unwrap();
        task.block("waiting for API keys").unwrap();

        assert_eq!(task.status(), TaskStatus::Blocked);
        assert_eq!(task.blockers()[0]["reason"], "waiting for API keys");

        task.unblock().unwrap();
        assert_eq!(task.status(), TaskStatus::InProgress);
    }

    #[test]
    fn assignment_records_agent_and_role() {
        let mut task = new_task();
        task.assign("dev-001".to_string(), AgentRole::Developer);

        assert_eq!(task.assigned_agent_id(), Some("dev-001"));
        assert_eq!(task.assigned_role(), Some(AgentRole::Developer));
    }
}
