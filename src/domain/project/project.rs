use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use uuid::Uuid;

use super::events::ProjectEvent;
use super::value_objects::ProjectStatus;

/// Budgets are stored as NUMERIC(14,2), so whole units stop short of 10^12
pub const MAX_BUDGET: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Project aggregate root
///
/// A software project the agent team plans and builds. Sprints and tasks
/// hang off a project and are removed with it.
///
/// # Invariants
/// - Name cannot be empty
/// - Budget must be positive and below [`MAX_BUDGET`] (if specified)
/// - Status transitions follow [`ProjectStatus::can_transition_to`]
/// - `completed_at` is set exactly when the project reaches Completed
///
/// # Example
/// ```
/// use agentteam_api::domain::project::Project;
/// use serde_json::json;
///
/// let (project, events) = Project::new(
///     "Storefront".to_string(),
///     "Online shop".to_string(),
///     "web".to_string(),
///     json!({"backend": "Rust"}),
///     json!({}),
///     None,
/// ).expect("valid project");
///
/// assert_eq!(project.name(), "Storefront");
/// assert_eq!(events.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct Project {
    id: Uuid,
    name: String,
    description: String,
    project_type: String,
    status: ProjectStatus,
    tech_stack: Value,
    team_config: Value,
    repository_url: Option<String>,
    documentation_url: Option<String>,
    budget: Option<Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Creates a new project in Planning status
    ///
    /// # Returns
    /// * `Ok((Project, Vec<ProjectEvent>))` - New project and its Created event
    /// * `Err(String)` - If the name is blank or the budget is out of range
    pub fn new(
        name: String,
        description: String,
        project_type: String,
        tech_stack: Value,
        team_config: Value,
        budget: Option<Decimal>,
    ) -> Result<(Self, Vec<ProjectEvent>), String> {
        if name.trim().is_empty() {
            return Err("Project name cannot be empty".to_string());
        }

        if let Some(budget) = budget {
            if budget <= Decimal::ZERO {
                return Err("Budget must be positive".to_string());
            }
            if budget >= MAX_BUDGET {
                return Err(format!("Budget must be below {}", MAX_BUDGET));
            }
        }

        let project_type = if project_type.trim().is_empty() {
            "web".to_string()
        } else {
            project_type
        };

        let now = Utc::now();
        let project = Self {
            id: Uuid::new_v4(),
            name,
            description,
            project_type,
            status: ProjectStatus::Planning,
            tech_stack,
            team_config,
            repository_url: None,
            documentation_url: None,
            budget,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let events = vec![ProjectEvent::Created {
            project_id: project.id,
            name: project.name.clone(),
            project_type: project.project_type.clone(),
        }];

        Ok((project, events))
    }

    /// Moves the project to `next`, enforcing the lifecycle rules
    pub fn transition_to(&mut self, next: ProjectStatus) -> Result<ProjectEvent, String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "Cannot move project from {} to {}",
                self.status, next
            ));
        }

        let from = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        if next == ProjectStatus::Completed {
            self.completed_at = Some(self.updated_at);
        }

        Ok(ProjectEvent::StatusChanged {
            project_id: self.id,
            from,
            to: next,
        })
    }

    pub fn activate(&mut self) -> Result<ProjectEvent, String> {
        self.transition_to(ProjectStatus::Active)
    }

    pub fn pause(&mut self) -> Result<ProjectEvent, String> {
        self.transition_to(ProjectStatus::Paused)
    }

    pub fn complete(&mut self) -> Result<ProjectEvent, String> {
        self.transition_to(ProjectStatus::Completed)
    }

    pub fn archive(&mut self) -> Result<ProjectEvent, String> {
        self.transition_to(ProjectStatus::Archived)
    }

    pub fn set_repository_url(&mut self, url: Option<String>) {
        self.repository_url = url;
        self.updated_at = Utc::now();
    }

    pub fn set_documentation_url(&mut self, url: Option<String>) {
        self.documentation_url = url;
        self.updated_at = Utc::now();
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn project_type(&self) -> &str {
        &self.project_type
    }

    pub fn status(&self) -> ProjectStatus {
        self.status
    }

    pub fn tech_stack(&self) -> &Value {
        &self.tech_stack
    }

    pub fn team_config(&self) -> &Value {
        &self.team_config
    }

    pub fn repository_url(&self) -> Option<&str> {
        self.repository_url.as_deref()
    }

    pub fn documentation_url(&self) -> Option<&str> {
        self.documentation_url.as_deref()
    }

    pub fn budget(&self) -> Option<Decimal> {
        self.budget
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Reconstructs a Project from stored data without re-validating
    ///
    /// # Note
    /// Only to be used by repository implementations.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        name: String,
        description: String,
        project_type: String,
        status: ProjectStatus,
        tech_stack: Value,
        team_config: Value,
        repository_url: Option<String>,
        documentation_url: Option<String>,
        budget: Option<Decimal>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            name,
            description,
            project_type,
            status,
            tech_stack,
            team_config,
            repository_url,
            documentation_url,
            budget,
            created_at,
            updated_at,
            completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn new_project() -> Project {
        Project::new(
            "Storefront".to_string(),
            "Online shop".to_string(),
            "web".to_string(),
            json!({"frontend": "React"}),
            json!({}),
            None,
        )
        .unwrap()
        .0
    }

    #[test]
    fn create_project_starts_in_planning() {
        let project = new_project();

        assert_eq!(project.status(), ProjectStatus::Planning);
        assert_eq!(project.project_type(), "web");
        assert!(project.completed_at().is_none());
    }

    #[test]
    fn blank_name_is_rejected() {
        let result = Project::new(
            "   ".to_string(),
            String::new(),
            "web".to_string(),
            json!({}),
            json!({}),
            None,
        );

        assert!(result.unwrap_err().contains("name cannot be empty"));
    }

    #[test]
    fn non_positive_budget_is_rejected() {
        let result = Project::new(
            "Shop".to_string(),
            String::new(),
            "web".to_string(),
            json!({}),
            json!({}),
            Some(Decimal::ZERO),
        );

        assert!(result.unwrap_err().contains("Budget must be positive"));
    }

    #[test]
    fn budget_beyond_storage_precision_is_rejected() {
        let new_with = |budget: Decimal| {
            Project::new(
                "Shop".to_string(),
                String::new(),
                "web".to_string(),
                json!({}),
                json!({}),
                Some(budget),
            )
        };

        assert_eq!(MAX_BUDGET, Decimal::from(1_000_000_000_000_i64));
        assert!(new_with(MAX_BUDGET).unwrap_err().contains("Budget must be below"));
        assert!(new_with(MAX_BUDGET - Decimal::new(1, 2)).is_ok());
    }

    #[test]
    fn empty_type_defaults_to_web() {
        let (project, _) = Project::new(
            "Shop".to_string(),
            String::new(),
            String::new(),
            json!({}),
            json!({}),
            Some(Decimal::from(50_000)),
        )
        .unwrap();

        assert_eq!(project.project_type(), "web");
        assert_eq!(project.budget(), Some(Decimal::from(50_000)));
    }

    #[test]
    fn completion_stamps_completed_at() {
        let mut project = new_project();
        project.activate().unwrap();
        let event = project.complete().unwrap();

        assert_eq!(project.status(), ProjectStatus::Completed);
        assert!(project.completed_at().is_some());
        assert_eq!(
            event,
            ProjectEvent::StatusChanged {
                project_id: project.id(),
                from: ProjectStatus::Active,
                to: ProjectStatus::Completed,
            }
        );
    }

    #[test]
    fn invalid_transition_leaves_status_untouched() {
        let mut project = new_project();
        let result = project.complete();

        assert!(result.is_err());
        assert_eq!(project.status(), ProjectStatus::Planning);
    }

    #[test]
    fn pause_and_resume() {
        let mut project = new_project();
        project.activate().unwrap();
        project.pause().unwrap();
        assert_eq!(project.status(), ProjectStatus::Paused);

        project.activate().unwrap();
        assert_eq!(project.status(), ProjectStatus::Active);
    }
}
