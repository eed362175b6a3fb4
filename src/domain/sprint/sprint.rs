use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use super::value_objects::SprintStatus;

/// Sprint entity
///
/// A time-boxed iteration inside a project. Sprint numbers start at 1 and
/// are unique per project (enforced by the schema).
#[derive(Debug, Clone)]
pub struct Sprint {
    id: Uuid,
    project_id: Uuid,
    sprint_number: i32,
    name: String,
    goal: String,
    status: SprintStatus,
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    planning_notes: Value,
    review_notes: Value,
    retrospective_notes: Value,
    daily_standups: Value,
    created_at: DateTime<Utc>,
}

impl Sprint {
    /// Creates a sprint in Planning status
    pub fn new(
        project_id: Uuid,
        sprint_number: i32,
        name: String,
        goal: String,
    ) -> Result<Self, String> {
        if sprint_number < 1 {
            return Err("Sprint number must be at least 1".to_string());
        }
        if name.trim().is_empty() {
            return Err("Sprint name cannot be empty".to_string());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            project_id,
            sprint_number,
            name,
            goal,
            status: SprintStatus::Planning,
            start_date: None,
            end_date: None,
            planning_notes: json!({}),
            review_notes: json!({}),
            retrospective_notes: json!({}),
            daily_standups: json!([]),
            created_at: Utc::now(),
        })
    }

    fn transition_to(&mut self, next: SprintStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "Cannot move sprint from {} to {}",
                self.status, next
            ));
        }
        self.status = next;
        Ok(())
    }

    /// Planning -> Active, stamps the start date
    pub fn start(&mut self) -> Result<(), String> {
        self.transition_to(SprintStatus::Active)?;
        self.start_date = Some(Utc::now());
        Ok(())
    }

    pub fn begin_review(&mut self) -> Result<(), String> {
        self.transition_to(SprintStatus::Review)
    }

    /// Review -> Completed, stamps the end date
    pub fn complete(&mut self) -> Result<(), String> {
        self.transition_to(SprintStatus::Completed)?;
        self.end_date = Some(Utc::now());
        Ok(())
    }

    pub fn set_planning_notes(&mut self, notes: Value) {
        self.planning_notes = notes;
    }

    pub fn set_review_notes(&mut self, notes: Value) {
        self.review_notes = notes;
    }

    pub fn set_retrospective_notes(&mut self, notes: Value) {
        self.retrospective_notes = notes;
    }

    /// Appends a daily standup record
    pub fn add_standup(&mut self, standup: Value) {
        match self.daily_standups.as_array_mut() {
            Some(entries) => entries.push(standup),
            None => self.daily_standups = json!([standup]),
        }
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn sprint_number(&self) -> i32 {
        self.sprint_number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn status(&self) -> SprintStatus {
        self.status
    }

    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }

    pub fn planning_notes(&self) -> &Value {
        &self.planning_notes
    }

    pub fn review_notes(&self) -> &Value {
        &self.review_notes
    }

    pub fn retrospective_notes(&self) -> &Value {
        &self.retrospective_notes
    }

    pub fn daily_standups(&self) -> &Value {
        &self.daily_standups
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Rebuilds a sprint from stored data
    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        project_id: Uuid,
        sprint_number: i32,
        name: String,
        goal: String,
        status: SprintStatus,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
        planning_notes: Value,
        review_notes: Value,
        retrospective_notes: Value,
        daily_standups: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            project_id,
            sprint_number,
            name,
            goal,
            status,
            start_date,
            end_date,
            planning_notes,
            review_notes,
            retrospective_notes,
            daily_standups,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprint_number_must_be_positive() {
        let result = Sprint::new(Uuid::new_v4(), 0, "Sprint 0".to_string(), String::new());
        assert!(result.is_err());
    }

    #[test]
    fn blank_name_rejected() {
        let result = Sprint::new(Uuid::new_v4(), 1, " ".to_string(), String::new());
        assert!(result.unwrap_err().contains("name cannot be empty"));
    }

    #[test]
    fn full_lifecycle_stamps_dates() {
        let mut sprint =
            Sprint::new(Uuid::new_v4(), 1, "Sprint 1".to_string(), "MVP".to_string()).unwrap();

        sprint.start().unwrap();
        assert!(sprint.start_date().is_some());
        sprint.begin_review().unwrap();
        sprint.complete().unwrap();

        assert_eq!(sprint.status(), SprintStatus::Completed);
        assert!(sprint.end_date().is_some());
    }

    #[test]
    fn cannot_complete_from_planning() {
        let mut sprint =
            Sprint::new(Uuid::new_v4(), 1, "Sprint 1".to_string(), "MVP".to_string()).unwrap();

        assert!(sprint.complete().is_err());
        assert!(sprint.end_date().is_none());
    }

    #[test]
    fn standups_accumulate() {
        let mut sprint =
            Sprint::new(Uuid::new_v4(), 2, "Sprint 2".to_string(), "Polish".to_string()).unwrap();

        sprint.add_standup(json!({"day": 1}));
        sprint.add_standup(json!({"day": 2}));

        assert_eq!(sprint.daily_standups().as_array().map(Vec::len), Some(2));
    }
}
