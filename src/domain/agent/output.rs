use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Score at or above which an output counts as validated
pub const VALIDATION_PASS_SCORE: f64 = 0.8;

/// A result document produced by an agent for a project
#[derive(Debug, Clone)]
pub struct AgentOutput {
    id: Uuid,
    agent_id: String,
    project_id: Uuid,
    task_id: Option<Uuid>,
    output_type: String,
    content: Value,
    confidence_score: f64,
    validated: bool,
    validation_score: Option<f64>,
    validation_feedback: Option<String>,
    processing_time: f64,
    tokens_used: i32,
    created_at: DateTime<Utc>,
}

impl AgentOutput {
    pub fn new(
        agent_id: String,
        project_id: Uuid,
        task_id: Option<Uuid>,
        output_type: String,
        content: Value,
        confidence_score: f64,
    ) -> Result<Self, String> {
        if agent_id.trim().is_empty() {
            return Err("Agent id cannot be empty".to_string());
        }
        if output_type.trim().is_empty() {
            return Err("Output type cannot be empty".to_string());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            agent_id,
            project_id,
            task_id,
            output_type,
            content,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            validated: false,
            validation_score: None,
            validation_feedback: None,
            processing_time: 0.0,
            tokens_used: 0,
            created_at: Utc::now(),
        })
    }

    pub fn with_usage(mut self, processing_time: f64, tokens_used: i32) -> Self {
        self.processing_time = processing_time.max(0.0);
        self.tokens_used = tokens_used.max(0);
        self
    }

    /// Stores the manager's verdict on this output
    pub fn record_validation(&mut self, score: f64, feedback: Option<String>) {
        let score = score.clamp(0.0, 1.0);
        self.validation_score = Some(score);
        self.validated = score >= VALIDATION_PASS_SCORE;
        self.validation_feedback = feedback;
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn task_id(&self) -> Option<Uuid> {
        self.task_id
    }

    pub fn output_type(&self) -> &str {
        &self.output_type
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn validated(&self) -> bool {
        self.validated
    }

    pub fn validation_score(&self) -> Option<f64> {
        self.validation_score
    }

    pub fn validation_feedback(&self) -> Option<&str> {
        self.validation_feedback.as_deref()
    }

    pub fn processing_time(&self) -> f64 {
        self.processing_time
    }

    pub fn tokens_used(&self) -> i32 {
        self.tokens_used
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        agent_id: String,
        project_id: Uuid,
        task_id: Option<Uuid>,
        output_type: String,
        content: Value,
        confidence_score: f64,
        validated: bool,
        validation_score: Option<f64>,
        validation_feedback: Option<String>,
        processing_time: f64,
        tokens_used: i32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            agent_id,
            project_id,
            task_id,
            output_type,
            content,
            confidence_score,
            validated,
            validation_score,
            validation_feedback,
            processing_time,
            tokens_used,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validation_threshold() {
        let mut output = AgentOutput::new(
            "pm-001".to_string(),
            Uuid::new_v4(),
            None,
            "user_stories".to_string(),
            json!({"user_stories": []}),
            0.9,
        )
        .unwrap();

        output.record_validation(0.79, Some("missing priority".to_string()));
        assert!(!output.validated());

        output.record_validation(0.8, None);
        assert!(output.validated());
        assert_eq!(output.validation_score(), Some(0.8));
    }

    #[test]
    fn confidence_is_clamped() {
        let output = AgentOutput::new(
            "qa-001".to_string(),
            Uuid::new_v4(),
            None,
            "test_report".to_string(),
            json!({}),
            1.7,
        )
        .unwrap()
        .with_usage(-1.0, 120);

        assert_eq!(output.confidence_score(), 1.0);
        assert_eq!(output.processing_time(), 0.0);
        assert_eq!(output.tokens_used(), 120);
    }

    #[test]
    fn empty_output_type_rejected() {
        let result = AgentOutput::new(
            "qa-001".to_string(),
            Uuid::new_v4(),
            None,
            " ".to_string(),
            json!({}),
            0.5,
        );
        assert!(result.is_err());
    }
}
