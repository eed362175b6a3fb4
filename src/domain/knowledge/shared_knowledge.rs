use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Effectiveness a new knowledge entry starts with
pub const DEFAULT_EFFECTIVENESS: f64 = 0.5;

/// Learning rate of the effectiveness moving average
const FEEDBACK_ALPHA: f64 = 0.1;

/// A reusable lesson shared across projects
///
/// # Invariants
/// - Title cannot be empty
/// - `effectiveness_score` stays within 0..=1
#[derive(Debug, Clone)]
pub struct SharedKnowledge {
    id: Uuid,
    knowledge_type: String,
    title: String,
    content: Value,
    source_project_id: Option<Uuid>,
    applicable_domains: Vec<String>,
    tags: Vec<String>,
    usage_count: i32,
    effectiveness_score: f64,
    created_by_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl SharedKnowledge {
    pub fn new(
        knowledge_type: String,
        title: String,
        content: Value,
        source_project_id: Option<Uuid>,
        applicable_domains: Vec<String>,
        tags: Vec<String>,
        created_by_agent: Option<String>,
    ) -> Result<Self, String> {
        if title.trim().is_empty() {
            return Err("Knowledge title cannot be empty".to_string());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            knowledge_type,
            title,
            content,
            source_project_id,
            applicable_domains,
            tags,
            usage_count: 0,
            effectiveness_score: DEFAULT_EFFECTIVENESS,
            created_by_agent,
            created_at: Utc::now(),
        })
    }

    /// Counts one application and folds its outcome into the effectiveness
    /// as an exponential moving average
    pub fn record_usage(&mut self, success: bool) {
        let outcome = if success { 1.0 } else { 0.0 };
        self.usage_count += 1;
        self.effectiveness_score = ((1.0 - FEEDBACK_ALPHA) * self.effectiveness_score
            + FEEDBACK_ALPHA * outcome)
            .clamp(0.0, 1.0);
    }

    pub fn applies_to(&self, domain: &str) -> bool {
        self.applicable_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn knowledge_type(&self) -> &str {
        &self.knowledge_type
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn source_project_id(&self) -> Option<Uuid> {
        self.source_project_id
    }

    pub fn applicable_domains(&self) -> &[String] {
        &self.applicable_domains
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn usage_count(&self) -> i32 {
        self.usage_count
    }

    pub fn effectiveness_score(&self) -> f64 {
        self.effectiveness_score
    }

    pub fn created_by_agent(&self) -> Option<&str> {
        self.created_by_agent.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        knowledge_type: String,
        title: String,
        content: Value,
        source_project_id: Option<Uuid>,
        applicable_domains: Vec<String>,
        tags: Vec<String>,
        usage_count: i32,
        effectiveness_score: f64,
        created_by_agent: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            knowledge_type,
            title,
            content,
            source_project_id,
            applicable_domains,
            tags,
            usage_count,
            effectiveness_score,
            created_by_agent,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn knowledge() -> SharedKnowledge {
        SharedKnowledge::new(
            "pattern".to_string(),
            "Cache user sessions".to_string(),
            json!({"summary": "keep sessions in redis"}),
            None,
            vec!["Web".to_string()],
            vec!["caching".to_string()],
            Some("arch-001".to_string()),
        )
        .unwrap()
    }

    #[test]
    fn starts_at_default_effectiveness() {
        let k = knowledge();
        assert_eq!(k.effectiveness_score(), DEFAULT_EFFECTIVENESS);
        assert_eq!(k.usage_count(), 0);
    }

    #[test]
    fn feedback_moves_effectiveness() {
        let mut k = knowledge();
        k.record_usage(true);
        assert!((k.effectiveness_score() - 0.55).abs() < 1e-9);

        k.record_usage(false);
        assert!((k.effectiveness_score() - 0.495).abs() < 1e-9);
        assert_eq!(k.usage_count(), 2);
    }

    #[test]
    fn domain_match_ignores_case() {
        assert!(knowledge().applies_to("web"));
        assert!(!knowledge().applies_to("mobile"));
    }

    #[test]
    fn blank_title_rejected() {
        let result = SharedKnowledge::new(
            "pattern".to_string(),
            "  ".to_string(),
            json!({}),
            None,
            vec![],
            vec![],
            None,
        );
        assert!(result.is_err());
    }
}
