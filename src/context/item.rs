use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// How much an item matters when the window gets tight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextImportance {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl ContextImportance {
    pub const ALL: [ContextImportance; 5] = [
        ContextImportance::Critical,
        ContextImportance::High,
        ContextImportance::Medium,
        ContextImportance::Low,
        ContextImportance::Minimal,
    ];

    pub fn weight(&self) -> f64 {
        match self {
            ContextImportance::Critical => 1.0,
            ContextImportance::High => 0.8,
            ContextImportance::Medium => 0.6,
            ContextImportance::Low => 0.4,
            ContextImportance::Minimal => 0.2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextImportance::Critical => "critical",
            ContextImportance::High => "high",
            ContextImportance::Medium => "medium",
            ContextImportance::Low => "low",
            ContextImportance::Minimal => "minimal",
        }
    }
}

/// Kind of information an item carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    TaskContext,
    Conversation,
    DecisionHistory,
    ProjectState,
    KnowledgeBase,
    TemporalContext,
    DependencyGraph,
}

impl ContextType {
    pub const ALL: [ContextType; 7] = [
        ContextType::TaskContext,
        ContextType::Conversation,
        ContextType::DecisionHistory,
        ContextType::ProjectState,
        ContextType::KnowledgeBase,
        ContextType::TemporalContext,
        ContextType::DependencyGraph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::TaskContext => "task_context",
            ContextType::Conversation => "conversation",
            ContextType::DecisionHistory => "decision_history",
            ContextType::ProjectState => "project_state",
            ContextType::KnowledgeBase => "knowledge_base",
            ContextType::TemporalContext => "temporal_context",
            ContextType::DependencyGraph => "dependency_graph",
        }
    }
}

/// One entry of an agent's working context
#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    pub id: String,
    pub content: String,
    pub context_type: ContextType,
    pub importance: ContextImportance,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
    /// SHA-256 of the content; equal content means equal hash
    pub semantic_hash: String,
    pub token_count: usize,
    /// 0.0 is the original text, 1.0 fully compressed
    pub compression_level: f64,
}

impl ContextItem {
    pub fn new(
        id: String,
        content: String,
        context_type: ContextType,
        importance: ContextImportance,
        now: DateTime<Utc>,
    ) -> Self {
        let semantic_hash = content_hash(&content);
        let token_count = estimate_tokens(&content);
        Self {
            id,
            content,
            context_type,
            importance,
            created_at: now,
            last_accessed: now,
            access_count: 1,
            semantic_hash,
            token_count,
            compression_level: 0.0,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
        self.access_count += 1;
    }

    /// Blend of recency, access frequency and importance, in 0..=1
    ///
    /// Recency decays exponentially with a one hour time constant.
    pub fn relevance_score(&self, now: DateTime<Utc>) -> f64 {
        let idle_secs = (now - self.last_accessed).num_milliseconds().max(0) as f64 / 1000.0;
        let recency = (-idle_secs / 3600.0).exp();
        let frequency = (f64::from(self.access_count) / 10.0).min(1.0);

        recency * 0.4 + frequency * 0.3 + self.importance.weight() * 0.3
    }
}

/// Rough token count: 1.3 tokens per whitespace-separated word
pub fn estimate_tokens(text: &str) -> usize {
    let words = text.split_whitespace().count();
    (words as f64 * 1.3).ceil() as usize
}

pub(crate) fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one"), 2);
        assert_eq!(estimate_tokens("one two three four five six seven eight nine ten"), 13);
    }

    #[test]
    fn fresh_critical_item_scores_high() {
        let now = Utc::now();
        let item = ContextItem::new(
            "a".to_string(),
            "deploy on friday".to_string(),
            ContextType::TaskContext,
            ContextImportance::Critical,
            now,
        );
        // 1.0 * 0.4 + 0.1 * 0.3 + 1.0 * 0.3
        assert!((item.relevance_score(now) - 0.73).abs() < 1e-9);
    }

    #[test]
    fn relevance_decays_with_idle_time() {
        let now = Utc::now();
        let item = ContextItem::new(
            "a".to_string(),
            "notes".to_string(),
            ContextType::Conversation,
            ContextImportance::Minimal,
            now - Duration::hours(1),
        );
        let expected = (-1.0f64).exp() * 0.4 + 0.03 + 0.06;
        assert!((item.relevance_score(now) - expected).abs() < 1e-6);
    }

    #[test]
    fn same_content_same_hash() {
        let now = Utc::now();
        let a = ContextItem::new(
            "a".into(),
            "x y".into(),
            ContextType::KnowledgeBase,
            ContextImportance::Low,
            now,
        );
        let b = ContextItem::new(
            "b".into(),
            "x y".into(),
            ContextType::ProjectState,
            ContextImportance::High,
            now,
        );
        assert_eq!(a.semantic_hash, b.semantic_hash);
    }
}
