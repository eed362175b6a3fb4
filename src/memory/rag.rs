use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::embedding::EmbeddingProvider;
use super::vector_store::InMemoryVectorStore;
use crate::domain::agent::AgentRole;

/// Project id that searches across every project
pub const ALL_PROJECTS: &str = "*";

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

const SNIPPET_CHARS: usize = 500;

const TEXT_FIELDS: [&str; 7] = [
    "title",
    "description",
    "summary",
    "content",
    "text",
    "message",
    "rationale",
];

#[derive(Debug, Error, PartialEq)]
pub enum RagError {
    #[error("unknown content type: {0}")]
    UnknownContentType(String),

    #[error("no searchable text in {0} content")]
    NoSearchableText(String),
}

/// Categories of indexed memory, each with its own weight and retention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Decisions,
    Code,
    Bugs,
    Patterns,
    Meetings,
}

impl IndexType {
    pub const ALL: [IndexType; 5] = [
        IndexType::Decisions,
        IndexType::Code,
        IndexType::Bugs,
        IndexType::Patterns,
        IndexType::Meetings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Decisions => "decisions",
            IndexType::Code => "code",
            IndexType::Bugs => "bugs",
            IndexType::Patterns => "patterns",
            IndexType::Meetings => "meetings",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RagError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .ok_or_else(|| RagError::UnknownContentType(value.to_string()))
    }

    pub fn weight(&self) -> f32 {
        match self {
            IndexType::Decisions => 1.0,
            IndexType::Code => 0.8,
            IndexType::Bugs => 0.9,
            IndexType::Patterns => 0.7,
            IndexType::Meetings => 0.6,
        }
    }

    pub fn retention_days(&self) -> i64 {
        match self {
            IndexType::Decisions => 90,
            IndexType::Code => 60,
            IndexType::Bugs => 120,
            IndexType::Patterns => 180,
            IndexType::Meetings => 30,
        }
    }

    /// Sprint artifact key that feeds this index
    fn artifact_key(&self) -> &'static str {
        match self {
            IndexType::Decisions => "decisions",
            IndexType::Code => "code_changes",
            IndexType::Bugs => "bugs_found",
            IndexType::Patterns => "learned_patterns",
            IndexType::Meetings => "meeting_minutes",
        }
    }
}

/// A retrieved memory
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub content: Value,
    /// Similarity after type (and, for context queries, query) weighting
    pub score: f32,
    pub similarity: f32,
    pub source: String,
    pub content_type: IndexType,
    pub project_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Parameters of a similarity search
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub text: String,
    pub project_id: Option<String>,
    pub sprint_id: Option<String>,
    pub content_types: Vec<IndexType>,
    pub limit: usize,
    pub threshold: f32,
}

impl SimilarityQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            project_id: None,
            sprint_id: None,
            content_types: Vec::new(),
            limit: 5,
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }

    /// Restricts to one project; [`ALL_PROJECTS`] lifts the restriction
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        self.project_id = (project_id != ALL_PROJECTS).then_some(project_id);
        self
    }

    pub fn sprint(mut self, sprint_id: impl Into<String>) -> Self {
        self.sprint_id = Some(sprint_id.into());
        self
    }

    pub fn types(mut self, types: &[IndexType]) -> Self {
        self.content_types = types.to_vec();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }
}

/// Semantic search over indexed project memories
pub struct RagRetriever {
    embedder: Box<dyn EmbeddingProvider>,
    store: InMemoryVectorStore,
    sequence: u64,
}

impl RagRetriever {
    pub fn new(embedder: Box<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            store: InMemoryVectorStore::new(),
            sequence: 0,
        }
    }

    pub fn indexed(&self) -> usize {
        self.store.len()
    }

    /// Embeds and stores one memory, returning its document id
    pub fn index_memory(
        &mut self,
        project_id: &str,
        sprint_id: Option<&str>,
        agent_id: Option<&str>,
        content_type: &str,
        content: &Value,
    ) -> Result<String, RagError> {
        self.index_memory_at(project_id, sprint_id, agent_id, content_type, content, Utc::now())
    }

    fn index_memory_at(
        &mut self,
        project_id: &str,
        sprint_id: Option<&str>,
        agent_id: Option<&str>,
        content_type: &str,
        content: &Value,
        now: DateTime<Utc>,
    ) -> Result<String, RagError> {
        let index_type = IndexType::parse(content_type)?;
        let text = extract_text(content);
        if text.is_empty() {
            warn!(content_type, project_id, "Nothing searchable to index");
            return Err(RagError::NoSearchableText(content_type.to_string()));
        }

        self.sequence += 1;
        let doc_id = format!(
            "{}_{}_{}_{}",
            index_type.as_str(),
            project_id,
            now.timestamp_millis(),
            self.sequence
        );

        let mut metadata = Map::new();
        metadata.insert("content_type".into(), json!(index_type.as_str()));
        metadata.insert("project_id".into(), json!(project_id));
        metadata.insert("sprint_id".into(), json!(sprint_id));
        metadata.insert("agent_id".into(), json!(agent_id));
        metadata.insert("timestamp".into(), json!(now.to_rfc3339()));
        metadata.insert(
            "text_content".into(),
            json!(text.chars().take(SNIPPET_CHARS).collect::<String>()),
        );
        metadata.insert("full_content".into(), content.clone());

        let vector = self.embedder.embed(&text);
        self.store.upsert(doc_id.clone(), vector, metadata);

        debug!(doc_id = %doc_id, "Indexed memory");
        Ok(doc_id)
    }

    pub fn retrieve_similar(&mut self, query: &SimilarityQuery) -> Vec<RetrievalResult> {
        let vector = self.embedder.embed(&query.text);

        let mut filter = Map::new();
        if let Some(project_id) = &query.project_id {
            filter.insert("project_id".into(), json!(project_id));
        }
        if let Some(sprint_id) = &query.sprint_id {
            filter.insert("sprint_id".into(), json!(sprint_id));
        }

        let mut results: Vec<RetrievalResult> = self
            .store
            .query(&vector, query.limit * 2, &filter)
            .into_iter()
            .filter(|hit| hit.similarity >= query.threshold)
            .filter_map(|hit| to_result(hit.id, hit.similarity, hit.metadata))
            .filter(|r| query.content_types.is_empty() || query.content_types.contains(&r.content_type))
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.source.cmp(&b.source)));
        results.truncate(query.limit);

        debug!(hits = results.len(), "Similarity search finished");
        results
    }

    /// Searches with queries derived from an agent's sprint context
    ///
    /// Reads `sprint_goal`, `active_blockers`, `recent_work` and
    /// `key_decisions`; each hit keeps its best weighted score.
    pub fn retrieve_by_context(
        &mut self,
        context: &Value,
        project_id: &str,
        limit: usize,
    ) -> Vec<RetrievalResult> {
        let queries = context_queries(context);
        if queries.is_empty() {
            return Vec::new();
        }

        let per_query = (limit / queries.len()).max(2);
        let mut best: HashMap<String, RetrievalResult> = HashMap::new();

        for (text, weight) in queries {
            let query = SimilarityQuery::new(text).project(project_id).limit(per_query);
            for mut result in self.retrieve_similar(&query) {
                result.score *= weight;
                keep_best(&mut best, result);
            }
        }

        ranked(best, limit)
    }

    /// Indexes a finished sprint's decisions, code changes, bugs, patterns
    /// and meeting minutes; entries without searchable text are skipped
    pub fn index_sprint_artifacts(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        artifacts: &Value,
    ) -> Vec<String> {
        let mut ids = Vec::new();

        for index_type in IndexType::ALL {
            let entries = match artifacts.get(index_type.artifact_key()) {
                Some(Value::Array(items)) => items.iter().collect::<Vec<_>>(),
                Some(Value::Null) | None => continue,
                Some(single) => vec![single],
            };

            for entry in entries {
                match self.index_memory(project_id, Some(sprint_id), None, index_type.as_str(), entry) {
                    Ok(id) => ids.push(id),
                    Err(e) => debug!(error = %e, "Skipped sprint artifact"),
                }
            }
        }

        info!(project_id, sprint_id, indexed = ids.len(), "Indexed sprint artifacts");
        ids
    }

    /// Best-matching past project per project id, from patterns and decisions
    pub fn find_similar_projects(&mut self, project_context: &Value, limit: usize) -> Vec<RetrievalResult> {
        let mut parts = Vec::new();
        if let Some(kind) = project_context.get("project_type").and_then(Value::as_str) {
            if !kind.is_empty() {
                parts.push(format!("Project type: {}", kind));
            }
        }
        if let Some(stack) = project_context.get("tech_stack").and_then(Value::as_object) {
            let techs: Vec<&str> = stack.values().filter_map(Value::as_str).collect();
            if !techs.is_empty() {
                parts.push(format!("Technologies: {}", techs.join(", ")));
            }
        }
        if let Some(features) = project_context.get("features").and_then(Value::as_array) {
            let top: Vec<&str> = features.iter().take(3).filter_map(Value::as_str).collect();
            if !top.is_empty() {
                parts.push(format!("Features: {}", top.join(", ")));
            }
        }
        if parts.is_empty() {
            return Vec::new();
        }

        let query = SimilarityQuery::new(parts.join(". "))
            .project(ALL_PROJECTS)
            .types(&[IndexType::Patterns, IndexType::Decisions])
            .limit(limit * 2);

        let mut per_project: HashMap<String, RetrievalResult> = HashMap::new();
        for result in self.retrieve_similar(&query) {
            match per_project.get(&result.project_id) {
                Some(existing) if existing.score >= result.score => {}
                _ => {
                    per_project.insert(result.project_id.clone(), result);
                }
            }
        }

        ranked(per_project, limit)
    }

    /// Memories useful to `role` for the described task
    pub fn relevant_knowledge(
        &mut self,
        role: AgentRole,
        task_type: &str,
        task_description: &str,
        project_id: &str,
        limit: usize,
    ) -> Vec<RetrievalResult> {
        let mut queries: Vec<String> = role_queries(role).iter().map(|q| q.to_string()).collect();
        if !task_type.is_empty() {
            queries.push(task_type.to_string());
        }
        if !task_description.is_empty() {
            queries.push(task_description.chars().take(100).collect());
        }

        let per_query = (limit / queries.len()).max(1);
        let mut best: HashMap<String, RetrievalResult> = HashMap::new();
        for text in queries {
            let query = SimilarityQuery::new(text).project(project_id).limit(per_query);
            for result in self.retrieve_similar(&query) {
                keep_best(&mut best, result);
            }
        }

        ranked(best, limit)
    }

    /// Drops documents past their retention; `retention_days` overrides
    /// every type's own retention. Returns how many were removed.
    pub fn cleanup_old_indexes(&mut self, retention_days: Option<i64>, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .store
            .iter()
            .filter_map(|(id, stored)| {
                let index_type = stored
                    .metadata
                    .get("content_type")
                    .and_then(Value::as_str)
                    .and_then(|t| IndexType::parse(t).ok())?;
                let timestamp = parse_timestamp(stored.metadata.get("timestamp"))?;
                let days = retention_days.unwrap_or_else(|| index_type.retention_days());
                (now - timestamp > Duration::days(days)).then(|| id.clone())
            })
            .collect();

        let removed = self.store.delete(expired.iter().map(String::as_str));
        if removed > 0 {
            info!(removed, "Cleaned up expired memory indexes");
        }
        removed
    }

    /// Drops every document indexed for a project
    pub fn forget_project(&mut self, project_id: &str) -> usize {
        let owned: Vec<String> = self
            .store
            .iter()
            .filter(|(_, stored)| stored.metadata.get("project_id").and_then(Value::as_str) == Some(project_id))
            .map(|(id, _)| id.clone())
            .collect();
        let removed = self.store.delete(owned.iter().map(String::as_str));
        debug!(project_id, removed, "Forgot project memory indexes");
        removed
    }
}

fn role_queries(role: AgentRole) -> &'static [&'static str] {
    match role {
        AgentRole::Pm => &["requirements", "user stories", "product decisions"],
        AgentRole::Architect => &["architecture", "technical decisions", "design patterns"],
        AgentRole::Developer => &["code patterns", "implementation", "bug fixes"],
        AgentRole::Qa => &["test cases", "bug reports", "quality issues"],
        AgentRole::Ui => &["design decisions", "user interface", "user experience"],
        _ => &["general development"],
    }
}

fn keep_best(best: &mut HashMap<String, RetrievalResult>, result: RetrievalResult) {
    match best.get(&result.source) {
        Some(existing) if existing.score >= result.score => {}
        _ => {
            best.insert(result.source.clone(), result);
        }
    }
}

fn ranked(results: HashMap<String, RetrievalResult>, limit: usize) -> Vec<RetrievalResult> {
    let mut results: Vec<RetrievalResult> = results.into_values().collect();
    results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.source.cmp(&b.source)));
    results.truncate(limit);
    results
}

fn to_result(id: String, similarity: f32, metadata: Map<String, Value>) -> Option<RetrievalResult> {
    let content_type = metadata
        .get("content_type")
        .and_then(Value::as_str)
        .and_then(|t| IndexType::parse(t).ok())?;
    let project_id = metadata
        .get("project_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let timestamp = parse_timestamp(metadata.get("timestamp")).unwrap_or_else(Utc::now);
    let content = metadata
        .get("full_content")
        .cloned()
        .unwrap_or_else(|| json!({ "text": metadata.get("text_content").cloned().unwrap_or_default() }));

    Some(RetrievalResult {
        content,
        score: similarity * content_type.weight(),
        similarity,
        source: id,
        content_type,
        project_id,
        timestamp,
    })
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Searchable text of a memory: well-known text fields plus the string
/// values of nested decisions and user stories
pub fn extract_text(content: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(text) = content.as_str() {
        parts.push(text.to_string());
    }
    for field in TEXT_FIELDS {
        if let Some(text) = content.get(field).and_then(Value::as_str) {
            parts.push(text.to_string());
        }
    }
    for nested in ["decisions", "user_stories"] {
        if let Some(items) = content.get(nested).and_then(Value::as_array) {
            for item in items.iter().filter_map(Value::as_object) {
                parts.extend(
                    item.values()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
        }
    }

    parts.join(" ").trim().to_string()
}

fn context_queries(context: &Value) -> Vec<(String, f32)> {
    let mut queries = Vec::new();

    if let Some(goal) = context.get("sprint_goal").and_then(Value::as_str) {
        if !goal.is_empty() {
            queries.push((goal.to_string(), 1.0));
        }
    }

    if let Some(blockers) = context.get("active_blockers").and_then(Value::as_array) {
        for blocker in blockers.iter().take(2) {
            if let Some(description) = blocker.get("description").and_then(Value::as_str) {
                queries.push((description.to_string(), 0.9));
            }
        }
    }

    if let Some(work) = context.get("recent_work").and_then(Value::as_array) {
        for item in work.iter().take(3).filter(|w| w.is_object()) {
            let text = extract_text(item);
            if !text.is_empty() {
                queries.push((text.chars().take(200).collect(), 0.6));
            }
        }
    }

    if let Some(decisions) = context.get("key_decisions").and_then(Value::as_array) {
        let skip = decisions.len().saturating_sub(2);
        for decision in decisions.iter().skip(skip) {
            if let Some(description) = decision.get("description").and_then(Value::as_str) {
                queries.push((description.to_string(), 0.7));
            }
        }
    }

    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embedding::HashEmbedding;

    fn retriever() -> RagRetriever {
        RagRetriever::new(Box::new(HashEmbedding::new(64, 100)))
    }

    #[test]
    fn unknown_content_type_rejected() {
        let mut rag = retriever();
        let err = rag
            .index_memory("p1", None, None, "gossip", &json!({"text": "x"}))
            .unwrap_err();
        assert_eq!(err, RagError::UnknownContentType("gossip".to_string()));
    }

    #[test]
    fn content_without_text_rejected() {
        let mut rag = retriever();
        assert!(rag
            .index_memory("p1", None, None, "code", &json!({"lines": 3}))
            .is_err());
        assert_eq!(rag.indexed(), 0);
    }

    #[test]
    fn exact_text_is_retrieved_with_type_weight() {
        let mut rag = retriever();
        let id = rag
            .index_memory("p1", Some("s1"), None, "bugs", &json!({"title": "Null pointer in checkout"}))
            .unwrap();
        rag.index_memory("p1", None, None, "code", &json!({"title": "Refactor cart"}))
            .unwrap();

        let hits = rag.retrieve_similar(&SimilarityQuery::new("Null pointer in checkout").project("p1"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, id);
        assert!((hits[0].score - 0.9 * hits[0].similarity).abs() < 1e-6);
        assert_eq!(hits[0].content["title"], "Null pointer in checkout");
    }

    #[test]
    fn project_filter_and_wildcard() {
        let mut rag = retriever();
        rag.index_memory("p1", None, None, "decisions", &json!({"description": "Use Postgres"}))
            .unwrap();

        let other = SimilarityQuery::new("Use Postgres").project("p2");
        assert!(rag.retrieve_similar(&other).is_empty());

        let everywhere = SimilarityQuery::new("Use Postgres").project(ALL_PROJECTS);
        assert_eq!(rag.retrieve_similar(&everywhere).len(), 1);
    }

    #[test]
    fn forgetting_a_project_keeps_other_projects() {
        let mut rag = retriever();
        rag.index_memory("p1", None, None, "decisions", &json!({"description": "Use Postgres"}))
            .unwrap();
        rag.index_memory("p1", None, None, "code", &json!({"title": "Cart module"}))
            .unwrap();
        rag.index_memory("p2", None, None, "decisions", &json!({"description": "Use Redis"}))
            .unwrap();

        assert_eq!(rag.forget_project("p1"), 2);
        assert_eq!(rag.indexed(), 1);
        assert_eq!(rag.forget_project("p1"), 0);
    }

    #[test]
    fn content_type_filter() {
        let mut rag = retriever();
        rag.index_memory("p1", None, None, "meetings", &json!({"summary": "Standup"}))
            .unwrap();
        let query = SimilarityQuery::new("Standup").project("p1").types(&[IndexType::Code]);
        assert!(rag.retrieve_similar(&query).is_empty());
    }

    #[test]
    fn nested_decisions_are_searchable() {
        let text = extract_text(&json!({
            "title": "Kickoff",
            "decisions": [{"description": "Adopt Rust", "owner": "arch-001", "score": 3}]
        }));
        assert_eq!(text, "Kickoff Adopt Rust arch-001");
    }

    #[test]
    fn context_queries_weight_and_merge() {
        let mut rag = retriever();
        rag.index_memory("p1", None, None, "decisions", &json!({"description": "Ship MVP"}))
            .unwrap();

        let context = json!({
            "sprint_goal": "Ship MVP",
            "key_decisions": [
                {"description": "old"},
                {"description": "Ship MVP"},
                {"description": "newest"}
            ]
        });
        let hits = rag.retrieve_by_context(&context, "p1", 10);
        assert_eq!(hits.len(), 1);
        // the goal query (weight 1.0) beats the decision query (0.7)
        assert!((hits[0].score - hits[0].similarity).abs() < 1e-5);
    }

    #[test]
    fn sprint_artifacts_map_to_index_types() {
        let mut rag = retriever();
        let ids = rag.index_sprint_artifacts(
            "p1",
            "s1",
            &json!({
                "decisions": [{"title": "Use JWT"}],
                "code_changes": [{"summary": "Add login"}, {"summary": "Add logout"}],
                "bugs_found": {"title": "Race in cache"},
                "meeting_minutes": []
            }),
        );
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().filter(|id| id.starts_with("code_p1_")).count() == 2);
        assert!(ids.iter().any(|id| id.starts_with("bugs_p1_")));
    }

    #[test]
    fn similar_projects_best_per_project() {
        let mut rag = retriever();
        // tech stack values come back in key order: backend, frontend
        let query_text = "Project type: web. Technologies: Rust, React";
        rag.index_memory("p1", None, None, "patterns", &json!({"text": query_text}))
            .unwrap();
        rag.index_memory("p1", None, None, "decisions", &json!({"text": query_text}))
            .unwrap();
        rag.index_memory("p2", None, None, "patterns", &json!({"text": query_text}))
            .unwrap();

        let hits = rag.find_similar_projects(
            &json!({"project_type": "web", "tech_stack": {"frontend": "React", "backend": "Rust"}}),
            3,
        );
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].project_id, "p1");
        assert_eq!(hits[0].content_type, IndexType::Decisions);
    }

    #[test]
    fn relevant_knowledge_uses_role_terms() {
        let mut rag = retriever();
        rag.index_memory("p1", None, None, "bugs", &json!({"text": "bug reports"}))
            .unwrap();

        let hits = rag.relevant_knowledge(AgentRole::Qa, "", "", "p1", 5);
        assert_eq!(hits.len(), 1);
        assert!(rag.relevant_knowledge(AgentRole::Pm, "", "", "p1", 5).is_empty());
    }

    #[test]
    fn cleanup_respects_type_retention() {
        let mut rag = retriever();
        let old = Utc::now() - Duration::days(45);
        rag.index_memory_at("p1", None, None, "meetings", &json!({"text": "retro"}), old)
            .unwrap();
        rag.index_memory_at("p1", None, None, "decisions", &json!({"text": "pick"}), old)
            .unwrap();

        assert_eq!(rag.cleanup_old_indexes(None, Utc::now()), 1);
        assert_eq!(rag.indexed(), 1);
        assert_eq!(rag.cleanup_old_indexes(Some(10), Utc::now()), 1);
        assert_eq!(rag.indexed(), 0);
    }
}
