use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};
use uuid::Uuid;

use super::metrics::mean;
use super::EvolutionError;
use crate::domain::knowledge::SharedKnowledge;

const MIN_CONFIDENCE: f64 = 0.6;
const OBSOLETE_SUCCESS_RATE: f64 = 0.3;
const STALE_AFTER_DAYS: i64 = 90;
const STALE_MIN_USAGE: u32 = 3;
const FUSION_SIMILARITY: f64 = 0.85;
const MAX_CONFIDENCE: f64 = 0.95;
const MIN_FEEDBACK_CONFIDENCE: f64 = 0.1;
const FEEDBACK_ALPHA: f64 = 0.1;
const INITIAL_APPLICABILITY: f64 = 0.8;
/// Proven entries get a small confidence and applicability lift on evolve
const PROVEN_USAGE: u32 = 5;
const PROVEN_SUCCESS_RATE: f64 = 0.8;
const HISTORY_CAP: usize = 10_000;
const HISTORY_KEEP: usize = 8_000;
const RECENT_EVENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    Pattern,
    Procedure,
    Factual,
    Heuristic,
    Contextual,
    Collaborative,
    DomainSpecific,
}

impl KnowledgeType {
    pub const ALL: [KnowledgeType; 7] = [
        Self::Pattern,
        Self::Procedure,
        Self::Factual,
        Self::Heuristic,
        Self::Contextual,
        Self::Collaborative,
        Self::DomainSpecific,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pattern => "pattern",
            Self::Procedure => "procedure",
            Self::Factual => "factual",
            Self::Heuristic => "heuristic",
            Self::Contextual => "contextual",
            Self::Collaborative => "collaborative",
            Self::DomainSpecific => "domain_specific",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeSource {
    ProjectExperience,
    AgentInteraction,
    ErrorCorrection,
    SuccessReplication,
    ExternalInput,
    PeerLearning,
}

impl KnowledgeSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectExperience => "project_experience",
            Self::AgentInteraction => "agent_interaction",
            Self::ErrorCorrection => "error_correction",
            Self::SuccessReplication => "success_replication",
            Self::ExternalInput => "external_input",
            Self::PeerLearning => "peer_learning",
        }
    }
}

/// One learned piece of team knowledge with its track record
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeItem {
    pub id: Uuid,
    pub knowledge_type: KnowledgeType,
    pub source: KnowledgeSource,
    pub title: String,
    pub content: Value,
    pub context: Value,
    pub evidence: Vec<Value>,
    pub confidence: f64,
    pub applicability_score: f64,
    pub usage_count: u32,
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub creator_agent: String,
    pub applicable_scenarios: Vec<String>,
    pub prerequisites: Vec<String>,
    pub expected_outcomes: Vec<String>,
}

impl KnowledgeItem {
    pub fn quality_score(&self) -> f64 {
        (self.confidence + self.success_rate) / 2.0
    }

    fn is_obsolete(&self, now: DateTime<Utc>) -> bool {
        self.success_rate < OBSOLETE_SUCCESS_RATE
            || (now - self.last_used > Duration::days(STALE_AFTER_DAYS) && self.usage_count < STALE_MIN_USAGE)
            || self.confidence < MIN_CONFIDENCE
    }

    fn words(&self) -> BTreeSet<String> {
        let mut words = BTreeSet::new();
        collect_words(&self.content, &mut words);
        words
    }

    /// Project named by the extraction context, when it is a stored project
    pub fn source_project(&self) -> Option<Uuid> {
        self.context
            .get("project_id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    /// The shareable, persisted form of this entry
    pub fn to_shared(&self, source_project_id: Option<Uuid>) -> SharedKnowledge {
        SharedKnowledge::from_persistence(
            self.id,
            self.knowledge_type.as_str().to_string(),
            self.title.clone(),
            json!({
                "content": self.content,
                "source": self.source,
                "confidence": self.confidence,
                "evidence_count": self.evidence.len(),
                "prerequisites": self.prerequisites,
                "expected_outcomes": self.expected_outcomes,
            }),
            source_project_id,
            self.applicable_scenarios.clone(),
            vec![self.source.as_str().to_string(), self.knowledge_type.as_str().to_string()],
            i32::try_from(self.usage_count).unwrap_or(i32::MAX),
            self.success_rate.clamp(0.0, 1.0),
            Some(self.creator_agent.clone()),
            self.created_at,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeEvent {
    pub event_type: String,
    pub knowledge_id: Uuid,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolveSummary {
    pub timestamp: DateTime<Utc>,
    pub before_count: usize,
    pub obsoleted: usize,
    pub merged: usize,
    pub enhanced: usize,
    pub after_count: usize,
}

/// Team-wide knowledge base that learns from experience
///
/// Entries are extracted from experience reports, ranked for new tasks,
/// refined by application feedback and periodically pruned and merged.
#[derive(Debug, Default)]
pub struct KnowledgeEvolutionEngine {
    knowledge: HashMap<Uuid, KnowledgeItem>,
    history: Vec<KnowledgeEvent>,
}

impl KnowledgeEvolutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<&KnowledgeItem> {
        self.knowledge.get(&id)
    }

    pub fn len(&self) -> usize {
        self.knowledge.len()
    }

    pub fn is_empty(&self) -> bool {
        self.knowledge.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &KnowledgeItem> {
        self.knowledge.values()
    }

    pub fn events(&self) -> &[KnowledgeEvent] {
        &self.history
    }

    /// Turns an experience report into knowledge entries and keeps those
    /// confident enough
    ///
    /// Keys read: `successful_actions`, `failed_actions`,
    /// `collaboration_patterns`, `task_executions`, `problem_solving_steps`,
    /// `decision_processes`, `optimization_insights`.
    pub fn extract_from_experience(
        &mut self,
        experience: &Value,
        agent_id: &str,
        context: &Value,
    ) -> Vec<KnowledgeItem> {
        let now = Utc::now();
        let mut extracted = Vec::new();

        for (key, pattern_type) in [("successful_actions", "success_pattern"), ("failed_actions", "failure_pattern")] {
            for sequence in entries(experience, key) {
                extracted.extend(pattern_from(sequence, pattern_type, agent_id, context, now));
            }
        }
        for pattern in entries(experience, "collaboration_patterns") {
            extracted.extend(collaboration_from(pattern, agent_id, context, now));
        }
        for execution in entries(experience, "task_executions") {
            extracted.extend(procedure_from_execution(execution, agent_id, context, now));
        }
        for solution in entries(experience, "problem_solving_steps") {
            extracted.extend(procedure_from_problem(solution, agent_id, context, now));
        }
        for decision in entries(experience, "decision_processes") {
            extracted.extend(heuristic_from_decision(decision, agent_id, context, now));
        }
        for insight in entries(experience, "optimization_insights") {
            extracted.extend(heuristic_from_insight(insight, agent_id, context, now));
        }

        let found = extracted.len();
        extracted.retain(|k| k.confidence >= MIN_CONFIDENCE);
        for item in &extracted {
            self.record_event("creation", item.id, agent_id, json!({"knowledge_type": item.knowledge_type}), now);
            self.knowledge.insert(item.id, item.clone());
        }

        info!(agent_id, found, kept = extracted.len(), "Extracted knowledge from experience");
        extracted
    }

    /// Merges same-type pairs whose content overlaps by at least 0.85
    ///
    /// The more confident entry of each pair is the base; each entry merges
    /// at most once per pass.
    pub fn fuse(&mut self, items: Vec<KnowledgeItem>) -> Vec<KnowledgeItem> {
        if items.len() < 2 {
            return items;
        }

        let words: Vec<BTreeSet<String>> = items.iter().map(KnowledgeItem::words).collect();
        let mut candidates = Vec::new();
        for i in 0..items.len() {
            for j in i + 1..items.len() {
                if items[i].knowledge_type != items[j].knowledge_type {
                    continue;
                }
                let similarity = jaccard(&words[i], &words[j]);
                if similarity >= FUSION_SIMILARITY {
                    candidates.push((i, j, similarity));
                }
            }
        }
        candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

        let now = Utc::now();
        let mut merged_into: HashMap<usize, KnowledgeItem> = HashMap::new();
        let mut consumed = BTreeSet::new();
        for (i, j, similarity) in candidates {
            if consumed.contains(&i) || consumed.contains(&j) {
                continue;
            }
            let fused = fuse_pair(&items[i], &items[j]);
            self.record_event(
                "knowledge_fusion",
                fused.id,
                &fused.creator_agent,
                json!({"merged_knowledge_ids": [items[i].id, items[j].id], "similarity_score": similarity}),
                now,
            );
            consumed.insert(i);
            consumed.insert(j);
            merged_into.insert(i, fused);
        }

        let before = items.len();
        let result: Vec<KnowledgeItem> = items
            .into_iter()
            .enumerate()
            .filter_map(|(n, item)| match merged_into.remove(&n) {
                Some(fused) => Some(fused),
                None if consumed.contains(&n) => None,
                None => Some(item),
            })
            .collect();
        debug!(before, after = result.len(), "Knowledge fusion finished");
        result
    }

    /// Best entries for a task, scored 0.4 relevance + 0.3 quality + 0.3 applicability
    pub fn recommend(&self, task_context: &Value, limit: usize) -> Vec<(KnowledgeItem, f64)> {
        let mut task_words = BTreeSet::new();
        collect_words(task_context, &mut task_words);
        let labels: Vec<String> = ["task_type", "project_type"]
            .iter()
            .filter_map(|k| task_context.get(*k).and_then(Value::as_str))
            .map(str::to_lowercase)
            .collect();

        let mut scored: Vec<(KnowledgeItem, f64)> = self
            .knowledge
            .values()
            .filter_map(|item| {
                let mut item_words = item.words();
                collect_words(&json!(item.title), &mut item_words);
                let relevance = jaccard(&task_words, &item_words);
                if relevance <= 0.0 {
                    return None;
                }
                let fits = item
                    .applicable_scenarios
                    .iter()
                    .any(|s| labels.contains(&s.to_lowercase()));
                let applicability = if fits {
                    item.applicability_score
                } else {
                    item.applicability_score * 0.5
                };
                let score = relevance * 0.4 + item.quality_score() * 0.3 + applicability * 0.3;
                Some((item.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        scored.truncate(limit);
        scored
    }

    /// Counts a use of the entry and returns guidance shaped by its type
    pub fn apply(&mut self, knowledge_id: Uuid, task_context: &Value, agent_id: &str) -> Result<Value, EvolutionError> {
        let now = Utc::now();
        let item = self
            .knowledge
            .get_mut(&knowledge_id)
            .ok_or(EvolutionError::KnowledgeNotFound(knowledge_id))?;
        item.usage_count += 1;
        item.last_used = now;

        let guidance = match item.knowledge_type {
            KnowledgeType::Pattern => {
                let failure = item.content["pattern_type"] == "failure_pattern";
                json!({
                    "type": "pattern",
                    "recommended_actions": if failure { json!([]) } else { item.content["action_sequence"].clone() },
                    "actions_to_avoid": if failure { item.content["action_sequence"].clone() } else { json!([]) },
                    "expected_outcomes": item.expected_outcomes,
                })
            }
            KnowledgeType::Procedure => json!({
                "type": "procedure",
                "steps": item.content["steps"],
                "prerequisites": item.prerequisites,
            }),
            KnowledgeType::Heuristic => json!({
                "type": "heuristic",
                "rule": item.content["rule"],
                "confidence": item.confidence,
            }),
            other => json!({"type": other, "content": item.content}),
        };

        self.record_event(
            "knowledge_application",
            knowledge_id,
            agent_id,
            json!({"task_context": task_context, "application_guidance": guidance}),
            now,
        );
        Ok(guidance)
    }

    /// Folds an application outcome into the entry's success rate and confidence
    pub fn record_feedback(
        &mut self,
        knowledge_id: Uuid,
        success: bool,
        result: Value,
        agent_id: &str,
    ) -> Result<&KnowledgeItem, EvolutionError> {
        let now = Utc::now();
        let item = self
            .knowledge
            .get_mut(&knowledge_id)
            .ok_or(EvolutionError::KnowledgeNotFound(knowledge_id))?;

        let outcome = if success { 1.0 } else { 0.0 };
        item.success_rate = (1.0 - FEEDBACK_ALPHA) * item.success_rate + FEEDBACK_ALPHA * outcome;
        item.confidence = if success {
            (item.confidence + 0.05).min(MAX_CONFIDENCE)
        } else {
            (item.confidence - 0.1).max(MIN_FEEDBACK_CONFIDENCE)
        };
        item.evidence.push(json!({
            "type": "application_feedback",
            "result": result,
            "agent_id": agent_id,
            "timestamp": now.to_rfc3339(),
        }));
        let details = json!({"success": success, "new_success_rate": item.success_rate, "new_confidence": item.confidence});

        self.record_event("knowledge_feedback", knowledge_id, agent_id, details, now);
        debug!(%knowledge_id, success, "Recorded knowledge feedback");
        self.knowledge
            .get(&knowledge_id)
            .ok_or(EvolutionError::KnowledgeNotFound(knowledge_id))
    }

    /// Drops obsolete entries, merges near-duplicates and lifts proven ones
    pub fn evolve(&mut self, now: DateTime<Utc>) -> EvolveSummary {
        let before_count = self.knowledge.len();

        let obsolete: Vec<Uuid> = self
            .knowledge
            .values()
            .filter(|k| k.is_obsolete(now))
            .map(|k| k.id)
            .collect();
        for id in &obsolete {
            self.knowledge.remove(id);
        }

        let mut remaining: Vec<KnowledgeItem> = self.knowledge.drain().map(|(_, k)| k).collect();
        remaining.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let pre_fusion = remaining.len();
        let fused = self.fuse(remaining);
        let merged = pre_fusion - fused.len();

        let mut enhanced = 0;
        for mut item in fused {
            if item.usage_count >= PROVEN_USAGE && item.success_rate >= PROVEN_SUCCESS_RATE {
                item.confidence = (item.confidence + 0.05).min(MAX_CONFIDENCE);
                item.applicability_score = (item.applicability_score + 0.05).min(1.0);
                enhanced += 1;
            }
            self.knowledge.insert(item.id, item);
        }

        let summary = EvolveSummary {
            timestamp: now,
            before_count,
            obsoleted: obsolete.len(),
            merged,
            enhanced,
            after_count: self.knowledge.len(),
        };
        info!(
            before = before_count,
            obsoleted = summary.obsoleted,
            merged,
            enhanced,
            after = summary.after_count,
            "Knowledge base evolved"
        );
        summary
    }

    pub fn stats(&self) -> Value {
        let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
        let mut by_source: BTreeMap<&str, usize> = BTreeMap::new();
        for item in self.knowledge.values() {
            *by_type.entry(item.knowledge_type.as_str()).or_default() += 1;
            *by_source.entry(item.source.as_str()).or_default() += 1;
        }

        let confidences: Vec<f64> = self.knowledge.values().map(|k| k.confidence).collect();
        let success_rates: Vec<f64> = self.knowledge.values().map(|k| k.success_rate).collect();
        let mut recent: BTreeMap<&str, usize> = BTreeMap::new();
        for event in self.history.iter().rev().take(RECENT_EVENTS) {
            *recent.entry(event.event_type.as_str()).or_default() += 1;
        }

        json!({
            "total_knowledge_items": self.knowledge.len(),
            "knowledge_by_type": by_type,
            "knowledge_by_source": by_source,
            "average_confidence": mean(&confidences),
            "average_success_rate": mean(&success_rates),
            "total_evolution_events": self.history.len(),
            "recent_activity": recent,
        })
    }

    fn record_event(&mut self, event_type: &str, knowledge_id: Uuid, agent_id: &str, details: Value, now: DateTime<Utc>) {
        self.history.push(KnowledgeEvent {
            event_type: event_type.to_string(),
            knowledge_id,
            agent_id: agent_id.to_string(),
            timestamp: now,
            details,
        });
        if self.history.len() > HISTORY_CAP {
            self.history.drain(..self.history.len() - HISTORY_KEEP);
        }
    }
}

fn entries<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn collect_words(value: &Value, words: &mut BTreeSet<String>) {
    match value {
        Value::String(text) => words.extend(
            text.split(|c: char| !c.is_alphanumeric())
                .filter(|w| w.len() > 2)
                .map(str::to_lowercase),
        ),
        Value::Array(items) => items.iter().for_each(|v| collect_words(v, words)),
        Value::Object(map) => map.values().for_each(|v| collect_words(v, words)),
        _ => {}
    }
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Scenarios named by the surrounding context, plus an extra label
fn scenarios(context: &Value, extra: &str) -> Vec<String> {
    let mut scenarios: Vec<String> = ["project_type", "task_type", "domain"]
        .iter()
        .filter_map(|k| context.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .collect();
    scenarios.push(extra.to_string());
    scenarios
}

/// Outcome strings: a plain string, an array of strings, or an object's string values
fn outcomes(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map.values().filter_map(Value::as_str).map(str::to_string).collect(),
        other => strings(other),
    }
}

fn new_item(
    knowledge_type: KnowledgeType,
    source: KnowledgeSource,
    title: String,
    content: Value,
    agent_id: &str,
    context: &Value,
    now: DateTime<Utc>,
) -> KnowledgeItem {
    KnowledgeItem {
        id: Uuid::new_v4(),
        knowledge_type,
        source,
        title,
        evidence: vec![json!({"type": knowledge_type.as_str(), "data": content, "timestamp": now.to_rfc3339()})],
        content,
        context: if context.is_null() { json!({}) } else { context.clone() },
        confidence: MIN_CONFIDENCE,
        applicability_score: INITIAL_APPLICABILITY,
        usage_count: 0,
        success_rate: 0.5,
        created_at: now,
        last_used: now,
        creator_agent: agent_id.to_string(),
        applicable_scenarios: Vec::new(),
        prerequisites: Vec::new(),
        expected_outcomes: Vec::new(),
    }
}

fn pattern_from(
    sequence: &Value,
    pattern_type: &str,
    agent_id: &str,
    context: &Value,
    now: DateTime<Utc>,
) -> Option<KnowledgeItem> {
    let actions = sequence.get("actions").and_then(Value::as_array).filter(|a| !a.is_empty())?;
    let succeeded = pattern_type == "success_pattern";
    let success_rate = if succeeded { 1.0 } else { 0.0 };
    let label = if succeeded { "Success" } else { "Failure" };
    let source = if succeeded {
        KnowledgeSource::SuccessReplication
    } else {
        KnowledgeSource::ErrorCorrection
    };

    let content = json!({
        "pattern_type": pattern_type,
        "action_sequence": actions,
        "context_conditions": sequence.get("context").cloned().unwrap_or_else(|| json!({})),
        "outcome": sequence.get("outcome").cloned().unwrap_or(Value::Null),
    });
    let mut item = new_item(
        KnowledgeType::Pattern,
        source,
        format!("{label} Pattern - {agent_id}"),
        content,
        agent_id,
        context,
        now,
    );
    item.evidence.push(sequence.clone());
    let evidence_bonus = (0.1 * item.evidence.len() as f64).min(0.3);
    item.confidence = (0.6 + evidence_bonus + (success_rate - 0.5) * 0.4).clamp(0.0, MAX_CONFIDENCE);
    item.success_rate = success_rate;
    item.applicable_scenarios = scenarios(context, "general");
    item.prerequisites = strings(sequence.get("prerequisites"));
    item.expected_outcomes = outcomes(sequence.get("outcome"));
    Some(item)
}

fn collaboration_from(pattern: &Value, agent_id: &str, context: &Value, now: DateTime<Utc>) -> Option<KnowledgeItem> {
    let agents = strings(pattern.get("agents"));
    if agents.len() < 2 {
        return None;
    }
    let effectiveness = pattern.get("effectiveness").and_then(Value::as_f64).unwrap_or(0.5);

    let content = json!({
        "agents": agents,
        "interaction_type": pattern.get("interaction_type").cloned().unwrap_or(Value::Null),
        "communication_style": pattern.get("communication_style").cloned().unwrap_or(Value::Null),
        "effectiveness": effectiveness,
    });
    let mut item = new_item(
        KnowledgeType::Collaborative,
        KnowledgeSource::AgentInteraction,
        format!("Collaboration Pattern - {}", agents.join(", ")),
        content,
        agent_id,
        context,
        now,
    );
    item.confidence = (0.6 + effectiveness * 0.3).min(MAX_CONFIDENCE);
    item.success_rate = effectiveness;
    item.applicable_scenarios = scenarios(context, "collaboration");
    Some(item)
}

fn procedure_from_execution(
    execution: &Value,
    agent_id: &str,
    context: &Value,
    now: DateTime<Utc>,
) -> Option<KnowledgeItem> {
    if execution.get("success").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let steps = execution.get("steps").and_then(Value::as_array).filter(|s| !s.is_empty())?;
    let task_type = execution.get("task_type").and_then(Value::as_str).unwrap_or("general");

    let content = json!({
        "task_type": task_type,
        "steps": steps,
        "duration": execution.get("duration").cloned().unwrap_or(Value::Null),
        "resources_used": execution.get("resources").cloned().unwrap_or_else(|| json!([])),
    });
    let mut item = new_item(
        KnowledgeType::Procedure,
        KnowledgeSource::ProjectExperience,
        format!("Procedure - {task_type}"),
        content,
        agent_id,
        context,
        now,
    );
    item.confidence = 0.75;
    item.success_rate = 1.0;
    item.applicable_scenarios = scenarios(context, task_type);
    item.prerequisites = strings(execution.get("prerequisites"));
    item.expected_outcomes = outcomes(execution.get("outcome"));
    Some(item)
}

fn procedure_from_problem(solution: &Value, agent_id: &str, context: &Value, now: DateTime<Utc>) -> Option<KnowledgeItem> {
    let steps = solution.get("solution_steps").and_then(Value::as_array).filter(|s| !s.is_empty())?;
    let problem = solution.get("problem_type").and_then(Value::as_str).unwrap_or("general");
    let worked = solution.get("success").and_then(Value::as_bool).unwrap_or(true);

    let content = json!({
        "problem_type": problem,
        "steps": steps,
        "root_cause": solution.get("root_cause").cloned().unwrap_or(Value::Null),
    });
    let mut item = new_item(
        KnowledgeType::Procedure,
        KnowledgeSource::ErrorCorrection,
        format!("Problem Solving - {problem}"),
        content,
        agent_id,
        context,
        now,
    );
    item.confidence = 0.7;
    item.success_rate = if worked { 1.0 } else { 0.0 };
    item.applicable_scenarios = scenarios(context, problem);
    Some(item)
}

fn heuristic_from_decision(decision: &Value, agent_id: &str, context: &Value, now: DateTime<Utc>) -> Option<KnowledgeItem> {
    let criteria = decision.get("criteria").filter(|c| !c.is_null())?;
    let choice = decision.get("choice").and_then(Value::as_str).unwrap_or_default();
    let succeeded = decision.pointer("/outcome/success").and_then(Value::as_bool);

    let content = json!({
        "rule": format!("When deciding on {}, prefer {}", decision.get("topic").and_then(Value::as_str).unwrap_or("this"), choice),
        "criteria": criteria,
        "choice": choice,
        "outcome": decision.get("outcome").cloned().unwrap_or(Value::Null),
    });
    let mut item = new_item(
        KnowledgeType::Heuristic,
        KnowledgeSource::ProjectExperience,
        format!("Decision Heuristic - {agent_id}"),
        content,
        agent_id,
        context,
        now,
    );
    item.confidence = match succeeded {
        Some(true) => 0.8,
        Some(false) => 0.4,
        None => 0.65,
    };
    item.success_rate = match succeeded {
        Some(true) => 1.0,
        Some(false) => 0.0,
        None => 0.5,
    };
    item.applicable_scenarios = scenarios(context, "decision_making");
    Some(item)
}

fn heuristic_from_insight(insight: &Value, agent_id: &str, context: &Value, now: DateTime<Utc>) -> Option<KnowledgeItem> {
    let area = insight.get("area").and_then(Value::as_str)?;
    let improvement = insight.get("improvement").and_then(Value::as_f64).unwrap_or(0.0).max(0.0);

    let content = json!({
        "rule": insight.get("technique").cloned().unwrap_or(Value::Null),
        "area": area,
        "improvement": improvement,
    });
    let mut item = new_item(
        KnowledgeType::Heuristic,
        KnowledgeSource::ProjectExperience,
        format!("Optimization - {area}"),
        content,
        agent_id,
        context,
        now,
    );
    item.confidence = (0.6 + improvement.min(0.3)).min(MAX_CONFIDENCE);
    item.success_rate = 0.8;
    item.applicable_scenarios = scenarios(context, "optimization");
    Some(item)
}

fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged = a.to_vec();
    for value in b {
        if !merged.contains(value) {
            merged.push(value.clone());
        }
    }
    merged
}

fn fuse_pair(first: &KnowledgeItem, second: &KnowledgeItem) -> KnowledgeItem {
    let (base, other) = if first.confidence >= second.confidence {
        (first, second)
    } else {
        (second, first)
    };

    let mut fused = base.clone();
    fused.id = Uuid::new_v4();
    fused.source = KnowledgeSource::PeerLearning;
    fused.title = format!("{} (Fused)", base.title);
    if let (Value::Object(target), Value::Object(extra)) = (&mut fused.content, &other.content) {
        for (key, value) in extra {
            target.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    let mut evidence = base.evidence.clone();
    evidence.extend(other.evidence.iter().cloned());
    fused.evidence = evidence;
    fused.confidence = base.confidence.max(other.confidence);
    fused.applicability_score = base.applicability_score.max(other.applicability_score);

    let usage = base.usage_count + other.usage_count;
    fused.usage_count = usage;
    fused.success_rate = if usage == 0 {
        (base.success_rate + other.success_rate) / 2.0
    } else {
        (base.success_rate * f64::from(base.usage_count) + other.success_rate * f64::from(other.usage_count))
            / f64::from(usage)
    };
    fused.created_at = base.created_at.min(other.created_at);
    fused.last_used = base.last_used.max(other.last_used);
    fused.creator_agent = if base.creator_agent == other.creator_agent {
        base.creator_agent.clone()
    } else {
        format!("{}+{}", base.creator_agent, other.creator_agent)
    };
    fused.applicable_scenarios = union(&base.applicable_scenarios, &other.applicable_scenarios);
    fused.prerequisites = union(&base.prerequisites, &other.prerequisites);
    fused.expected_outcomes = union(&base.expected_outcomes, &other.expected_outcomes);
    fused
}

/// Builds an experience report from key/value pairs
pub fn experience(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
    let mut report = Map::new();
    for (key, value) in entries {
        report.insert(key.to_string(), value);
    }
    Value::Object(report)
}
