use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::agent::AgentRole;

/// Importance below which decayed memories are forgotten
const FORGET_BELOW: f64 = 0.1;
/// Importance factor applied when working memory spills into episodic
const SPILL_FACTOR: f64 = 0.7;
const MEETING_IMPORTANCE: f64 = 0.8;

#[derive(Debug, Error, PartialEq)]
pub enum MemoryError {
    #[error("sprint {sprint_id} of project {project_id} has no memory")]
    SprintNotInitialized {
        project_id: String,
        sprint_id: String,
    },

    #[error("memory {0} not found")]
    NotFound(String),

    #[error("blocker {0} not found")]
    BlockerNotFound(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    /// Sprint goal, decisions and blockers; always retrieved first
    Core,
    Working,
    Episodic,
    Semantic,
}

impl MemoryLayer {
    pub fn token_limit(&self) -> usize {
        match self {
            MemoryLayer::Core => 500,
            MemoryLayer::Working => 2000,
            MemoryLayer::Episodic => 1000,
            MemoryLayer::Semantic => 500,
        }
    }

    /// Share of importance lost per day of age
    pub fn decay_rate(&self) -> f64 {
        match self {
            MemoryLayer::Core => 0.0,
            MemoryLayer::Working => 0.1,
            MemoryLayer::Episodic => 0.05,
            MemoryLayer::Semantic => 0.02,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLayer::Core => "core",
            MemoryLayer::Working => "working",
            MemoryLayer::Episodic => "episodic",
            MemoryLayer::Semantic => "semantic",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryItem {
    pub id: String,
    pub layer: MemoryLayer,
    pub content: Value,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u32,
}

impl MemoryItem {
    /// Roughly four characters of serialized JSON per token
    pub fn estimated_tokens(&self) -> usize {
        self.content.to_string().len() / 4
    }
}

/// Memories selected for an agent, grouped by layer
pub type RetrievedMemories = Vec<(MemoryLayer, Vec<MemoryItem>)>;

type SprintKey = (String, String);

/// Layered per-sprint memory kept in process
///
/// Each sprint has one core record plus any number of working, episodic and
/// semantic items. Retrieval always starts with core memory and fills the
/// remaining token budget by importance and recency.
#[derive(Debug, Default)]
pub struct SprintMemoryManager {
    sprints: HashMap<SprintKey, HashMap<String, MemoryItem>>,
    sequence: u64,
}

impl SprintMemoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the sprint's core memory
    pub fn initialize_sprint(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        sprint_goal: &str,
        success_metrics: Value,
    ) -> String {
        let core = json!({
            "sprint_goal": sprint_goal,
            "start_date": Utc::now().to_rfc3339(),
            "key_decisions": [],
            "active_blockers": [],
            "success_metrics": if success_metrics.is_null() { json!([]) } else { success_metrics },
        });

        info!(project_id, sprint_id, "Initialized sprint memory");
        self.store(project_id, sprint_id, MemoryLayer::Core, core, 1.0, Some("core".to_string()))
    }

    /// Stores an item and returns its id; an existing id is overwritten
    pub fn store(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        layer: MemoryLayer,
        content: Value,
        importance: f64,
        id: Option<String>,
    ) -> String {
        self.store_at(project_id, sprint_id, layer, content, importance, id, Utc::now())
    }

    #[allow(clippy::too_many_arguments)]
    fn store_at(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        layer: MemoryLayer,
        content: Value,
        importance: f64,
        id: Option<String>,
        now: DateTime<Utc>,
    ) -> String {
        self.sequence += 1;
        let id = id.unwrap_or_else(|| {
            format!("{}_{}_{}", layer.as_str(), now.timestamp_millis(), self.sequence)
        });

        let item = MemoryItem {
            id: id.clone(),
            layer,
            content,
            importance: importance.clamp(0.0, 1.0),
            created_at: now,
            last_accessed: now,
            access_count: 0,
        };

        self.sprints
            .entry(key(project_id, sprint_id))
            .or_default()
            .insert(id.clone(), item);

        debug!(layer = layer.as_str(), memory_id = %id, "Stored memory");
        id
    }

    /// Merges `content_update` into an object memory and raises its importance
    pub fn update(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        memory_id: &str,
        content_update: Map<String, Value>,
        importance_boost: f64,
    ) -> Result<(), MemoryError> {
        let item = self
            .sprints
            .get_mut(&key(project_id, sprint_id))
            .and_then(|items| items.get_mut(memory_id))
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;

        match item.content.as_object_mut() {
            Some(object) => object.extend(content_update),
            None => item.content = Value::Object(content_update),
        }
        if importance_boost > 0.0 {
            item.importance = (item.importance + importance_boost).min(1.0);
        }
        item.last_accessed = Utc::now();
        Ok(())
    }

    /// Core memory first, then the preferred layer and the rest by
    /// importance and recency, until `max_tokens` is spent
    pub fn retrieve(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        preferred: Option<MemoryLayer>,
        max_tokens: usize,
    ) -> RetrievedMemories {
        let Some(items) = self.sprints.get_mut(&key(project_id, sprint_id)) else {
            return Vec::new();
        };

        let mut order = vec![MemoryLayer::Working, MemoryLayer::Episodic, MemoryLayer::Semantic];
        if let Some(layer) = preferred.filter(|l| *l != MemoryLayer::Core) {
            order.retain(|l| *l != layer);
            order.insert(0, layer);
        }

        let mut selected: Vec<(MemoryLayer, Vec<String>)> = Vec::new();
        let mut used = 0usize;

        let core: Vec<&MemoryItem> = items.values().filter(|i| i.layer == MemoryLayer::Core).collect();
        if !core.is_empty() {
            used += core.iter().map(|i| i.estimated_tokens()).sum::<usize>();
            selected.push((MemoryLayer::Core, core.iter().map(|i| i.id.clone()).collect()));
        }

        for layer in order {
            if used >= max_tokens {
                break;
            }

            let mut candidates: Vec<&MemoryItem> = items.values().filter(|i| i.layer == layer).collect();
            candidates.sort_by(|a, b| {
                b.importance
                    .total_cmp(&a.importance)
                    .then(b.last_accessed.cmp(&a.last_accessed))
            });

            let mut chosen = Vec::new();
            for item in candidates {
                let tokens = item.estimated_tokens();
                if used + tokens > max_tokens {
                    break;
                }
                used += tokens;
                chosen.push(item.id.clone());
            }
            if !chosen.is_empty() {
                selected.push((layer, chosen));
            }
        }

        let now = Utc::now();
        let mut result: RetrievedMemories = Vec::with_capacity(selected.len());
        for (layer, ids) in selected {
            let mut touched = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(item) = items.get_mut(&id) {
                    item.access_count += 1;
                    item.last_accessed = now;
                    touched.push(item.clone());
                }
            }
            result.push((layer, touched));
        }

        debug!(
            memories = result.iter().map(|(_, m)| m.len()).sum::<usize>(),
            tokens = used,
            "Retrieved sprint memory"
        );
        result
    }

    pub fn add_decision(&mut self, project_id: &str, sprint_id: &str, decision: Value) -> Result<(), MemoryError> {
        let entry = stamped(decision, "timestamp");
        self.with_core_list(project_id, sprint_id, "key_decisions", |list| list.push(entry))
    }

    pub fn add_blocker(&mut self, project_id: &str, sprint_id: &str, blocker: Value) -> Result<(), MemoryError> {
        let entry = stamped(blocker, "added_at");
        self.with_core_list(project_id, sprint_id, "active_blockers", |list| list.push(entry))
    }

    /// Marks the blocker whose `id` matches as resolved
    pub fn resolve_blocker(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        blocker_id: &str,
        resolution: &str,
    ) -> Result<(), MemoryError> {
        let mut found = false;
        self.with_core_list(project_id, sprint_id, "active_blockers", |list| {
            if let Some(blocker) = list
                .iter_mut()
                .find(|b| b.get("id").and_then(Value::as_str) == Some(blocker_id))
            {
                if let Some(object) = blocker.as_object_mut() {
                    object.insert("resolved".into(), json!(true));
                    object.insert("resolution".into(), json!(resolution));
                    object.insert("resolved_at".into(), json!(Utc::now().to_rfc3339()));
                    found = true;
                }
            }
        })?;

        if found {
            Ok(())
        } else {
            Err(MemoryError::BlockerNotFound(blocker_id.to_string()))
        }
    }

    /// Records a meeting in episodic memory
    pub fn add_meeting(&mut self, project_id: &str, sprint_id: &str, kind: &str, data: Value) -> String {
        let now = Utc::now();
        let record = json!({
            "type": kind,
            "data": data,
            "timestamp": now.to_rfc3339(),
        });
        self.sequence += 1;
        let id = format!("meeting_{}_{}_{}", kind, now.timestamp_millis(), self.sequence);
        self.store(project_id, sprint_id, MemoryLayer::Episodic, record, MEETING_IMPORTANCE, Some(id))
    }

    /// Keeps the most important working items within the working limit and
    /// moves the rest to episodic memory at reduced importance
    ///
    /// Returns how many items were moved.
    pub fn compress_working(&mut self, project_id: &str, sprint_id: &str) -> usize {
        let Some(items) = self.sprints.get_mut(&key(project_id, sprint_id)) else {
            return 0;
        };

        let limit = MemoryLayer::Working.token_limit();
        let mut working: Vec<&MemoryItem> =
            items.values().filter(|i| i.layer == MemoryLayer::Working).collect();
        let total: usize = working.iter().map(|i| i.estimated_tokens()).sum();
        if total <= limit {
            return 0;
        }

        working.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then(b.last_accessed.cmp(&a.last_accessed))
        });

        let mut kept_tokens = 0usize;
        let mut spill = Vec::new();
        for item in working {
            let tokens = item.estimated_tokens();
            if kept_tokens + tokens <= limit {
                kept_tokens += tokens;
            } else {
                spill.push(item.id.clone());
            }
        }

        for id in &spill {
            if let Some(mut item) = items.remove(id) {
                item.id = format!("archived_{}", item.id);
                item.layer = MemoryLayer::Episodic;
                item.importance *= SPILL_FACTOR;
                items.insert(item.id.clone(), item);
            }
        }

        info!(from = total, limit, moved = spill.len(), "Compressed working memory");
        spill.len()
    }

    /// Ages non-core memories: importance times (1 - rate)^age_days;
    /// anything that drops below 0.1 is forgotten
    ///
    /// Returns how many items were forgotten.
    pub fn decay(&mut self, project_id: &str, sprint_id: &str, now: DateTime<Utc>) -> usize {
        let Some(items) = self.sprints.get_mut(&key(project_id, sprint_id)) else {
            return 0;
        };

        let mut forgotten = Vec::new();
        for item in items.values_mut().filter(|i| i.layer != MemoryLayer::Core) {
            let age_days = (now - item.created_at).num_days().max(0) as i32;
            let factor = (1.0 - item.layer.decay_rate()).powi(age_days);
            item.importance *= factor;
            if item.importance < FORGET_BELOW {
                forgotten.push(item.id.clone());
            }
        }

        for id in &forgotten {
            items.remove(id);
        }
        forgotten.len()
    }

    /// Sprint memory shaped for an agent prompt
    pub fn context_for_agent(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        role: AgentRole,
        max_tokens: usize,
    ) -> Value {
        let memories = self.retrieve(project_id, sprint_id, None, max_tokens);

        let mut context = json!({
            "project_id": project_id,
            "sprint_id": sprint_id,
            "agent_role": role.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
        });

        for (layer, items) in memories {
            match layer {
                MemoryLayer::Core => {
                    if let Some(core) = items.first() {
                        for field in ["sprint_goal", "key_decisions", "active_blockers"] {
                            context[field] = core.content.get(field).cloned().unwrap_or(Value::Null);
                        }
                    }
                }
                MemoryLayer::Working => {
                    context["recent_work"] = Value::Array(items.into_iter().map(|m| m.content).collect());
                }
                MemoryLayer::Episodic => {
                    context["meeting_history"] = Value::Array(items.into_iter().map(|m| m.content).collect());
                }
                MemoryLayer::Semantic => {
                    context["learned_patterns"] = Value::Array(items.into_iter().map(|m| m.content).collect());
                }
            }
        }

        context
    }

    pub fn is_initialized(&self, project_id: &str, sprint_id: &str) -> bool {
        self.core(project_id, sprint_id).is_some()
    }

    /// The sprint's core record: goal, decisions, blockers and metrics
    pub fn core(&self, project_id: &str, sprint_id: &str) -> Option<&Value> {
        self.sprints
            .get(&key(project_id, sprint_id))
            .and_then(|items| items.values().find(|i| i.layer == MemoryLayer::Core))
            .map(|item| &item.content)
    }

    /// Drops every sprint of a project; returns how many sprints were held
    pub fn forget_project(&mut self, project_id: &str) -> usize {
        let before = self.sprints.len();
        self.sprints.retain(|(project, _), _| project != project_id);
        before - self.sprints.len()
    }

    pub fn layer_items(&self, project_id: &str, sprint_id: &str, layer: MemoryLayer) -> Vec<&MemoryItem> {
        self.sprints
            .get(&key(project_id, sprint_id))
            .map(|items| items.values().filter(|i| i.layer == layer).collect())
            .unwrap_or_default()
    }

    fn with_core_list(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        field: &str,
        apply: impl FnOnce(&mut Vec<Value>),
    ) -> Result<(), MemoryError> {
        let core = self
            .sprints
            .get_mut(&key(project_id, sprint_id))
            .and_then(|items| items.values_mut().find(|i| i.layer == MemoryLayer::Core))
            .ok_or_else(|| MemoryError::SprintNotInitialized {
                project_id: project_id.to_string(),
                sprint_id: sprint_id.to_string(),
            })?;

        if !core.content[field].is_array() {
            core.content[field] = json!([]);
        }
        if let Some(list) = core.content[field].as_array_mut() {
            apply(list);
        }
        core.last_accessed = Utc::now();
        Ok(())
    }
}

fn key(project_id: &str, sprint_id: &str) -> SprintKey {
    (project_id.to_string(), sprint_id.to_string())
}

fn stamped(value: Value, field: &str) -> Value {
    let mut object = match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("description".into(), other);
            map
        }
    };
    object.insert(field.to_string(), json!(Utc::now().to_rfc3339()));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager() -> SprintMemoryManager {
        let mut m = SprintMemoryManager::new();
        m.initialize_sprint("p1", "s1", "Ship checkout", json!(["conversion > 2%"]));
        m
    }

    #[test]
    fn core_memory_comes_first() {
        let mut m = manager();
        m.store("p1", "s1", MemoryLayer::Working, json!({"task": "cart"}), 0.5, None);

        let memories = m.retrieve("p1", "s1", None, 3000);
        assert_eq!(memories[0].0, MemoryLayer::Core);
        assert_eq!(memories[1].0, MemoryLayer::Working);
        assert_eq!(memories[1].1[0].access_count, 1);
    }

    #[test]
    fn token_budget_limits_retrieval() {
        let mut m = manager();
        let big = json!({"notes": "x".repeat(400)});
        m.store("p1", "s1", MemoryLayer::Working, big.clone(), 0.9, None);
        m.store("p1", "s1", MemoryLayer::Working, big, 0.8, None);

        let core_tokens = m.layer_items("p1", "s1", MemoryLayer::Core)[0].estimated_tokens();
        let memories = m.retrieve("p1", "s1", None, core_tokens + 150);
        let working: usize = memories
            .iter()
            .filter(|(l, _)| *l == MemoryLayer::Working)
            .map(|(_, items)| items.len())
            .sum();
        assert_eq!(working, 1);
    }

    #[test]
    fn decisions_and_blockers_land_in_core() {
        let mut m = manager();
        m.add_decision("p1", "s1", json!({"description": "Use Stripe"})).unwrap();
        m.add_blocker("p1", "s1", json!({"id": "b1", "description": "API keys missing"})).unwrap();
        m.resolve_blocker("p1", "s1", "b1", "keys issued").unwrap();

        let ctx = m.context_for_agent("p1", "s1", AgentRole::Developer, 3000);
        assert_eq!(ctx["sprint_goal"], "Ship checkout");
        assert_eq!(ctx["key_decisions"][0]["description"], "Use Stripe");
        assert_eq!(ctx["active_blockers"][0]["resolved"], true);
        assert_eq!(ctx["agent_role"], "developer");

        assert_eq!(
            m.resolve_blocker("p1", "s1", "nope", "x"),
            Err(MemoryError::BlockerNotFound("nope".to_string()))
        );
    }

    #[test]
    fn forgetting_a_project_drops_all_its_sprints() {
        let mut m = manager();
        m.initialize_sprint("p1", "s2", "Harden checkout", Value::Null);
        m.initialize_sprint("p2", "s1", "Other", Value::Null);
        assert!(m.is_initialized("p1", "s2"));
        assert_eq!(m.core("p1", "s2").unwrap()["success_metrics"], json!([]));

        assert_eq!(m.forget_project("p1"), 2);
        assert!(!m.is_initialized("p1", "s1"));
        assert!(m.is_initialized("p2", "s1"));
    }

    #[test]
    fn uninitialized_sprint_is_an_error() {
        let mut m = SprintMemoryManager::new();
        assert!(m.add_decision("p1", "s9", json!({})).is_err());
    }

    #[test]
    fn update_merges_and_caps_importance() {
        let mut m = manager();
        let id = m.store("p1", "s1", MemoryLayer::Semantic, json!({"a": 1}), 0.9, None);
        let mut patch = Map::new();
        patch.insert("b".into(), json!(2));
        m.update("p1", "s1", &id, patch, 0.5).unwrap();

        let item = m.layer_items("p1", "s1", MemoryLayer::Semantic)[0].clone();
        assert_eq!(item.content, json!({"a": 1, "b": 2}));
        assert_eq!(item.importance, 1.0);
        assert!(m.update("p1", "s1", "missing", Map::new(), 0.0).is_err());
    }

    #[test]
    fn meetings_are_episodic() {
        let mut m = manager();
        let id = m.add_meeting("p1", "s1", "standup", json!({"attendees": 5}));
        assert!(id.starts_with("meeting_standup_"));
        let episodic = m.layer_items("p1", "s1", MemoryLayer::Episodic);
        assert_eq!(episodic.len(), 1);
        assert_eq!(episodic[0].importance, 0.8);
    }

    #[test]
    fn compression_spills_to_episodic() {
        let mut m = manager();
        // each item is just under 1000 tokens
        for importance in [0.9, 0.6, 0.3] {
            m.store(
                "p1",
                "s1",
                MemoryLayer::Working,
                json!({"notes": "y".repeat(3900)}),
                importance,
                None,
            );
        }

        assert_eq!(m.compress_working("p1", "s1"), 1);
        let episodic = m.layer_items("p1", "s1", MemoryLayer::Episodic);
        assert_eq!(episodic.len(), 1);
        assert!(episodic[0].id.starts_with("archived_"));
        assert!((episodic[0].importance - 0.21).abs() < 1e-9);
    }

    #[test]
    fn decay_forgets_stale_items_but_not_core() {
        let mut m = manager();
        let old = Utc::now() - Duration::days(30);
        m.store_at("p1", "s1", MemoryLayer::Working, json!({"t": 1}), 0.5, None, old);
        m.store_at("p1", "s1", MemoryLayer::Semantic, json!({"t": 2}), 0.5, None, old);

        assert_eq!(m.decay("p1", "s1", Utc::now()), 1);
        assert!(m.layer_items("p1", "s1", MemoryLayer::Working).is_empty());
        let semantic = m.layer_items("p1", "s1", MemoryLayer::Semantic)[0].importance;
        assert!((semantic - 0.5 * 0.98f64.powi(30)).abs() < 1e-9);
        assert_eq!(m.layer_items("p1", "s1", MemoryLayer::Core)[0].importance, 1.0);
    }
}
