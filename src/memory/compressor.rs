use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Key the compressor adds to every context it shrinks
pub const COMPRESSION_INFO_KEY: &str = "_compression_info";

/// A partially fitting value is only shrunk when this many tokens remain
const PARTIAL_FIT_MIN_TOKENS: usize = 50;
const KEPT_DECISIONS: usize = 3;
const SUMMARY_PREVIEW_ITEMS: usize = 3;
const SUMMARY_MAX_CHARS: usize = 200;

const TIMESTAMP_FIELDS: [&str; 4] = ["timestamp", "created_at", "date", "time"];
const STORY_FIELDS: [&str; 4] = ["title", "status", "priority", "assigned_to"];

/// Roughly four characters of serialized JSON per token
pub fn json_tokens(value: &Value) -> usize {
    value.to_string().len() / 4
}

fn map_tokens(map: &Map<String, Value>) -> usize {
    let chars: usize = map
        .iter()
        .map(|(k, v)| k.len() + v.to_string().len() + 4)
        .sum();
    (chars + 2) / 4
}

/// How much of a key's content survives compression
pub fn key_weight(key: &str) -> f64 {
    match key {
        "sprint_goal" => 1.0,
        "active_blockers" => 0.95,
        "key_decisions" => 0.9,
        "user_stories" => 0.8,
        "code_snippets" => 0.7,
        "meeting_notes" => 0.6,
        "test_results" => 0.5,
        "discussions" => 0.3,
        "logs" => 0.2,
        _ => 0.5,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    Hierarchical,
    Temporal,
    Summarize,
    ExtractKey,
    RemoveRedundant,
}

impl CompressionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hierarchical => "hierarchical",
            Self::Temporal => "temporal",
            Self::Summarize => "summarize",
            Self::ExtractKey => "extract_key",
            Self::RemoveRedundant => "remove_redundant",
        }
    }
}

/// Severity of a compression, from the target/original token ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Light,
    Medium,
    Heavy,
    Extreme,
}

impl CompressionLevel {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.8 {
            Self::Light
        } else if ratio >= 0.5 {
            Self::Medium
        } else if ratio >= 0.2 {
            Self::Heavy
        } else {
            Self::Extreme
        }
    }
}

/// Record of one compression, also embedded in its output
#[derive(Debug, Clone, Serialize)]
pub struct CompressionInfo {
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    pub compression_ratio: f64,
    pub strategy: CompressionStrategy,
    pub level: CompressionLevel,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionStats {
    pub total_compressions: usize,
    pub average_ratio: f64,
    pub strategy_usage: BTreeMap<CompressionStrategy, usize>,
    pub level_distribution: BTreeMap<CompressionLevel, usize>,
}

/// Shrinks JSON agent contexts to a token budget
///
/// Keys starting with `_` are bookkeeping and never carried over. Contexts
/// already within budget come back unchanged and are not recorded.
#[derive(Debug, Default)]
pub struct ContextCompressor {
    history: Vec<CompressionInfo>,
}

impl ContextCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compress(
        &mut self,
        context: &Map<String, Value>,
        target_tokens: usize,
        strategy: CompressionStrategy,
    ) -> Map<String, Value> {
        let original_tokens = map_tokens(context);
        if original_tokens <= target_tokens {
            return context.clone();
        }

        let mut compressed = match strategy {
            CompressionStrategy::Hierarchical => hierarchical(context, target_tokens),
            CompressionStrategy::Temporal => temporal(context, target_tokens),
            CompressionStrategy::Summarize => summarize(context, target_tokens),
            CompressionStrategy::ExtractKey => extract_key(context, target_tokens),
            CompressionStrategy::RemoveRedundant => remove_redundant(context, target_tokens),
        };

        let compressed_tokens = map_tokens(&compressed);
        let ratio = target_tokens as f64 / original_tokens as f64;
        let info = CompressionInfo {
            original_tokens,
            compressed_tokens,
            compression_ratio: compressed_tokens as f64 / original_tokens as f64,
            strategy,
            level: CompressionLevel::from_ratio(ratio),
            timestamp: Utc::now(),
        };
        debug!(
            strategy = strategy.as_str(),
            original_tokens, compressed_tokens, "Compressed context"
        );

        compressed.insert(COMPRESSION_INFO_KEY.into(), json!(info));
        self.history.push(info);
        compressed
    }

    pub fn history(&self) -> &[CompressionInfo] {
        &self.history
    }

    pub fn stats(&self) -> CompressionStats {
        if self.history.is_empty() {
            return CompressionStats::default();
        }

        let mut stats = CompressionStats {
            total_compressions: self.history.len(),
            average_ratio: self.history.iter().map(|i| i.compression_ratio).sum::<f64>()
                / self.history.len() as f64,
            ..CompressionStats::default()
        };
        for info in &self.history {
            *stats.strategy_usage.entry(info.strategy).or_default() += 1;
            *stats.level_distribution.entry(info.level).or_default() += 1;
        }
        stats
    }
}

fn visible(context: &Map<String, Value>) -> impl Iterator<Item = (&String, &Value)> {
    context.iter().filter(|(k, _)| !k.starts_with('_'))
}

fn by_weight(context: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<(&String, &Value)> = visible(context).collect();
    entries.sort_by(|a, b| key_weight(b.0).total_cmp(&key_weight(a.0)).then(a.0.cmp(b.0)));
    entries
}

/// Highest-weight keys first; the first value that no longer fits is shrunk
/// when enough budget is left for it to stay useful
fn hierarchical(context: &Map<String, Value>, target: usize) -> Map<String, Value> {
    let mut out = Map::new();
    let mut remaining = target;

    for (key, value) in by_weight(context) {
        let tokens = json_tokens(value);
        if tokens <= remaining {
            out.insert(key.clone(), value.clone());
            remaining -= tokens;
        } else if remaining > PARTIAL_FIT_MIN_TOKENS {
            if let Some(partial) = shrink_value(value, remaining) {
                remaining = remaining.saturating_sub(json_tokens(&partial));
                out.insert(key.clone(), partial);
            }
        }
    }
    out
}

/// Cuts a value down to roughly `budget` tokens
fn shrink_value(value: &Value, budget: usize) -> Option<Value> {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            let mut used = 0;
            for (key, inner) in by_weight(map) {
                let tokens = json_tokens(inner);
                if used + tokens <= budget {
                    out.insert(key.clone(), inner.clone());
                    used += tokens;
                }
            }
            (!out.is_empty()).then_some(Value::Object(out))
        }
        Value::Array(items) => {
            // newest entries sit at the end
            let mut kept = Vec::new();
            let mut used = 0;
            for item in items.iter().rev() {
                let tokens = json_tokens(item);
                if used + tokens > budget {
                    break;
                }
                used += tokens;
                kept.push(item.clone());
            }
            kept.reverse();
            (!kept.is_empty()).then_some(Value::Array(kept))
        }
        Value::String(text) => {
            let max_chars = (budget * 4).saturating_sub(3);
            (max_chars > 0).then(|| json!(format!("{}...", text.chars().take(max_chars).collect::<String>())))
        }
        _ => None,
    }
}

fn timestamp_of(value: &Value) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS.iter().find_map(|field| {
        value
            .get(*field)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Newest timestamped entries first, then the rest while they fit
fn temporal(context: &Map<String, Value>, target: usize) -> Map<String, Value> {
    let mut timed: Vec<(DateTime<Utc>, &String, &Value)> = Vec::new();
    let mut untimed: Vec<(&String, &Value)> = Vec::new();
    for (key, value) in visible(context) {
        match timestamp_of(value) {
            Some(at) => timed.push((at, key, value)),
            None => untimed.push((key, value)),
        }
    }
    timed.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = Map::new();
    let mut remaining = target;
    let ordered = timed.into_iter().map(|(_, k, v)| (k, v)).chain(untimed);
    for (key, value) in ordered {
        let tokens = json_tokens(value);
        if tokens <= remaining {
            out.insert(key.clone(), value.clone());
            remaining -= tokens;
        }
    }
    out
}

fn summary_text(value: &Value) -> String {
    let text = match value {
        Value::Array(items) => {
            let preview: Vec<String> = items
                .iter()
                .take(SUMMARY_PREVIEW_ITEMS)
                .map(|item| {
                    ["title", "description", "name"]
                        .iter()
                        .find_map(|f| item.get(*f).and_then(Value::as_str))
                        .map(str::to_string)
                        .unwrap_or_else(|| item.to_string())
                })
                .collect();
            format!("{} items: {}", items.len(), preview.join("; "))
        }
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            format!("Keys: {}", keys.join(", "))
        }
        Value::String(text) => text.split(". ").next().unwrap_or_default().to_string(),
        other => other.to_string(),
    };
    text.chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Replaces bulky values with `<key>_summary` text, then fits by weight
fn summarize(context: &Map<String, Value>, target: usize) -> Map<String, Value> {
    let mut summarized = Map::new();
    for (key, value) in visible(context) {
        if json_tokens(value) <= PARTIAL_FIT_MIN_TOKENS {
            summarized.insert(key.clone(), value.clone());
        } else {
            summarized.insert(format!("{key}_summary"), json!(summary_text(value)));
        }
    }
    fit(summarized, target)
}

/// Keeps the sprint goal, the latest decisions, open blockers and slimmed
/// user stories
fn extract_key(context: &Map<String, Value>, target: usize) -> Map<String, Value> {
    let mut out = Map::new();

    if let Some(goal) = context.get("sprint_goal") {
        out.insert("sprint_goal".into(), goal.clone());
    }
    if let Some(decisions) = context.get("key_decisions").and_then(Value::as_array) {
        let skip = decisions.len().saturating_sub(KEPT_DECISIONS);
        out.insert("key_decisions".into(), Value::Array(decisions[skip..].to_vec()));
    }
    if let Some(blockers) = context.get("active_blockers").and_then(Value::as_array) {
        let open: Vec<Value> = blockers
            .iter()
            .filter(|b| !b.get("resolved").and_then(Value::as_bool).unwrap_or(false))
            .cloned()
            .collect();
        out.insert("active_blockers".into(), Value::Array(open));
    }
    if let Some(stories) = context.get("user_stories").and_then(Value::as_array) {
        let slim: Vec<Value> = stories
            .iter()
            .map(|story| {
                let fields: Map<String, Value> = STORY_FIELDS
                    .iter()
                    .filter_map(|f| story.get(*f).map(|v| (f.to_string(), v.clone())))
                    .collect();
                Value::Object(fields)
            })
            .collect();
        out.insert("user_stories".into(), Value::Array(slim));
    }
    fit(out, target)
}

fn fingerprint(value: &Value) -> [u8; 32] {
    Sha256::digest(value.to_string().as_bytes()).into()
}

/// Drops repeated list entries and repeated top-level values
fn remove_redundant(context: &Map<String, Value>, target: usize) -> Map<String, Value> {
    let mut seen_values = HashSet::new();
    let mut out = Map::new();

    for (key, value) in visible(context) {
        let deduped = match value {
            Value::Array(items) => {
                let mut seen_items = HashSet::new();
                Value::Array(
                    items
                        .iter()
                        .filter(|item| seen_items.insert(fingerprint(item)))
                        .cloned()
                        .collect(),
                )
            }
            other => other.clone(),
        };
        if seen_values.insert(fingerprint(&deduped)) {
            out.insert(key.clone(), deduped);
        }
    }
    fit(out, target)
}

fn fit(context: Map<String, Value>, target: usize) -> Map<String, Value> {
    if map_tokens(&context) <= target {
        context
    } else {
        hierarchical(&context, target)
    }
}
