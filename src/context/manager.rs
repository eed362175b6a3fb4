use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use super::item::{estimate_tokens, ContextImportance, ContextItem, ContextType};
use super::mitigator::{ContextRotMitigator, DegradationAssessment, Mitigation};

/// Overall risk above which mitigations run after an insert
const MITIGATION_THRESHOLD: f64 = 0.7;
/// Share of items kept by emergency compression
const EMERGENCY_KEEP_RATIO: f64 = 0.7;
/// Smallest budget/size ratio at which an important item is still compressed
const MIN_COMPRESSION_RATIO: f64 = 0.3;
/// Characters of a critical item registered as its needle
const NEEDLE_CHARS: usize = 100;

/// One item as it appears in an optimized context
#[derive(Debug, Clone, Serialize)]
pub struct ContextEntry {
    pub id: String,
    pub content: String,
    pub importance: ContextImportance,
    pub compression_level: f64,
    pub token_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizedContext {
    pub query_context: String,
    pub total_items: usize,
    pub total_tokens: usize,
    pub context_sections: BTreeMap<ContextType, Vec<ContextEntry>>,
    pub generated_at: DateTime<Utc>,
}

impl OptimizedContext {
    pub fn entries(&self) -> impl Iterator<Item = &ContextEntry> {
        self.context_sections.values().flatten()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub total_items: usize,
    pub total_tokens: usize,
    pub token_utilization: f64,
    pub importance_distribution: BTreeMap<ContextImportance, usize>,
    pub type_distribution: BTreeMap<ContextType, usize>,
    pub average_item_age_hours: f64,
    pub context_health: &'static str,
}

/// Bounded working memory for one agent
///
/// Every insert is followed by a degradation check; when the window looks
/// unhealthy the manager compresses, protects critical facts and
/// deduplicates. Reads rank and reorder items so critical material opens the
/// window and high-importance material closes it.
#[derive(Debug)]
pub struct AdaptiveContextManager {
    max_tokens: usize,
    items: HashMap<String, ContextItem>,
    mitigator: ContextRotMitigator,
    sequence: u64,
}

impl AdaptiveContextManager {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
            items: HashMap::new(),
            mitigator: ContextRotMitigator::new(max_tokens),
            sequence: 0,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ContextItem> {
        self.items.get(id)
    }

    pub fn mitigator(&self) -> &ContextRotMitigator {
        &self.mitigator
    }

    /// Stores a new item and returns its id
    pub fn add_context(
        &mut self,
        content: impl Into<String>,
        context_type: ContextType,
        importance: ContextImportance,
    ) -> String {
        let content = content.into();
        let now = Utc::now();
        self.sequence += 1;

        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update(now.to_rfc3339().as_bytes());
        hasher.update(self.sequence.to_le_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let id = digest[..12].to_string();

        self.items.insert(
            id.clone(),
            ContextItem::new(id.clone(), content, context_type, importance, now),
        );

        let assessment = self.assess(now);
        if assessment.overall_risk > MITIGATION_THRESHOLD {
            self.apply_mitigations(&assessment, now);
        }

        debug!(item_id = %id, total_items = self.items.len(), "Added context item");
        id
    }

    /// Runs the degradation check over the stored items in insertion-agnostic order
    pub fn assess(&self, now: DateTime<Utc>) -> DegradationAssessment {
        let mut items: Vec<&ContextItem> = self.items.values().collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        self.mitigator.assess(&items, now)
    }

    fn apply_mitigations(&mut self, assessment: &DegradationAssessment, now: DateTime<Utc>) {
        if assessment.recommends(Mitigation::UrgentCompressionNeeded) {
            self.emergency_compression(now);
        }
        // Reordering happens on read, in optimized_context.
        if assessment.recommends(Mitigation::ProtectCriticalInformation) {
            self.protect_critical_information();
        }
        if assessment.recommends(Mitigation::DeduplicateContent) {
            self.deduplicate();
        }
    }

    /// Keeps the top 70% of items by importance, then relevance
    fn emergency_compression(&mut self, now: DateTime<Utc>) {
        let before = self.items.len();
        let keep = (before as f64 * EMERGENCY_KEEP_RATIO) as usize;

        let mut ranked: Vec<(f64, f64, String)> = self
            .items
            .values()
            .map(|i| (i.importance.weight(), i.relevance_score(now), i.id.clone()))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.total_cmp(&a.1)));

        for (_, _, id) in ranked.into_iter().skip(keep) {
            self.items.remove(&id);
        }

        info!(before, after = self.items.len(), "Emergency context compression");
    }

    fn protect_critical_information(&mut self) {
        for item in self.items.values() {
            if item.importance == ContextImportance::Critical {
                let needle: String = item.content.chars().take(NEEDLE_CHARS).collect();
                self.mitigator.add_needle(&needle);
            }
        }
    }

    /// Drops items whose content repeats an older item, crediting the
    /// survivor with their access counts
    fn deduplicate(&mut self) {
        let mut ordered: Vec<ContextItem> = self.items.drain().map(|(_, item)| item).collect();
        ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut survivors: HashMap<String, ContextItem> = HashMap::new();
        let mut by_hash: HashMap<String, String> = HashMap::new();
        let mut removed = 0usize;

        for item in ordered {
            match by_hash.get(&item.semantic_hash) {
                Some(survivor_id) => {
                    if let Some(survivor) = survivors.get_mut(survivor_id) {
                        survivor.access_count += item.access_count;
                    }
                    removed += 1;
                }
                None => {
                    by_hash.insert(item.semantic_hash.clone(), item.id.clone());
                    survivors.insert(item.id.clone(), item);
                }
            }
        }

        self.items = survivors;
        if removed > 0 {
            info!(removed, "Removed duplicate context items");
        }
    }

    /// Builds the context an agent should see for `query`
    ///
    /// Items are ranked by relevance (boosted 1.5x when a query word occurs in
    /// the content), laid out critical, medium, low/minimal, high, and cut at
    /// the token budget.
    pub fn optimized_context(&mut self, query: &str, max_tokens: Option<usize>) -> OptimizedContext {
        let budget = max_tokens.unwrap_or(self.max_tokens);
        let now = Utc::now();

        let selected = fit_window(self.rank(query, now), budget);

        for item in &selected {
            if let Some(stored) = self.items.get_mut(&item.id) {
                stored.touch(now);
            }
        }

        let total_tokens = selected.iter().map(|i| i.token_count).sum();
        let total_items = selected.len();
        let mut context_sections: BTreeMap<ContextType, Vec<ContextEntry>> = BTreeMap::new();
        for item in selected {
            context_sections
                .entry(item.context_type)
                .or_default()
                .push(ContextEntry {
                    id: item.id,
                    content: item.content,
                    importance: item.importance,
                    compression_level: item.compression_level,
                    token_count: item.token_count,
                });
        }

        OptimizedContext {
            query_context: query.to_string(),
            total_items,
            total_tokens,
            context_sections,
            generated_at: now,
        }
    }

    fn rank(&self, query: &str, now: DateTime<Utc>) -> Vec<ContextItem> {
        let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();

        let mut scored: Vec<(f64, &ContextItem)> = self
            .items
            .values()
            .map(|item| {
                let mut score = item.relevance_score(now);
                let content = item.content.to_lowercase();
                if words.iter().any(|w| content.contains(w.as_str())) {
                    score *= 1.5;
                }
                (score, item)
            })
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        scored.into_iter().map(|(_, item)| item.clone()).collect()
    }

    pub fn stats(&self) -> ContextStats {
        let now = Utc::now();
        let total_tokens: usize = self.items.values().map(|i| i.token_count).sum();

        let importance_distribution = ContextImportance::ALL
            .into_iter()
            .map(|imp| (imp, self.items.values().filter(|i| i.importance == imp).count()))
            .collect();
        let type_distribution = ContextType::ALL
            .into_iter()
            .map(|t| (t, self.items.values().filter(|i| i.context_type == t).count()))
            .collect();

        let average_item_age_hours = if self.items.is_empty() {
            0.0
        } else {
            let total: f64 = self
                .items
                .values()
                .map(|i| (now - i.created_at).num_seconds() as f64 / 3600.0)
                .sum();
            total / self.items.len() as f64
        };

        let limit = self.max_tokens as f64 * 0.8;
        ContextStats {
            total_items: self.items.len(),
            total_tokens,
            token_utilization: total_tokens as f64 / self.max_tokens as f64,
            importance_distribution,
            type_distribution,
            average_item_age_hours,
            context_health: if (total_tokens as f64) < limit {
                "healthy"
            } else {
                "approaching_limit"
            },
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        info!("Context cleared");
    }
}

/// Critical first, then medium, low and minimal, with high last
///
/// Filling stops at the first item that no longer fits. When that item is
/// critical or high and the remaining budget still holds a useful share of
/// it, a compressed copy takes the last slot.
fn fit_window(ranked: Vec<ContextItem>, budget: usize) -> Vec<ContextItem> {
    let band = |importance: ContextImportance| match importance {
        ContextImportance::Critical => 0,
        ContextImportance::Medium => 1,
        ContextImportance::Low | ContextImportance::Minimal => 2,
        ContextImportance::High => 3,
    };

    let mut ordered = ranked;
    // stable sort keeps relevance order inside each band
    ordered.sort_by_key(|item| band(item.importance));

    let mut remaining = budget;
    let mut selected = Vec::new();
    for item in ordered {
        if item.token_count <= remaining {
            remaining -= item.token_count;
            selected.push(item);
            continue;
        }
        if let Some(compressed) = compress_into(item, remaining) {
            selected.push(compressed);
        }
        break;
    }
    selected
}

fn compress_into(mut item: ContextItem, remaining: usize) -> Option<ContextItem> {
    if !matches!(item.importance, ContextImportance::Critical | ContextImportance::High) {
        return None;
    }
    let ratio = remaining as f64 / item.token_count as f64;
    if ratio <= MIN_COMPRESSION_RATIO {
        return None;
    }

    let content = compress_content(&item.content, ratio);
    let tokens = estimate_tokens(&content);
    if tokens > remaining {
        return None;
    }
    debug!(id = %item.id, from = item.token_count, to = tokens, "Compressed item into window");
    item.content = content;
    item.token_count = tokens;
    item.compression_level = 1.0 - ratio;
    Some(item)
}

/// Shortens text to roughly `ratio` of its words
///
/// Keeps the first and last third of the target joined by " [...] ". Under
/// ten target words only the first two sentences survive.
pub fn compress_content(content: &str, ratio: f64) -> String {
    if ratio >= 1.0 {
        return content.to_string();
    }

    let words: Vec<&str> = content.split_whitespace().collect();
    let target = (words.len() as f64 * ratio) as usize;

    if target < 10 {
        let sentences: Vec<&str> = content
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .take(2)
            .collect();
        return format!("{}...", sentences.join(". "));
    }
    if words.len() <= target {
        return content.to_string();
    }

    let keep = target / 3;
    format!(
        "{} [...] {}",
        words[..keep].join(" "),
        words[words.len() - keep..].join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_read_back() {
        let mut manager = AdaptiveContextManager::new(1000);
        let id = manager.add_context(
            "Implement login",
            ContextType::TaskContext,
            ContextImportance::Critical,
        );
        assert_eq!(id.len(), 12);
        assert!(manager.get(&id).is_some());

        let ctx = manager.optimized_context("login", None);
        assert_eq!(ctx.total_items, 1);
        assert!(ctx.context_sections.contains_key(&ContextType::TaskContext));
    }

    #[test]
    fn same_content_gets_distinct_ids() {
        let mut manager = AdaptiveContextManager::new(1000);
        let a = manager.add_context("hello", ContextType::Conversation, ContextImportance::Low);
        let b = manager.add_context("hello", ContextType::Conversation, ContextImportance::Low);
        assert_ne!(a, b);
    }

    #[test]
    fn window_order_puts_high_last() {
        let mut manager = AdaptiveContextManager::new(10_000);
        manager.add_context("recent chat", ContextType::Conversation, ContextImportance::High);
        manager.add_context("background", ContextType::ProjectState, ContextImportance::Medium);
        manager.add_context("current task", ContextType::TaskContext, ContextImportance::Critical);
        manager.add_context("old trivia", ContextType::KnowledgeBase, ContextImportance::Minimal);

        let ranked = manager.rank("", Utc::now());
        let ordered = fit_window(ranked, 10_000);
        let importances: Vec<ContextImportance> = ordered.iter().map(|i| i.importance).collect();
        assert_eq!(
            importances,
            vec![
                ContextImportance::Critical,
                ContextImportance::Medium,
                ContextImportance::Minimal,
                ContextImportance::High,
            ]
        );
    }

    #[test]
    fn budget_cuts_the_window() {
        let mut manager = AdaptiveContextManager::new(10_000);
        manager.add_context("a b c d e f g h", ContextType::TaskContext, ContextImportance::Critical);
        manager.add_context("i j k l m n o p", ContextType::ProjectState, ContextImportance::Medium);

        // each item is ceil(8 * 1.3) = 11 tokens
        let ctx = manager.optimized_context("", Some(15));
        assert_eq!(ctx.total_items, 1);
        assert!(ctx.total_tokens <= 15);
    }

    #[test]
    fn oversized_critical_item_is_compressed_into_the_window() {
        let mut manager = AdaptiveContextManager::new(10_000);
        let text: Vec<String> = (0..100).map(|i| format!("fact{}", i)).collect();
        manager.add_context(&text.join(" "), ContextType::TaskContext, ContextImportance::Critical);

        // 130 tokens against a budget of 100
        let ctx = manager.optimized_context("", Some(100));
        assert_eq!(ctx.total_items, 1);
        assert!(ctx.total_tokens <= 100);
        let entry = ctx.entries().next().unwrap();
        assert!(entry.content.starts_with("fact0 fact1"));
        assert!(entry.content.contains(" [...] "));
        assert!(entry.compression_level > 0.0);
    }

    #[test]
    fn oversized_low_item_is_dropped() {
        let mut manager = AdaptiveContextManager::new(10_000);
        let text: Vec<String> = (0..100).map(|i| format!("note{}", i)).collect();
        manager.add_context(&text.join(" "), ContextType::ProjectState, ContextImportance::Low);

        let ctx = manager.optimized_context("", Some(100));
        assert_eq!(ctx.total_items, 0);
    }

    #[test]
    fn compression_keeps_both_ends() {
        let text: Vec<String> = (0..30).map(|i| format!("w{}", i)).collect();
        let compressed = compress_content(&text.join(" "), 0.5);
        assert!(compressed.starts_with("w0 w1 w2 w3 w4"));
        assert!(compressed.contains(" [...] "));
        assert!(compressed.ends_with("w29"));
    }

    #[test]
    fn aggressive_compression_keeps_two_sentences() {
        let compressed = compress_content("First. Second. Third. Fourth.", 0.5);
        assert_eq!(compressed, "First. Second...");
    }

    #[test]
    fn emergency_compression_drops_least_important() {
        let mut manager = AdaptiveContextManager::new(10_000);
        for i in 0..7 {
            manager.add_context(format!("note {}", i), ContextType::KnowledgeBase, ContextImportance::Low);
        }
        manager.add_context("keep me", ContextType::TaskContext, ContextImportance::Critical);
        manager.add_context("keep me too", ContextType::TaskContext, ContextImportance::Critical);
        manager.add_context("and me", ContextType::DecisionHistory, ContextImportance::High);

        manager.emergency_compression(Utc::now());
        assert_eq!(manager.len(), 7);
        let stats = manager.stats();
        assert_eq!(stats.importance_distribution[&ContextImportance::Critical], 2);
        assert_eq!(stats.importance_distribution[&ContextImportance::High], 1);
        assert_eq!(stats.importance_distribution[&ContextImportance::Low], 4);
    }

    #[test]
    fn deduplicate_merges_access_counts() {
        let mut manager = AdaptiveContextManager::new(10_000);
        manager.add_context("same", ContextType::Conversation, ContextImportance::Low);
        manager.add_context("same", ContextType::Conversation, ContextImportance::Low);
        manager.add_context("other", ContextType::Conversation, ContextImportance::Low);

        manager.deduplicate();
        assert_eq!(manager.len(), 2);
        let total_access: u32 = manager.items.values().map(|i| i.access_count).sum();
        assert_eq!(total_access, 3);
    }

    #[test]
    fn stats_report_health() {
        let mut manager = AdaptiveContextManager::new(10);
        assert_eq!(manager.stats().context_health, "healthy");
        manager.add_context("one two three four five six seven", ContextType::TaskContext, ContextImportance::Critical);
        let stats = manager.stats();
        assert_eq!(stats.context_health, "approaching_limit");
        assert_eq!(stats.total_items, 1);

        manager.clear();
        assert!(manager.is_empty());
    }
}
