use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};

use super::item::{ContextImportance, ContextItem};

/// Relative positions treated as the "lost in the middle" band
const MIDDLE_BAND: (f64, f64) = (0.3, 0.7);

/// Critical or high item sitting in the middle of the window
#[derive(Debug, Clone, Serialize)]
pub struct BuriedItem {
    pub item_id: String,
    pub position: f64,
    pub importance: ContextImportance,
    pub risk_score: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PositionRisk {
    pub avg_risk: f64,
    pub max_risk: f64,
    pub high_risk_positions: Vec<BuriedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mitigation {
    UrgentCompressionNeeded,
    ReorderContextItems,
    ProtectCriticalInformation,
    DeduplicateContent,
}

/// Health report for a set of context items
#[derive(Debug, Clone, Serialize)]
pub struct DegradationAssessment {
    pub overall_risk: f64,
    pub length_risk: f64,
    pub position_risks: PositionRisk,
    pub needle_preservation: f64,
    pub repetition_issues: f64,
    pub total_tokens: usize,
    pub max_tokens: usize,
    pub recommendations: Vec<Mitigation>,
}

impl DegradationAssessment {
    pub fn recommends(&self, mitigation: Mitigation) -> bool {
        self.recommendations.contains(&mitigation)
    }
}

/// Scores how likely a context window is to degrade model output
///
/// Long windows, important items buried mid-window, lost critical facts
/// ("needles") and repeated content all raise the risk.
#[derive(Debug, Clone)]
pub struct ContextRotMitigator {
    max_tokens: usize,
    needles: BTreeSet<String>,
}

impl ContextRotMitigator {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
            needles: BTreeSet::new(),
        }
    }

    /// Registers a fact that must stay findable in critical items
    pub fn add_needle(&mut self, needle: &str) {
        let needle = needle.trim().to_lowercase();
        if !needle.is_empty() {
            self.needles.insert(needle);
        }
    }

    pub fn needles(&self) -> impl Iterator<Item = &str> {
        self.needles.iter().map(String::as_str)
    }

    pub fn assess(&self, items: &[&ContextItem], now: DateTime<Utc>) -> DegradationAssessment {
        let total_tokens: usize = items.iter().map(|i| i.token_count).sum();
        let length_risk = (total_tokens as f64 / self.max_tokens as f64).min(1.0);
        let position_risks = self.position_risks(items, total_tokens, now);
        let needle_preservation = self.needle_preservation(items);
        let repetition_issues = repetition(items);

        let overall_risk = (length_risk
            + position_risks.avg_risk
            + (1.0 - needle_preservation)
            + repetition_issues)
            / 4.0;

        let mut recommendations = Vec::new();
        if length_risk > 0.8 {
            recommendations.push(Mitigation::UrgentCompressionNeeded);
        }
        if position_risks.avg_risk > 0.6 {
            recommendations.push(Mitigation::ReorderContextItems);
        }
        if needle_preservation < 0.7 {
            recommendations.push(Mitigation::ProtectCriticalInformation);
        }
        if repetition_issues > 0.5 {
            recommendations.push(Mitigation::DeduplicateContent);
        }

        DegradationAssessment {
            overall_risk,
            length_risk,
            position_risks,
            needle_preservation,
            repetition_issues,
            total_tokens,
            max_tokens: self.max_tokens,
            recommendations,
        }
    }

    fn position_risks(
        &self,
        items: &[&ContextItem],
        total_tokens: usize,
        now: DateTime<Utc>,
    ) -> PositionRisk {
        if items.is_empty() {
            return PositionRisk::default();
        }

        let mut risks = Vec::with_capacity(items.len());
        let mut buried = Vec::new();
        let mut cursor = 0usize;
        let denominator = total_tokens.max(1) as f64;

        for item in items {
            let position = cursor as f64 / denominator;
            let in_middle = (MIDDLE_BAND.0..=MIDDLE_BAND.1).contains(&position);
            let multiplier = if in_middle { 2.0 } else { 1.0 };
            let risk = multiplier * (1.0 - item.relevance_score(now));

            if in_middle
                && matches!(
                    item.importance,
                    ContextImportance::Critical | ContextImportance::High
                )
            {
                buried.push(BuriedItem {
                    item_id: item.id.clone(),
                    position,
                    importance: item.importance,
                    risk_score: risk,
                });
            }

            risks.push(risk);
            cursor += item.token_count;
        }

        PositionRisk {
            avg_risk: risks.iter().sum::<f64>() / risks.len() as f64,
            max_risk: risks.iter().copied().fold(0.0, f64::max),
            high_risk_positions: buried,
        }
    }

    /// Share of registered needles still present in some critical item
    fn needle_preservation(&self, items: &[&ContextItem]) -> f64 {
        if self.needles.is_empty() {
            return 1.0;
        }

        let critical: Vec<String> = items
            .iter()
            .filter(|i| i.importance == ContextImportance::Critical)
            .map(|i| i.content.to_lowercase())
            .collect();

        let found = self
            .needles
            .iter()
            .filter(|needle| critical.iter().any(|content| content.contains(needle.as_str())))
            .count();

        (found as f64 / self.needles.len() as f64).clamp(0.0, 1.0)
    }
}

fn repetition(items: &[&ContextItem]) -> f64 {
    if items.len() < 2 {
        return 0.0;
    }
    let unique: HashSet<&str> = items.iter().map(|i| i.semantic_hash.as_str()).collect();
    1.0 - unique.len() as f64 / items.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::item::ContextType;

    fn item(id: &str, content: &str, importance: ContextImportance) -> ContextItem {
        ContextItem::new(
            id.to_string(),
            content.to_string(),
            ContextType::TaskContext,
            importance,
            Utc::now(),
        )
    }

    #[test]
    fn empty_window_is_healthy() {
        let mitigator = ContextRotMitigator::new(100);
        let report = mitigator.assess(&[], Utc::now());
        assert_eq!(report.overall_risk, 0.0);
        assert_eq!(report.needle_preservation, 1.0);
        assert!(report.recommendations.is_empty());
    }

    #[test]
    fn overfull_window_needs_compression() {
        let mitigator = ContextRotMitigator::new(10);
        let long = item("a", &"word ".repeat(20), ContextImportance::Medium);
        let report = mitigator.assess(&[&long], Utc::now());
        assert_eq!(report.length_risk, 1.0);
        assert!(report.recommends(Mitigation::UrgentCompressionNeeded));
    }

    #[test]
    fn repeated_content_is_flagged() {
        let mitigator = ContextRotMitigator::new(1000);
        let a = item("a", "same text", ContextImportance::Low);
        let b = item("b", "same text", ContextImportance::Low);
        let c = item("c", "same text", ContextImportance::Low);
        let report = mitigator.assess(&[&a, &b, &c], Utc::now());
        assert!((report.repetition_issues - 2.0 / 3.0).abs() < 1e-9);
        assert!(report.recommends(Mitigation::DeduplicateContent));
    }

    #[test]
    fn needles_count_only_in_critical_items() {
        let mut mitigator = ContextRotMitigator::new(1000);
        mitigator.add_needle("Budget is 50k");
        mitigator.add_needle("launch in may");

        let critical = item("a", "Reminder: budget is 50K total", ContextImportance::Critical);
        let high = item("b", "We launch in May", ContextImportance::High);
        let report = mitigator.assess(&[&critical, &high], Utc::now());
        assert!((report.needle_preservation - 0.5).abs() < 1e-9);
        assert!(report.recommends(Mitigation::ProtectCriticalInformation));
    }

    #[test]
    fn preservation_never_exceeds_one() {
        let mut mitigator = ContextRotMitigator::new(1000);
        mitigator.add_needle("auth");
        let a = item("a", "auth service", ContextImportance::Critical);
        let b = item("b", "auth tokens", ContextImportance::Critical);
        let report = mitigator.assess(&[&a, &b], Utc::now());
        assert_eq!(report.needle_preservation, 1.0);
    }

    #[test]
    fn middle_items_carry_double_risk() {
        let mitigator = ContextRotMitigator::new(1000);
        let first = item("a", "one two three four", ContextImportance::Low);
        let middle = item("b", "five six seven eight", ContextImportance::High);
        let last = item("c", "nine ten eleven twelve", ContextImportance::Low);
        let now = Utc::now();
        let report = mitigator.assess(&[&first, &middle, &last], now);

        assert_eq!(report.position_risks.high_risk_positions.len(), 1);
        let buried = &report.position_risks.high_risk_positions[0];
        assert_eq!(buried.item_id, "b");
        let expected = 2.0 * (1.0 - middle.relevance_score(now));
        assert!((buried.risk_score - expected).abs() < 1e-9);
    }
}
