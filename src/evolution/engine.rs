use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::metrics::{definition, mean, trend_score};

const HISTORY_CAP: usize = 1000;
const HISTORY_KEEP: usize = 800;
const PERFORMANCE_WINDOW_DAYS: i64 = 30;
/// Relative drop between consecutive 5-sample windows that counts as a decline
const DECLINE_THRESHOLD: f64 = 0.15;
const DECLINE_WINDOW: usize = 5;
const CONFIDENCE_THRESHOLD: f64 = 0.7;
const SLOW_RESPONSE_SECS: f64 = 5.0;
const HANDOFF_DELAY_HOURS: f64 = 2.0;
const TECH_DEBT_LIMIT: f64 = 10.0;
const COVERAGE_TARGET: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionTrigger {
    ProjectCompletion,
    PerformanceDecline,
    ErrorPattern,
    FeedbackNegative,
    KnowledgeGap,
    PeriodicReview,
}

impl EvolutionTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionTrigger::ProjectCompletion => "project_completion",
            EvolutionTrigger::PerformanceDecline => "performance_decline",
            EvolutionTrigger::ErrorPattern => "error_pattern",
            EvolutionTrigger::FeedbackNegative => "feedback_negative",
            EvolutionTrigger::KnowledgeGap => "knowledge_gap",
            EvolutionTrigger::PeriodicReview => "periodic_review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionAction {
    PromptOptimization,
    KnowledgeUpdate,
    StrategyAdjustment,
    SkillEnhancement,
    BehaviorCorrection,
    CollaborationImprovement,
}

impl EvolutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionAction::PromptOptimization => "prompt_optimization",
            EvolutionAction::KnowledgeUpdate => "knowledge_update",
            EvolutionAction::StrategyAdjustment => "strategy_adjustment",
            EvolutionAction::SkillEnhancement => "skill_enhancement",
            EvolutionAction::BehaviorCorrection => "behavior_correction",
            EvolutionAction::CollaborationImprovement => "collaboration_improvement",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetric {
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub context: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionInsight {
    pub insight_type: String,
    pub description: String,
    /// Each entry carries a `type` key naming what it measured
    pub evidence: Vec<Value>,
    pub confidence: f64,
    pub action_recommendations: Vec<String>,
}

impl EvolutionInsight {
    fn has_evidence(&self, kind: &str) -> bool {
        self.evidence
            .iter()
            .any(|e| e.get("type").and_then(Value::as_str) == Some(kind))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionPlan {
    pub agent_id: String,
    pub trigger: EvolutionTrigger,
    pub insights: Vec<EvolutionInsight>,
    pub actions: Vec<EvolutionAction>,
    /// Relative change expected per metric; negative means lower is the goal
    pub expected_improvements: BTreeMap<String, f64>,
    pub implementation_timeline: BTreeMap<String, DateTime<Utc>>,
    pub success_criteria: BTreeMap<String, f64>,
}

impl EvolutionPlan {
    pub fn plan_id(&self) -> String {
        format!("{}_{}", self.agent_id, self.trigger.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedEvolution {
    pub plan_id: String,
    pub trigger: EvolutionTrigger,
    pub actions: Vec<EvolutionAction>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriterionCheck {
    pub target: f64,
    pub current: f64,
    pub improvement: f64,
    pub met: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanValidation {
    pub agent_id: String,
    pub plan_id: String,
    pub metrics_comparison: BTreeMap<String, CriterionCheck>,
    pub success_rate: f64,
    pub recommendations: Vec<String>,
}

/// Watches agent performance and turns retrospectives into evolution plans
#[derive(Debug, Default)]
pub struct AgentEvolutionEngine {
    performance: HashMap<String, Vec<PerformanceMetric>>,
    active: HashMap<String, EvolutionPlan>,
    completed: HashMap<String, Vec<CompletedEvolution>>,
    retrospectives: HashMap<String, BTreeMap<String, EvolutionInsight>>,
    triggers: Vec<(String, EvolutionTrigger, DateTime<Utc>)>,
}

impl AgentEvolutionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample and reports a performance decline when the last
    /// five samples of the metric fell more than 15% against the five before
    pub fn record_performance(
        &mut self,
        agent_id: &str,
        metric_name: &str,
        value: f64,
        context: Value,
    ) -> Option<EvolutionTrigger> {
        self.record_performance_at(agent_id, metric_name, value, context, Utc::now())
    }

    fn record_performance_at(
        &mut self,
        agent_id: &str,
        metric_name: &str,
        value: f64,
        context: Value,
        now: DateTime<Utc>,
    ) -> Option<EvolutionTrigger> {
        let history = self.performance.entry(agent_id.to_string()).or_default();
        history.push(PerformanceMetric {
            metric_name: metric_name.to_string(),
            value,
            timestamp: now,
            context: if context.is_null() { json!({}) } else { context },
        });
        if history.len() > HISTORY_CAP {
            history.drain(..history.len() - HISTORY_KEEP);
        }
        debug!(agent_id, metric = metric_name, value, "Recorded performance");

        let series: Vec<f64> = history
            .iter()
            .filter(|m| m.metric_name == metric_name)
            .map(|m| m.value)
            .collect();
        if series.len() < DECLINE_WINDOW * 2 {
            return None;
        }

        let recent = mean(&series[series.len() - DECLINE_WINDOW..]);
        let previous = mean(&series[series.len() - DECLINE_WINDOW * 2..series.len() - DECLINE_WINDOW]);
        if previous == 0.0 {
            return None;
        }

        let higher_is_better = definition(metric_name).map_or(true, |d| d.higher_is_better);
        let mut drop = (previous - recent) / previous.abs();
        if !higher_is_better {
            drop = -drop;
        }

        if drop > DECLINE_THRESHOLD {
            warn!(agent_id, metric = metric_name, drop, "Performance decline detected");
            self.triggers
                .push((agent_id.to_string(), EvolutionTrigger::PerformanceDecline, now));
            Some(EvolutionTrigger::PerformanceDecline)
        } else {
            None
        }
    }

    /// Analyses a finished sprint and runs evolution plans for team members
    /// whose insights are confident enough
    ///
    /// `sprint_data` keys read: `team_members`, `communication_stats`,
    /// `decision_conflicts`, `task_handoff_delays`, `architecture_decisions`,
    /// `technical_debt`, `code_quality`, `collaboration_scores`.
    pub fn conduct_retrospective(
        &mut self,
        project_id: &str,
        sprint_data: &Value,
    ) -> BTreeMap<String, EvolutionInsight> {
        info!(project_id, "Starting retrospective");
        let now = Utc::now();
        let mut insights = BTreeMap::new();

        let members: Vec<String> = sprint_data
            .get("team_members")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        for agent_id in &members {
            insights.insert(agent_id.clone(), self.analyze_member(agent_id, sprint_data, now));
        }
        insights.insert("team_collaboration".to_string(), analyze_collaboration(sprint_data));
        insights.insert("technical_decisions".to_string(), analyze_technical(sprint_data));

        for agent_id in &members {
            let Some(insight) = insights.get(agent_id) else {
                continue;
            };
            if let Some(plan) =
                self.generate_plan(agent_id, EvolutionTrigger::ProjectCompletion, vec![insight.clone()])
            {
                self.execute_plan(plan);
            }
        }

        self.retrospectives.insert(project_id.to_string(), insights.clone());
        info!(project_id, insights = insights.len(), "Retrospective complete");
        insights
    }

    /// Builds a plan from insights at or above 0.7 confidence; `None` when
    /// there are none
    pub fn generate_plan(
        &self,
        agent_id: &str,
        trigger: EvolutionTrigger,
        insights: Vec<EvolutionInsight>,
    ) -> Option<EvolutionPlan> {
        let confident: Vec<EvolutionInsight> = insights
            .into_iter()
            .filter(|i| i.confidence >= CONFIDENCE_THRESHOLD)
            .collect();
        if confident.is_empty() {
            warn!(agent_id, "No confident insights, skipping evolution");
            return None;
        }

        let mut actions = Vec::new();
        let mut expected = BTreeMap::new();
        let mut add = |action: EvolutionAction, metric: &str, change: f64| {
            if !actions.contains(&action) {
                actions.push(action);
            }
            expected.insert(metric.to_string(), change);
        };

        for insight in &confident {
            if insight.has_evidence("response_time") {
                add(EvolutionAction::PromptOptimization, "response_time", -0.2);
            }
            if insight.has_evidence("error_patterns") {
                add(EvolutionAction::BehaviorCorrection, "error_rate", -0.3);
            }
            if insight.insight_type.contains("collaboration") || insight.has_evidence("collaboration") {
                add(EvolutionAction::CollaborationImprovement, "collaboration_score", 0.15);
            }
            if insight.has_evidence("knowledge_gap") {
                add(EvolutionAction::KnowledgeUpdate, "task_accuracy", 0.1);
            }
        }

        let now = Utc::now();
        let implementation_timeline = actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.as_str().to_string(), now + Duration::days(i as i64 + 1)))
            .collect();

        let success_criteria = expected
            .iter()
            .filter_map(|(metric, change)| {
                self.current_value(agent_id, metric)
                    .map(|current| (metric.clone(), current * (1.0 + change)))
            })
            .collect();

        info!(agent_id, actions = actions.len(), "Generated evolution plan");
        Some(EvolutionPlan {
            agent_id: agent_id.to_string(),
            trigger,
            insights: confident,
            actions,
            expected_improvements: expected,
            implementation_timeline,
            success_criteria,
        })
    }

    /// Applies every action of the plan and records its completion
    pub fn execute_plan(&mut self, plan: EvolutionPlan) -> CompletedEvolution {
        let agent_id = plan.agent_id.clone();
        info!(agent_id = %agent_id, plan_id = %plan.plan_id(), "Executing evolution plan");

        for action in &plan.actions {
            debug!(agent_id = %agent_id, action = action.as_str(), "Applied evolution action");
        }

        let record = CompletedEvolution {
            plan_id: plan.plan_id(),
            trigger: plan.trigger,
            actions: plan.actions.clone(),
            completed_at: Utc::now(),
        };
        self.active.remove(&agent_id);
        self.completed.entry(agent_id).or_default().push(record.clone());
        record
    }

    /// Keeps a plan registered as in progress until it is executed
    pub fn start_plan(&mut self, plan: EvolutionPlan) {
        self.active.insert(plan.agent_id.clone(), plan);
    }

    /// Compares current metric values with the plan's success criteria
    pub fn validate_plan(&self, agent_id: &str, plan: &EvolutionPlan) -> PlanValidation {
        let mut comparison = BTreeMap::new();
        let mut met = 0usize;

        for (metric, target) in &plan.success_criteria {
            let Some(current) = self.current_value(agent_id, metric) else {
                continue;
            };
            let lower_is_goal = plan.expected_improvements.get(metric).is_some_and(|c| *c < 0.0);
            let is_met = if lower_is_goal { current <= *target } else { current >= *target };
            let improvement = if *target != 0.0 { (current - target) / target } else { 0.0 };
            if is_met {
                met += 1;
            }
            comparison.insert(
                metric.clone(),
                CriterionCheck {
                    target: *target,
                    current,
                    improvement,
                    met: is_met,
                },
            );
        }

        let total = plan.success_criteria.len();
        let success_rate = if total > 0 { met as f64 / total as f64 } else { 0.0 };

        let mut recommendations = Vec::new();
        if success_rate < 0.7 {
            recommendations.push("Adjust the evolution strategy or extend the validation period".to_string());
        }
        if success_rate >= 0.8 {
            recommendations.push("Evolution worked well; consider similar optimisations".to_string());
        }

        info!(agent_id, success_rate, "Validated evolution plan");
        PlanValidation {
            agent_id: agent_id.to_string(),
            plan_id: plan.plan_id(),
            metrics_comparison: comparison,
            success_rate,
            recommendations,
        }
    }

    pub fn status(&self, agent_id: Option<&str>) -> Value {
        match agent_id {
            Some(agent) => json!({
                "agent_id": agent,
                "active_evolution": self.active.get(agent),
                "performance_history_count": self.performance.get(agent).map_or(0, Vec::len),
                "last_evolution": self.completed.get(agent).and_then(|c| c.last()),
            }),
            None => json!({
                "total_agents_monitored": self.performance.len(),
                "active_evolutions": self.active.len(),
                "completed_evolutions": self.completed.values().map(Vec::len).sum::<usize>(),
                "triggers_fired": self.triggers.len(),
                "retrospectives": self.retrospectives.len(),
                "evolution_config": {
                    "performance_window_days": PERFORMANCE_WINDOW_DAYS,
                    "decline_threshold": DECLINE_THRESHOLD,
                    "confidence_threshold": CONFIDENCE_THRESHOLD,
                },
            }),
        }
    }

    fn current_value(&self, agent_id: &str, metric: &str) -> Option<f64> {
        self.performance
            .get(agent_id)?
            .iter()
            .rev()
            .find(|m| m.metric_name == metric)
            .map(|m| m.value)
    }

    fn analyze_member(&self, agent_id: &str, sprint_data: &Value, now: DateTime<Utc>) -> EvolutionInsight {
        let cutoff = now - Duration::days(PERFORMANCE_WINDOW_DAYS);
        let recent: Vec<&PerformanceMetric> = self
            .performance
            .get(agent_id)
            .map(|h| h.iter().filter(|m| m.timestamp > cutoff).collect())
            .unwrap_or_default();

        let mut evidence = Vec::new();
        let mut recommendations = Vec::new();

        let quality: Vec<f64> = recent
            .iter()
            .filter(|m| m.metric_name == "quality_score")
            .map(|m| m.value)
            .collect();
        evidence.push(json!({
            "type": "task_quality",
            "average": if quality.is_empty() { Value::Null } else { json!(mean(&quality)) },
            "samples": quality.len(),
        }));

        let response_times: Vec<f64> = recent
            .iter()
            .filter(|m| m.metric_name == "response_time")
            .map(|m| m.value)
            .collect();
        if !response_times.is_empty() {
            let average = mean(&response_times);
            evidence.push(json!({
                "type": "response_time",
                "average": average,
                "trend": trend_score(&response_times),
            }));
            if average > SLOW_RESPONSE_SECS {
                recommendations.push("Optimise response speed, consider parallel processing".to_string());
            }
        }

        let patterns = error_patterns(&recent);
        if !patterns.is_empty() {
            for pattern in &patterns {
                if let Some(kind) = pattern.get("type").and_then(Value::as_str) {
                    recommendations.push(format!("Improve handling of {kind} errors"));
                }
            }
            evidence.push(json!({"type": "error_patterns", "patterns": patterns}));
        }

        let collaboration = sprint_data
            .pointer(&format!("/collaboration_scores/{agent_id}"))
            .and_then(Value::as_f64)
            .unwrap_or(0.5);
        evidence.push(json!({"type": "collaboration", "score": collaboration}));

        let confidence = (evidence.len() as f64 * 0.2 + recent.len() as f64 * 0.01).min(1.0);
        EvolutionInsight {
            insight_type: "agent_performance".to_string(),
            description: format!("Project performance of agent {agent_id}"),
            evidence,
            confidence,
            action_recommendations: recommendations,
        }
    }
}

/// Error kinds seen at least twice in the metrics' `error_type` context
fn error_patterns(recent: &[&PerformanceMetric]) -> Vec<Value> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for metric in recent {
        if let Some(kind) = metric.context.get("error_type").and_then(Value::as_str) {
            *counts.entry(kind).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count >= 2)
        .map(|(kind, count)| json!({"type": kind, "count": count}))
        .collect()
}

fn analyze_collaboration(sprint_data: &Value) -> EvolutionInsight {
    let mut evidence = Vec::new();
    let mut recommendations = Vec::new();

    if let Some(stats) = sprint_data.get("communication_stats").filter(|s| !is_empty(s)) {
        evidence.push(json!({"type": "communication_volume", "stats": stats}));

        let counts: Vec<f64> = stats
            .get("agent_message_counts")
            .and_then(Value::as_object)
            .map(|m| m.values().filter_map(Value::as_f64).collect())
            .unwrap_or_default();
        if let (Some(max), Some(min)) = (
            counts.iter().copied().reduce(f64::max),
            counts.iter().copied().reduce(f64::min),
        ) {
            if max > 3.0 * min {
                recommendations.push("Balance communication so no single agent carries the team".to_string());
            }
        }
    }

    if let Some(conflicts) = sprint_data
        .get("decision_conflicts")
        .and_then(Value::as_array)
        .filter(|c| !c.is_empty())
    {
        let mut patterns: BTreeMap<String, usize> = BTreeMap::new();
        for conflict in conflicts {
            let kind = conflict.get("type").and_then(Value::as_str).unwrap_or("unknown");
            *patterns.entry(kind.to_string()).or_default() += 1;
        }
        evidence.push(json!({
            "type": "decision_conflicts",
            "count": conflicts.len(),
            "patterns": patterns,
        }));
        if conflicts.len() > 3 {
            recommendations.push("Streamline decision making to avoid needless conflicts".to_string());
        }
    }

    let delays: Vec<f64> = sprint_data
        .get("task_handoff_delays")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();
    if !delays.is_empty() {
        let average = mean(&delays);
        evidence.push(json!({
            "type": "handoff_efficiency",
            "average_delay": average,
            "total_delays": delays.len(),
        }));
        if average > HANDOFF_DELAY_HOURS {
            recommendations.push("Speed up task handoffs and context transfer".to_string());
        }
    }

    EvolutionInsight {
        insight_type: "team_collaboration".to_string(),
        description: "Team collaboration patterns".to_string(),
        confidence: (evidence.len() as f64 * 0.3).min(1.0),
        evidence,
        action_recommendations: recommendations,
    }
}

fn analyze_technical(sprint_data: &Value) -> EvolutionInsight {
    let mut evidence = Vec::new();
    let mut recommendations = Vec::new();

    for decision in sprint_data
        .get("architecture_decisions")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let summary = decision.get("summary").and_then(Value::as_str).unwrap_or("");
        let impact = decision.get("impact_score").and_then(Value::as_f64).unwrap_or(0.7);
        evidence.push(json!({
            "type": "architecture_decision",
            "decision": summary,
            "impact_score": impact,
        }));
        if impact < 0.6 {
            let short: String = summary.chars().take(50).collect();
            recommendations.push(format!("Revisit decision: {short}"));
        }
    }

    if let Some(debt) = sprint_data
        .get("technical_debt")
        .and_then(Value::as_array)
        .filter(|d| !d.is_empty())
    {
        let score: f64 = debt
            .iter()
            .map(|item| item.get("severity").and_then(Value::as_f64).unwrap_or(1.0))
            .sum();
        evidence.push(json!({"type": "technical_debt", "total_score": score, "items": debt.len()}));
        if score > TECH_DEBT_LIMIT {
            recommendations.push("Plan a technical debt cleanup".to_string());
        }
    }

    if let Some(quality) = sprint_data.get("code_quality").filter(|q| !is_empty(q)) {
        evidence.push(json!({"type": "code_quality", "metrics": quality}));
        let coverage = quality.get("test_coverage").and_then(Value::as_f64).unwrap_or(0.0);
        if coverage < COVERAGE_TARGET {
            recommendations.push("Raise test coverage".to_string());
        }
    }

    EvolutionInsight {
        insight_type: "technical_decisions".to_string(),
        description: "Quality of technical decisions".to_string(),
        confidence: (evidence.len() as f64 * 0.25).min(1.0),
        evidence,
        action_recommendations: recommendations,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(m) => m.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insight(kind: &str, evidence: Vec<Value>, confidence: f64) -> EvolutionInsight {
        EvolutionInsight {
            insight_type: kind.to_string(),
            description: String::new(),
            evidence,
            confidence,
            action_recommendations: vec![],
        }
    }

    #[test]
    fn decline_trigger_fires_after_drop() {
        let mut engine = AgentEvolutionEngine::new();
        for _ in 0..5 {
            assert_eq!(engine.record_performance("dev-001", "quality_score", 0.9, Value::Null), None);
        }
        for _ in 0..4 {
            engine.record_performance("dev-001", "quality_score", 0.7, Value::Null);
        }
        let trigger = engine.record_performance("dev-001", "quality_score", 0.7, Value::Null);
        assert_eq!(trigger, Some(EvolutionTrigger::PerformanceDecline));
    }

    #[test]
    fn slower_responses_count_as_decline() {
        let mut engine = AgentEvolutionEngine::new();
        for _ in 0..5 {
            engine.record_performance("dev-001", "response_time", 2.0, Value::Null);
        }
        let mut last = None;
        for _ in 0..5 {
            last = engine.record_performance("dev-001", "response_time", 3.0, Value::Null);
        }
        assert_eq!(last, Some(EvolutionTrigger::PerformanceDecline));
    }

    #[test]
    fn small_dip_is_not_a_decline() {
        let mut engine = AgentEvolutionEngine::new();
        let mut last = None;
        for v in [0.9, 0.9, 0.9, 0.9, 0.9, 0.85, 0.85, 0.85, 0.85, 0.85] {
            last = engine.record_performance("dev-001", "quality_score", v, Value::Null);
        }
        assert_eq!(last, None);
    }

    #[test]
    fn low_confidence_insights_produce_no_plan() {
        let engine = AgentEvolutionEngine::new();
        let plan = engine.generate_plan(
            "dev-001",
            EvolutionTrigger::PeriodicReview,
            vec![insight("agent_performance", vec![json!({"type": "response_time"})], 0.4)],
        );
        assert!(plan.is_none());
    }

    #[test]
    fn plan_actions_follow_evidence() {
        let mut engine = AgentEvolutionEngine::new();
        engine.record_performance("dev-001", "response_time", 10.0, Value::Null);

        let plan = engine
            .generate_plan(
                "dev-001",
                EvolutionTrigger::PeriodicReview,
                vec![
                    insight(
                        "agent_performance",
                        vec![json!({"type": "response_time"}), json!({"type": "error_patterns"})],
                        0.9,
                    ),
                    insight("team_collaboration", vec![], 0.8),
                ],
            )
            .unwrap();

        assert_eq!(
            plan.actions,
            vec![
                EvolutionAction::PromptOptimization,
                EvolutionAction::BehaviorCorrection,
                EvolutionAction::CollaborationImprovement,
            ]
        );
        assert_eq!(plan.implementation_timeline.len(), 3);
        assert!((plan.success_criteria["response_time"] - 8.0).abs() < 1e-9);
        assert!(!plan.success_criteria.contains_key("error_rate"));
    }

    #[test]
    fn validation_measures_criteria() {
        let mut engine = AgentEvolutionEngine::new();
        engine.record_performance("dev-001", "response_time", 10.0, Value::Null);
        let plan = engine
            .generate_plan(
                "dev-001",
                EvolutionTrigger::PerformanceDecline,
                vec![insight("agent_performance", vec![json!({"type": "response_time"})], 0.9)],
            )
            .unwrap();

        let before = engine.validate_plan("dev-001", &plan);
        assert_eq!(before.success_rate, 0.0);
        assert_eq!(before.recommendations.len(), 1);

        engine.record_performance("dev-001", "response_time", 7.5, Value::Null);
        let after = engine.validate_plan("dev-001", &plan);
        assert_eq!(after.success_rate, 1.0);
        assert!(after.metrics_comparison["response_time"].met);
        assert_eq!(after.plan_id, "dev-001_performance_decline");
    }

    #[test]
    fn retrospective_flags_team_issues() {
        let mut engine = AgentEvolutionEngine::new();
        let sprint = json!({
            "team_members": ["dev-001"],
            "communication_stats": {"agent_message_counts": {"pm-001": 40, "dev-001": 5}},
            "decision_conflicts": [{"type": "priority"}, {"type": "priority"}, {"type": "technical"}, {"type": "scope"}],
            "task_handoff_delays": [1.0, 4.0],
            "technical_debt": [{"severity": 6}, {"severity": 6}],
            "code_quality": {"test_coverage": 0.6},
        });

        let insights = engine.conduct_retrospective("proj-1", &sprint);
        assert!(insights.contains_key("dev-001"));

        let team = &insights["team_collaboration"];
        assert_eq!(team.action_recommendations.len(), 3);
        assert!((team.confidence - 0.9).abs() < 1e-9);

        let tech = &insights["technical_decisions"];
        assert_eq!(tech.action_recommendations.len(), 2);

        assert_eq!(engine.status(None)["retrospectives"], 1);
    }

    #[test]
    fn execute_plan_records_completion() {
        let mut engine = AgentEvolutionEngine::new();
        let plan = engine
            .generate_plan(
                "qa-001",
                EvolutionTrigger::KnowledgeGap,
                vec![insight("agent_performance", vec![json!({"type": "knowledge_gap"})], 0.8)],
            )
            .unwrap();
        engine.start_plan(plan.clone());
        assert_eq!(engine.status(None)["active_evolutions"], 1);

        let record = engine.execute_plan(plan);
        assert_eq!(record.actions, vec![EvolutionAction::KnowledgeUpdate]);
        assert_eq!(engine.status(None)["active_evolutions"], 0);
        assert_eq!(engine.status(Some("qa-001"))["last_evolution"]["plan_id"], "qa-001_knowledge_gap");
    }
}
