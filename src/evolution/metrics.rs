use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::EvolutionError;

/// History kept per agent and metric before trimming
const HISTORY_CAP: usize = 1000;
const HISTORY_KEEP: usize = 800;
const MIN_TREND_POINTS: usize = 5;
const IMPROVEMENT_THRESHOLD: f64 = 0.05;
const VOLATILITY_THRESHOLD: f64 = 0.2;
const LOW_SCORE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricCategory {
    Performance,
    Learning,
    Collaboration,
    Adaptation,
    Innovation,
    Efficiency,
}

impl MetricCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricCategory::Performance => "performance",
            MetricCategory::Learning => "learning",
            MetricCategory::Collaboration => "collaboration",
            MetricCategory::Adaptation => "adaptation",
            MetricCategory::Innovation => "innovation",
            MetricCategory::Efficiency => "efficiency",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricTrend {
    Improving,
    Stable,
    Declining,
    Volatile,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub category: MetricCategory,
    pub weight: f64,
    pub higher_is_better: bool,
    /// Number of earliest samples averaged into the baseline
    pub baseline_periods: usize,
}

const fn def(
    name: &'static str,
    category: MetricCategory,
    weight: f64,
    higher_is_better: bool,
    baseline_periods: usize,
) -> MetricDefinition {
    MetricDefinition {
        name,
        category,
        weight,
        higher_is_better,
        baseline_periods,
    }
}

pub const METRIC_DEFINITIONS: [MetricDefinition; 12] = [
    def("task_completion_rate", MetricCategory::Performance, 0.25, true, 5),
    def("response_time", MetricCategory::Performance, 0.15, false, 5),
    def("quality_score", MetricCategory::Performance, 0.2, true, 5),
    def("knowledge_acquisition_rate", MetricCategory::Learning, 0.15, true, 3),
    def("pattern_recognition_accuracy", MetricCategory::Learning, 0.1, true, 3),
    def("error_correction_speed", MetricCategory::Learning, 0.1, true, 3),
    def("collaboration_effectiveness", MetricCategory::Collaboration, 0.1, true, 3),
    def("communication_clarity", MetricCategory::Collaboration, 0.05, true, 3),
    def("context_adaptation_speed", MetricCategory::Adaptation, 0.08, true, 3),
    def("new_domain_learning", MetricCategory::Adaptation, 0.07, true, 3),
    def("solution_creativity", MetricCategory::Innovation, 0.05, true, 5),
    def("resource_utilization", MetricCategory::Efficiency, 0.1, true, 3),
];

pub fn definition(name: &str) -> Option<&'static MetricDefinition> {
    METRIC_DEFINITIONS.iter().find(|d| d.name == name)
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionMetric {
    pub name: String,
    pub category: MetricCategory,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub context: Value,
    pub agent_id: String,
    pub project_id: Option<String>,
    pub baseline_value: Option<f64>,
    /// Relative change against the baseline, positive when the agent got better
    pub improvement_rate: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionReport {
    pub agent_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub overall_score: f64,
    pub metric_scores: BTreeMap<String, f64>,
    pub trend_analysis: BTreeMap<String, MetricTrend>,
    pub key_improvements: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub recommendations: Vec<String>,
    pub comparison_with_peers: BTreeMap<String, f64>,
}

/// Tracks per-agent metrics and scores how agents evolve over time
#[derive(Debug, Default)]
pub struct EvolutionMetricsEngine {
    history: HashMap<String, BTreeMap<String, Vec<EvolutionMetric>>>,
    baselines: HashMap<String, HashMap<String, f64>>,
}

impl EvolutionMetricsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_metric(
        &mut self,
        agent_id: &str,
        metric_name: &str,
        value: f64,
        context: Value,
        project_id: Option<&str>,
    ) -> Result<&EvolutionMetric, EvolutionError> {
        self.record_metric_at(agent_id, metric_name, value, context, project_id, Utc::now())
    }

    pub(crate) fn record_metric_at(
        &mut self,
        agent_id: &str,
        metric_name: &str,
        value: f64,
        context: Value,
        project_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<&EvolutionMetric, EvolutionError> {
        let Some(def) = definition(metric_name) else {
            warn!(agent_id, metric = metric_name, "Rejected unknown metric");
            return Err(EvolutionError::UnknownMetric(metric_name.to_string()));
        };

        let baseline_value = self
            .baselines
            .get(agent_id)
            .and_then(|b| b.get(metric_name))
            .copied();

        let mut improvement_rate = match baseline_value {
            Some(baseline) if baseline != 0.0 => (value - baseline) / baseline.abs(),
            _ => 0.0,
        };
        if !def.higher_is_better {
            improvement_rate = -improvement_rate;
        }

        let series = self
            .history
            .entry(agent_id.to_string())
            .or_default()
            .entry(metric_name.to_string())
            .or_default();

        let confidence = confidence_from(series);
        series.push(EvolutionMetric {
            name: metric_name.to_string(),
            category: def.category,
            value,
            timestamp: now,
            context: if context.is_null() { json!({}) } else { context },
            agent_id: agent_id.to_string(),
            project_id: project_id.map(str::to_string),
            baseline_value,
            improvement_rate,
            confidence,
        });

        if series.len() > HISTORY_CAP {
            series.drain(..series.len() - HISTORY_KEEP);
        }

        if series.len() >= def.baseline_periods {
            let first: Vec<f64> = series[..def.baseline_periods].iter().map(|m| m.value).collect();
            self.baselines
                .entry(agent_id.to_string())
                .or_default()
                .insert(metric_name.to_string(), mean(&first));
        }

        debug!(agent_id, metric = metric_name, value, "Recorded metric");
        series
            .last()
            .ok_or_else(|| EvolutionError::UnknownMetric(metric_name.to_string()))
    }

    pub fn baseline(&self, agent_id: &str, metric_name: &str) -> Option<f64> {
        self.baselines.get(agent_id)?.get(metric_name).copied()
    }

    /// Latest recorded value of a metric
    pub fn current_value(&self, agent_id: &str, metric_name: &str) -> Option<f64> {
        self.history
            .get(agent_id)?
            .get(metric_name)?
            .last()
            .map(|m| m.value)
    }

    pub fn history(&self, agent_id: &str, metric_name: &str) -> &[EvolutionMetric] {
        self.history
            .get(agent_id)
            .and_then(|m| m.get(metric_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn agents(&self) -> Vec<&str> {
        let mut agents: Vec<&str> = self.history.keys().map(String::as_str).collect();
        agents.sort_unstable();
        agents
    }

    pub fn evaluate_agent(&self, agent_id: &str, period_days: i64, now: DateTime<Utc>) -> EvolutionReport {
        let start = now - Duration::days(period_days);
        let period = self.metrics_in_period(agent_id, start, now);

        if period.is_empty() {
            warn!(agent_id, "Not enough metric history to evaluate agent");
            return EvolutionReport {
                agent_id: agent_id.to_string(),
                period_start: start,
                period_end: now,
                overall_score: 0.0,
                metric_scores: BTreeMap::new(),
                trend_analysis: BTreeMap::new(),
                key_improvements: Vec::new(),
                areas_for_improvement: vec!["Not enough history to evaluate".to_string()],
                recommendations: vec!["Collect more data to establish a performance baseline".to_string()],
                comparison_with_peers: BTreeMap::new(),
            };
        }

        let metric_scores = score_metrics(&period);
        let overall_score = overall_score(&metric_scores);
        let trend_analysis: BTreeMap<String, MetricTrend> = period
            .iter()
            .map(|(name, metrics)| (name.clone(), classify_trend(&values(metrics))))
            .collect();

        let key_improvements = period
            .iter()
            .filter_map(|(name, metrics)| {
                let avg = mean(&metrics.iter().map(|m| m.improvement_rate).collect::<Vec<_>>());
                (avg > 0.1).then(|| format!("{name} improved by {:.1}%", avg * 100.0))
            })
            .collect();

        let mut areas = Vec::new();
        for (name, trend) in &trend_analysis {
            match trend {
                MetricTrend::Declining => areas.push(format!("{name} is declining")),
                MetricTrend::Volatile => areas.push(format!("{name} is volatile and needs stabilising")),
                _ => {}
            }
        }
        for (name, metrics) in &period {
            if mean(&values(metrics)) < 0.5 {
                areas.push(format!("{name} average is low"));
            }
        }

        let recommendations = recommendations(&metric_scores, &trend_analysis);
        let comparison_with_peers = self.compare_with_peers(agent_id, &metric_scores, start, now);

        info!(agent_id, overall_score, "Evaluated agent evolution");

        EvolutionReport {
            agent_id: agent_id.to_string(),
            period_start: start,
            period_end: now,
            overall_score,
            metric_scores,
            trend_analysis,
            key_improvements,
            areas_for_improvement: areas,
            recommendations,
            comparison_with_peers,
        }
    }

    /// Team-wide view: per-agent overall scores, averages and top performers
    pub fn team_summary(&self, now: DateTime<Utc>) -> Value {
        let reports: Vec<EvolutionReport> = self
            .agents()
            .into_iter()
            .map(|agent| self.evaluate_agent(agent, 30, now))
            .collect();

        let mut agent_summaries = serde_json::Map::new();
        for report in &reports {
            agent_summaries.insert(
                report.agent_id.clone(),
                json!({
                    "overall_score": report.overall_score,
                    "key_improvements": report.key_improvements,
                    "areas_for_improvement": report.areas_for_improvement,
                }),
            );
        }

        let mut team_averages = BTreeMap::new();
        let mut top_performers = serde_json::Map::new();
        if !reports.is_empty() {
            let overall: Vec<f64> = reports.iter().map(|r| r.overall_score).collect();
            team_averages.insert("overall_score".to_string(), mean(&overall));

            let mut names: Vec<&String> = reports.iter().flat_map(|r| r.metric_scores.keys()).collect();
            names.sort();
            names.dedup();

            for name in names {
                let scored: Vec<(&str, f64)> = reports
                    .iter()
                    .filter_map(|r| r.metric_scores.get(name).map(|s| (r.agent_id.as_str(), *s)))
                    .collect();
                let scores: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
                team_averages.insert(name.clone(), mean(&scores));

                if let Some((agent, score)) = scored
                    .iter()
                    .fold(None::<(&str, f64)>, |best, &(a, s)| match best {
                        Some((_, b)) if b >= s => best,
                        _ => Some((a, s)),
                    })
                {
                    top_performers.insert(name.clone(), json!({"agent_id": agent, "score": score}));
                }
            }
        }

        json!({
            "total_agents": reports.len(),
            "evaluation_timestamp": now.to_rfc3339(),
            "agent_summaries": agent_summaries,
            "team_averages": team_averages,
            "top_performers": top_performers,
        })
    }

    fn metrics_in_period(
        &self,
        agent_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BTreeMap<String, Vec<&EvolutionMetric>> {
        let Some(metrics) = self.history.get(agent_id) else {
            return BTreeMap::new();
        };

        metrics
            .iter()
            .filter_map(|(name, series)| {
                let within: Vec<&EvolutionMetric> = series
                    .iter()
                    .filter(|m| m.timestamp >= start && m.timestamp <= end)
                    .collect();
                (!within.is_empty()).then(|| (name.clone(), within))
            })
            .collect()
    }

    fn compare_with_peers(
        &self,
        agent_id: &str,
        metric_scores: &BTreeMap<String, f64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BTreeMap<String, f64> {
        let peer_scores: Vec<BTreeMap<String, f64>> = self
            .history
            .keys()
            .filter(|peer| peer.as_str() != agent_id)
            .map(|peer| score_metrics(&self.metrics_in_period(peer, start, end)))
            .collect();

        metric_scores
            .iter()
            .map(|(name, score)| {
                let peers: Vec<f64> = peer_scores.iter().filter_map(|s| s.get(name).copied()).collect();
                let delta = if peers.is_empty() { 0.0 } else { score - mean(&peers) };
                (name.clone(), delta)
            })
            .collect()
    }
}

fn values(metrics: &[&EvolutionMetric]) -> Vec<f64> {
    metrics.iter().map(|m| m.value).collect()
}

fn score_metrics(period: &BTreeMap<String, Vec<&EvolutionMetric>>) -> BTreeMap<String, f64> {
    period
        .iter()
        .map(|(name, metrics)| {
            let series = values(metrics);
            let improvement = mean(&metrics.iter().map(|m| m.improvement_rate).collect::<Vec<_>>());
            let score = 0.5
                + improvement.clamp(-0.3, 0.3)
                + trend_score(&series) * 0.1
                + stability_score(&series) * 0.1;
            (name.clone(), score.clamp(0.0, 1.0))
        })
        .collect()
}

fn overall_score(metric_scores: &BTreeMap<String, f64>) -> f64 {
    let (weighted, total) = metric_scores.iter().fold((0.0, 0.0), |(sum, total), (name, score)| {
        let weight = definition(name).map(|d| d.weight).unwrap_or(0.1);
        (sum + score * weight, total + weight)
    });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

fn classify_trend(series: &[f64]) -> MetricTrend {
    if series.len() < MIN_TREND_POINTS {
        return MetricTrend::Stable;
    }
    let trend = trend_score(series);
    if volatility(series) > VOLATILITY_THRESHOLD {
        MetricTrend::Volatile
    } else if trend > IMPROVEMENT_THRESHOLD {
        MetricTrend::Improving
    } else if trend < -IMPROVEMENT_THRESHOLD {
        MetricTrend::Declining
    } else {
        MetricTrend::Stable
    }
}

fn recommendations(
    metric_scores: &BTreeMap<String, f64>,
    trends: &BTreeMap<String, MetricTrend>,
) -> Vec<String> {
    let mut out = Vec::new();

    let declining: Vec<&str> = trends
        .iter()
        .filter(|(_, t)| **t == MetricTrend::Declining)
        .map(|(n, _)| n.as_str())
        .collect();
    if !declining.is_empty() {
        out.push(format!("Focus on reversing declining metrics: {}", declining.join(", ")));
    }

    let low: Vec<&str> = metric_scores
        .iter()
        .filter(|(_, s)| **s < LOW_SCORE)
        .map(|(n, _)| n.as_str())
        .collect();
    if !low.is_empty() {
        out.push(format!("Prioritise low-scoring metrics: {}", low.join(", ")));
    }

    let mut by_category: BTreeMap<MetricCategory, Vec<f64>> = BTreeMap::new();
    for (name, score) in metric_scores {
        if let Some(def) = definition(name) {
            by_category.entry(def.category).or_default().push(*score);
        }
    }
    for (category, scores) in by_category {
        if mean(&scores) < LOW_SCORE {
            out.push(format!("Strengthen overall {} capability", category.as_str()));
        }
    }

    out
}

fn confidence_from(series: &[EvolutionMetric]) -> f64 {
    if series.len() < 3 {
        return 0.5;
    }
    let recent: Vec<f64> = series[series.len().saturating_sub(10)..].iter().map(|m| m.value).collect();
    let avg = mean(&recent);
    if avg == 0.0 {
        return 0.5;
    }
    (1.0 - std_dev(&recent) / avg.abs()).clamp(0.1, 0.95)
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Sample standard deviation
fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let var = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Least-squares slope squashed into -1..=1
pub(crate) fn trend_score(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = mean(values);

    let (num, den) = values.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });
    if den == 0.0 {
        return 0.0;
    }

    let slope = num / den;
    (slope / slope.abs().max(1e-6)).clamp(-1.0, 1.0)
}

fn stability_score(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 1.0;
    }
    let avg = mean(values);
    if avg == 0.0 {
        return 0.5;
    }
    (1.0 - std_dev(values) / avg.abs()).clamp(0.0, 1.0)
}

fn volatility(values: &[f64]) -> f64 {
    let avg = mean(values);
    if values.len() < 2 || avg == 0.0 {
        return 0.0;
    }
    std_dev(values) / avg.abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(engine: &mut EvolutionMetricsEngine, agent: &str, metric: &str, values: &[f64]) {
        let base = Utc::now() - Duration::hours(values.len() as i64);
        for (i, v) in values.iter().enumerate() {
            engine
                .record_metric_at(agent, metric, *v, Value::Null, None, base + Duration::hours(i as i64))
                .unwrap();
        }
    }

    #[test]
    fn weights_cover_twelve_metrics() {
        assert_eq!(METRIC_DEFINITIONS.len(), 12);
        assert!(!definition("response_time").unwrap().higher_is_better);
        assert!(definition("lines_of_code").is_none());
    }

    #[test]
    fn unknown_metric_is_rejected() {
        let mut engine = EvolutionMetricsEngine::new();
        let err = engine
            .record_metric("dev-001", "lines_of_code", 10.0, Value::Null, None)
            .unwrap_err();
        assert_eq!(err, EvolutionError::UnknownMetric("lines_of_code".to_string()));
    }

    #[test]
    fn baseline_forms_after_baseline_periods() {
        let mut engine = EvolutionMetricsEngine::new();
        record(&mut engine, "dev-001", "quality_score", &[0.5, 0.5, 0.5, 0.5]);
        assert_eq!(engine.baseline("dev-001", "quality_score"), None);

        record(&mut engine, "dev-001", "quality_score", &[0.5]);
        assert_eq!(engine.baseline("dev-001", "quality_score"), Some(0.5));

        let metric = engine
            .record_metric("dev-001", "quality_score", 0.6, Value::Null, None)
            .unwrap();
        assert!((metric.improvement_rate - 0.2).abs() < 1e-9);
        assert_eq!(metric.confidence, 0.95);
    }

    #[test]
    fn lower_is_better_flips_improvement() {
        let mut engine = EvolutionMetricsEngine::new();
        record(&mut engine, "dev-001", "response_time", &[10.0; 5]);
        let metric = engine
            .record_metric("dev-001", "response_time", 8.0, Value::Null, None)
            .unwrap();
        assert!((metric.improvement_rate - 0.2).abs() < 1e-9);
    }

    #[test]
    fn confidence_is_neutral_with_little_data() {
        let mut engine = EvolutionMetricsEngine::new();
        let metric = engine
            .record_metric("qa-001", "quality_score", 0.9, Value::Null, None)
            .unwrap();
        assert_eq!(metric.confidence, 0.5);
    }

    #[test]
    fn history_is_trimmed() {
        let mut engine = EvolutionMetricsEngine::new();
        for _ in 0..=HISTORY_CAP {
            engine
                .record_metric("dev-001", "resource_utilization", 0.7, Value::Null, None)
                .unwrap();
        }
        assert_eq!(engine.history("dev-001", "resource_utilization").len(), HISTORY_KEEP);
    }

    #[test]
    fn empty_history_gives_empty_report() {
        let engine = EvolutionMetricsEngine::new();
        let report = engine.evaluate_agent("nobody", 30, Utc::now());
        assert_eq!(report.overall_score, 0.0);
        assert!(report.metric_scores.is_empty());
        assert_eq!(report.recommendations.len(), 1);
    }

    #[test]
    fn improving_agent_scores_well() {
        let mut engine = EvolutionMetricsEngine::new();
        record(
            &mut engine,
            "dev-001",
            "task_completion_rate",
            &[0.60, 0.61, 0.62, 0.63, 0.64, 0.70, 0.72, 0.74],
        );

        let report = engine.evaluate_agent("dev-001", 30, Utc::now());
        assert_eq!(report.trend_analysis["task_completion_rate"], MetricTrend::Improving);
        assert!(report.metric_scores["task_completion_rate"] > 0.6);
        assert!((report.overall_score - report.metric_scores["task_completion_rate"]).abs() < 1e-9);
        assert_eq!(report.comparison_with_peers["task_completion_rate"], 0.0);
    }

    #[test]
    fn declining_agent_gets_recommendation() {
        let mut engine = EvolutionMetricsEngine::new();
        record(&mut engine, "qa-001", "quality_score", &[0.90, 0.89, 0.88, 0.87, 0.86, 0.85]);

        let report = engine.evaluate_agent("qa-001", 30, Utc::now());
        assert_eq!(report.trend_analysis["quality_score"], MetricTrend::Declining);
        assert!(report.areas_for_improvement.iter().any(|a| a.contains("declining")));
        assert!(report.recommendations[0].contains("quality_score"));
    }

    #[test]
    fn team_summary_names_top_performer() {
        let mut engine = EvolutionMetricsEngine::new();
        record(&mut engine, "dev-001", "quality_score", &[0.5, 0.6, 0.7]);
        record(&mut engine, "qa-001", "quality_score", &[0.7, 0.6, 0.5]);

        let summary = engine.team_summary(Utc::now());
        assert_eq!(summary["total_agents"], 2);
        assert_eq!(summary["top_performers"]["quality_score"]["agent_id"], "dev-001");

        let report = engine.evaluate_agent("dev-001", 30, Utc::now());
        assert!(report.comparison_with_peers["quality_score"] > 0.0);
    }
}
