use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::domain::knowledge::{ConflictResolution, SharedKnowledge};
use crate::domain::project::Project;
use crate::domain::sprint::{Sprint, SprintStatus};
use crate::domain::task::{Task, TaskStatus};
use crate::memory::rag::RagRetriever;

/// RAG project under which retrospective lessons are indexed
pub const KNOWLEDGE_BASE_PROJECT: &str = "knowledge_base";

const SPRINT_LENGTH_DAYS: usize = 14;
const SUCCESS_THRESHOLD: f64 = 0.8;
const FAILURE_THRESHOLD: f64 = 0.3;
const OPTIMIZATION_THRESHOLD: f64 = 0.6;
const MIN_LESSON_CONFIDENCE: f64 = 0.7;
const DEFAULT_STAKEHOLDER_SATISFACTION: f64 = 0.8;

/// Scored project dimensions and their weight in the overall score
const DIMENSIONS: [(&str, f64); 6] = [
    ("timeline_adherence", 0.2),
    ("quality_metrics", 0.25),
    ("team_collaboration", 0.15),
    ("technical_decisions", 0.2),
    ("risk_management", 0.1),
    ("stakeholder_satisfaction", 0.1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonType {
    SuccessPattern,
    FailurePattern,
    Optimization,
}

impl LessonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuccessPattern => "success_pattern",
            Self::FailurePattern => "failure_pattern",
            Self::Optimization => "optimization",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    Low,
    Medium,
    High,
}

/// Everything the retrospective looks at, flattened from stored records
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProjectSnapshot {
    pub project_id: String,
    pub name: String,
    pub project_type: String,
    pub sprints_total: usize,
    pub sprints_completed: usize,
    pub tasks_total: usize,
    pub tasks_completed: usize,
    pub tasks_in_review: usize,
    pub tasks_blocked: usize,
    pub points_total: i64,
    pub points_completed: i64,
    pub conflicts_total: usize,
    pub conflicts_resolved: usize,
    /// Launch phase name and whether its agent succeeded
    pub phases: Vec<(String, bool)>,
    pub stakeholder_satisfaction: Option<f64>,
}

impl ProjectSnapshot {
    pub fn from_records(
        project: &Project,
        sprints: &[Sprint],
        tasks: &[Task],
        conflicts: &[ConflictResolution],
        phases: Vec<(String, bool)>,
    ) -> Self {
        let count = |status: TaskStatus| tasks.iter().filter(|t| t.status() == status).count();
        let points = |task: &Task| i64::from(task.story_points().unwrap_or(0));

        Self {
            project_id: project.id().to_string(),
            name: project.name().to_string(),
            project_type: project.project_type().to_string(),
            sprints_total: sprints.len(),
            sprints_completed: sprints.iter().filter(|s| s.status() == SprintStatus::Completed).count(),
            tasks_total: tasks.len(),
            tasks_completed: count(TaskStatus::Completed),
            tasks_in_review: count(TaskStatus::InReview),
            tasks_blocked: count(TaskStatus::Blocked),
            points_total: tasks.iter().map(points).sum(),
            points_completed: tasks
                .iter()
                .filter(|t| t.status() == TaskStatus::Completed)
                .map(points)
                .sum(),
            conflicts_total: conflicts.len(),
            conflicts_resolved: conflicts.iter().filter(|c| c.is_resolved()).count(),
            phases,
            stakeholder_satisfaction: None,
        }
    }

    pub fn completion_rate(&self) -> f64 {
        ratio(self.tasks_completed, self.tasks_total).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionAnalysis {
    pub score: f64,
    pub success_factors: Vec<String>,
    pub failure_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectLesson {
    pub lesson_type: LessonType,
    pub title: String,
    pub description: String,
    pub dimension: String,
    pub evidence: Vec<Value>,
    pub confidence: f64,
    pub applicability: Vec<String>,
    pub actionable_steps: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DimensionComparison {
    pub current_score: f64,
    pub historical_average: f64,
    pub best_historical: f64,
    pub comparison: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoricalComparison {
    pub similar_projects_count: usize,
    pub performance_comparison: BTreeMap<String, DimensionComparison>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub priority: RecommendationPriority,
    pub title: String,
    pub description: String,
    pub actionable_steps: Vec<String>,
    pub expected_impact: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrospectiveReport {
    pub project_id: String,
    pub analysis_timestamp: DateTime<Utc>,
    pub project_summary: Value,
    pub performance_analysis: BTreeMap<String, DimensionAnalysis>,
    pub lessons_learned: Vec<ProjectLesson>,
    pub historical_comparison: Option<HistoricalComparison>,
    pub improvement_recommendations: Vec<Recommendation>,
    pub overall_score: f64,
    pub key_insights: Vec<String>,
}

impl RetrospectiveReport {
    /// Lessons in the shareable form the knowledge store keeps
    pub fn shared_knowledge(&self, source_project_id: Option<uuid::Uuid>) -> Vec<SharedKnowledge> {
        self.lessons_learned
            .iter()
            .filter_map(|lesson| {
                let content = json!({
                    "description": lesson.description,
                    "evidence": lesson.evidence,
                    "confidence": lesson.confidence,
                    "actionable_steps": lesson.actionable_steps,
                });
                SharedKnowledge::new(
                    lesson.lesson_type.as_str().to_string(),
                    lesson.title.clone(),
                    content,
                    source_project_id,
                    lesson.applicability.clone(),
                    vec!["retrospective".to_string(), lesson.dimension.clone()],
                    Some("retrospective".to_string()),
                )
                .map_err(|e| warn!(title = %lesson.title, error = %e, "Skipping lesson"))
                .ok()
            })
            .collect()
    }
}

/// Project-level retrospectives that score a finished (or running)
/// project, distil lessons and compare against earlier reports
#[derive(Debug, Default)]
pub struct ProjectRetrospectiveEngine {
    history: Vec<(String, BTreeMap<String, DimensionAnalysis>, String)>,
}

impl ProjectRetrospectiveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports_recorded(&self) -> usize {
        self.history.len()
    }

    /// Runs the full retrospective and indexes its lessons into `rag`
    pub fn conduct(
        &mut self,
        snapshot: &ProjectSnapshot,
        rag: &mut RagRetriever,
        include_historical: bool,
    ) -> RetrospectiveReport {
        info!(project_id = %snapshot.project_id, "Starting project retrospective");

        let performance = analyze(snapshot);
        let lessons = extract_lessons(snapshot, &performance);
        let comparison = if include_historical {
            self.compare(snapshot, &performance)
        } else {
            None
        };
        let recommendations = recommend(&lessons, comparison.as_ref());

        let report = RetrospectiveReport {
            project_id: snapshot.project_id.clone(),
            analysis_timestamp: Utc::now(),
            project_summary: json!({
                "name": snapshot.name,
                "type": snapshot.project_type,
                "duration_days": snapshot.sprints_total * SPRINT_LENGTH_DAYS,
                "total_sprints": snapshot.sprints_total,
                "completion_rate": snapshot.completion_rate(),
            }),
            overall_score: overall_score(&performance),
            key_insights: key_insights(&lessons),
            performance_analysis: performance.clone(),
            lessons_learned: lessons,
            historical_comparison: comparison,
            improvement_recommendations: recommendations,
        };

        for lesson in &report.lessons_learned {
            let content = json!({
                "title": lesson.title,
                "description": lesson.description,
                "lesson_type": lesson.lesson_type,
                "actionable_steps": lesson.actionable_steps,
            });
            if let Err(e) = rag.index_memory(KNOWLEDGE_BASE_PROJECT, None, None, "patterns", &content) {
                warn!(title = %lesson.title, error = %e, "Failed to index lesson");
            }
        }

        self.history.retain(|(id, _, _)| id != &snapshot.project_id);
        self.history
            .push((snapshot.project_id.clone(), performance, snapshot.project_type.clone()));

        info!(
            project_id = %snapshot.project_id,
            overall_score = report.overall_score,
            lessons = report.lessons_learned.len(),
            "Project retrospective complete"
        );
        report
    }

    fn compare(
        &self,
        snapshot: &ProjectSnapshot,
        current: &BTreeMap<String, DimensionAnalysis>,
    ) -> Option<HistoricalComparison> {
        let similar: Vec<&BTreeMap<String, DimensionAnalysis>> = self
            .history
            .iter()
            .filter(|(id, _, project_type)| id != &snapshot.project_id && project_type == &snapshot.project_type)
            .map(|(_, performance, _)| performance)
            .collect();
        if similar.is_empty() {
            return None;
        }

        let mut performance_comparison = BTreeMap::new();
        for (dimension, _) in DIMENSIONS {
            let scores: Vec<f64> = similar
                .iter()
                .map(|p| p.get(dimension).map_or(0.0, |a| a.score))
                .collect();
            let historical_average = scores.iter().sum::<f64>() / scores.len() as f64;
            let best_historical = scores.iter().copied().fold(0.0, f64::max);
            let current_score = current.get(dimension).map_or(0.0, |a| a.score);
            let comparison = if current_score > historical_average * 1.1 {
                "above_average"
            } else if current_score < historical_average * 0.9 {
                "below_average"
            } else {
                "average"
            };
            performance_comparison.insert(
                dimension.to_string(),
                DimensionComparison {
                    current_score,
                    historical_average,
                    best_historical,
                    comparison,
                },
            );
        }

        Some(HistoricalComparison {
            similar_projects_count: similar.len(),
            performance_comparison,
        })
    }
}

fn ratio(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64)
}

fn dimension(score: f64, good: String, bad: String) -> DimensionAnalysis {
    let score = score.clamp(0.0, 1.0);
    let (success_factors, failure_factors) = if score >= OPTIMIZATION_THRESHOLD {
        (vec![good], Vec::new())
    } else {
        (Vec::new(), vec![bad])
    };
    DimensionAnalysis {
        score,
        success_factors,
        failure_factors,
    }
}

/// Scores each dimension from the snapshot; dimensions with no data
/// fall back to a neutral score
fn analyze(s: &ProjectSnapshot) -> BTreeMap<String, DimensionAnalysis> {
    let mut analysis = BTreeMap::new();

    let timeline = if s.points_total > 0 {
        s.points_completed as f64 / s.points_total as f64
    } else {
        ratio(s.tasks_completed, s.tasks_total).unwrap_or(0.5)
    };
    analysis.insert(
        "timeline_adherence".to_string(),
        dimension(
            timeline,
            format!("Delivered {} of {} story points", s.points_completed, s.points_total),
            format!("Only {} of {} story points delivered", s.points_completed, s.points_total),
        ),
    );

    let finished = s.tasks_completed + s.tasks_in_review + s.tasks_blocked;
    let quality = ratio(s.tasks_completed, finished).unwrap_or(0.5);
    analysis.insert(
        "quality_metrics".to_string(),
        dimension(
            quality,
            format!("{} tasks passed review", s.tasks_completed),
            format!("{} tasks stuck in review or blocked", s.tasks_in_review + s.tasks_blocked),
        ),
    );

    let collaboration = ratio(s.conflicts_resolved, s.conflicts_total).unwrap_or(0.75);
    analysis.insert(
        "team_collaboration".to_string(),
        dimension(
            collaboration,
            format!("{} of {} conflicts resolved", s.conflicts_resolved, s.conflicts_total),
            format!(
                "{} conflicts left unresolved",
                s.conflicts_total - s.conflicts_resolved
            ),
        ),
    );

    let succeeded = s.phases.iter().filter(|(_, ok)| *ok).count();
    let failed: Vec<&str> = s.phases.iter().filter(|(_, ok)| !ok).map(|(p, _)| p.as_str()).collect();
    let technical = ratio(succeeded, s.phases.len()).unwrap_or(0.5);
    analysis.insert(
        "technical_decisions".to_string(),
        dimension(
            technical,
            format!("{} of {} delivery phases succeeded", succeeded, s.phases.len()),
            format!("Failed phases: {}", failed.join(", ")),
        ),
    );

    let open_risks = s.tasks_blocked + (s.conflicts_total - s.conflicts_resolved);
    let risk = ratio(open_risks, s.tasks_total + s.conflicts_total).map_or(0.6, |r| 1.0 - r);
    analysis.insert(
        "risk_management".to_string(),
        dimension(
            risk,
            "Blockers and conflicts were contained".to_string(),
            format!("{} open blockers or conflicts", open_risks),
        ),
    );

    let satisfaction = s.stakeholder_satisfaction.unwrap_or(DEFAULT_STAKEHOLDER_SATISFACTION);
    analysis.insert(
        "stakeholder_satisfaction".to_string(),
        dimension(
            satisfaction,
            "Stakeholders rated the outcome well".to_string(),
            "Stakeholders were dissatisfied with the outcome".to_string(),
        ),
    );

    analysis
}

fn extract_lessons(s: &ProjectSnapshot, performance: &BTreeMap<String, DimensionAnalysis>) -> Vec<ProjectLesson> {
    let mut lessons = Vec::new();

    for (name, analysis) in performance {
        let evidence = |factors: &[String]| {
            vec![json!({"type": "performance_score", "score": analysis.score, "factors": factors})]
        };

        if analysis.score >= SUCCESS_THRESHOLD && !analysis.success_factors.is_empty() {
            lessons.push(ProjectLesson {
                lesson_type: LessonType::SuccessPattern,
                title: format!("Success pattern in {name}"),
                description: format!("Strong {name} performance, scored {:.2}", analysis.score),
                dimension: name.clone(),
                evidence: evidence(&analysis.success_factors),
                confidence: analysis.score.min(0.95),
                applicability: vec![
                    s.project_type.clone(),
                    "similar_team_size".to_string(),
                    "similar_tech_stack".to_string(),
                ],
                actionable_steps: analysis
                    .success_factors
                    .iter()
                    .flat_map(|f| [format!("Keep doing: {f}"), format!("Document the practice behind: {f}")])
                    .collect(),
            });
        } else if analysis.score <= FAILURE_THRESHOLD && !analysis.failure_factors.is_empty() {
            lessons.push(ProjectLesson {
                lesson_type: LessonType::FailurePattern,
                title: format!("Failure pattern in {name}"),
                description: format!("Weak {name} performance, scored {:.2}", analysis.score),
                dimension: name.clone(),
                evidence: evidence(&analysis.failure_factors),
                confidence: 1.0 - analysis.score,
                applicability: vec![s.project_type.clone(), "risk_mitigation".to_string()],
                actionable_steps: analysis
                    .failure_factors
                    .iter()
                    .flat_map(|f| [format!("Find the root cause of: {f}"), format!("Add an early checkpoint for: {f}")])
                    .collect(),
            });
        } else if (OPTIMIZATION_THRESHOLD..SUCCESS_THRESHOLD).contains(&analysis.score) {
            lessons.push(ProjectLesson {
                lesson_type: LessonType::Optimization,
                title: format!("Optimization opportunity in {name}"),
                description: format!("{name} is adequate at {:.2} but below the success bar", analysis.score),
                dimension: name.clone(),
                evidence: evidence(&analysis.success_factors),
                confidence: MIN_LESSON_CONFIDENCE,
                applicability: vec![s.project_type.clone()],
                actionable_steps: vec![format!("Set a measurable {name} target for the next sprint")],
            });
        }
    }

    lessons.retain(|l| l.confidence >= MIN_LESSON_CONFIDENCE);
    lessons
}

fn recommend(lessons: &[ProjectLesson], comparison: Option<&HistoricalComparison>) -> Vec<Recommendation> {
    let mut recommendations: Vec<Recommendation> = lessons
        .iter()
        .filter_map(|lesson| match lesson.lesson_type {
            LessonType::FailurePattern => Some(Recommendation {
                kind: "failure_prevention",
                priority: RecommendationPriority::High,
                title: format!("Avoid repeating: {}", lesson.title),
                description: lesson.description.clone(),
                actionable_steps: lesson.actionable_steps.clone(),
                expected_impact: "Prevents a repeat of this failure".to_string(),
            }),
            LessonType::Optimization => Some(Recommendation {
                kind: "process_optimization",
                priority: RecommendationPriority::Medium,
                title: format!("Improve: {}", lesson.title),
                description: lesson.description.clone(),
                actionable_steps: lesson.actionable_steps.clone(),
                expected_impact: "Raises efficiency and quality".to_string(),
            }),
            LessonType::SuccessPattern => None,
        })
        .collect();

    if let Some(comparison) = comparison {
        for (dimension, result) in &comparison.performance_comparison {
            if result.comparison == "below_average" {
                recommendations.push(Recommendation {
                    kind: "performance_improvement",
                    priority: RecommendationPriority::High,
                    title: format!("Lift {dimension}"),
                    description: format!("{dimension} scored below the historical average"),
                    actionable_steps: vec![
                        format!("Analyse the root cause of weak {dimension}"),
                        format!("Study the best past project's {dimension} practices"),
                        format!("Plan a targeted {dimension} improvement"),
                    ],
                    expected_impact: format!("Bring {dimension} back above average"),
                });
            }
        }
    }

    recommendations.sort_by(|a, b| b.priority.cmp(&a.priority));
    recommendations
}

fn overall_score(performance: &BTreeMap<String, DimensionAnalysis>) -> f64 {
    let (weighted, total) = DIMENSIONS
        .iter()
        .filter_map(|(name, weight)| performance.get(*name).map(|a| (a.score * weight, *weight)))
        .fold((0.0, 0.0), |(s, w), (score, weight)| (s + score, w + weight));
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}

fn key_insights(lessons: &[ProjectLesson]) -> Vec<String> {
    let count = |kind: LessonType| lessons.iter().filter(|l| l.lesson_type == kind).count();
    let mut insights = Vec::new();
    if count(LessonType::SuccessPattern) > 3 {
        insights.push("Several success patterns are ready for reuse".to_string());
    }
    if count(LessonType::FailurePattern) > 2 {
        insights.push("Failure prevention needs focused attention".to_string());
    }
    if count(LessonType::Optimization) > 1 {
        insights.push("There is clear room for optimization".to_string());
    }
    insights
}
