// Agent self-improvement: metric tracking, retrospectives, evolution plans
// and the team knowledge base

pub mod engine;
pub mod knowledge;
pub mod metrics;
pub mod retrospective;

use thiserror::Error;

pub use engine::{
    AgentEvolutionEngine, EvolutionAction, EvolutionInsight, EvolutionPlan, EvolutionTrigger,
    PlanValidation,
};
pub use knowledge::{
    EvolveSummary, KnowledgeEvent, KnowledgeEvolutionEngine, KnowledgeItem, KnowledgeSource,
    KnowledgeType,
};
pub use metrics::{EvolutionMetricsEngine, EvolutionReport, MetricCategory, MetricTrend};
pub use retrospective::{
    LessonType, ProjectLesson, ProjectRetrospectiveEngine, ProjectSnapshot, Recommendation,
    RecommendationPriority, RetrospectiveReport,
};

#[derive(Debug, Error, PartialEq)]
pub enum EvolutionError {
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
    #[error("Knowledge item not found: {0}")]
    KnowledgeNotFound(uuid::Uuid),
}
