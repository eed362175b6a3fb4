// Agent working memory with context-rot mitigation

pub mod item;
pub mod manager;
pub mod mitigator;

pub use item::{estimate_tokens, ContextImportance, ContextItem, ContextType};
pub use manager::{AdaptiveContextManager, ContextStats, OptimizedContext};
pub use mitigator::{ContextRotMitigator, DegradationAssessment, Mitigation};
