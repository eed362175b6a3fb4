// Knowledge domain module
// Conflicts between agents and knowledge shared across projects

pub mod conflict;
pub mod shared_knowledge;

pub use conflict::ConflictResolution;
pub use shared_knowledge::SharedKnowledge;
