// Repository ports
// Each trait is implemented by a Postgres adapter and by the in-memory store

pub mod agent_repository;
pub mod knowledge_repository;
pub mod operator_repository;
pub mod project_repository;
pub mod sprint_repository;
pub mod task_repository;

pub use agent_repository::{AgentOutputRepository, AgentRepository};
pub use knowledge_repository::KnowledgeRepository;
pub use operator_repository::{Operator, OperatorRepository};
pub use project_repository::ProjectRepository;
pub use sprint_repository::SprintRepository;
pub use task_repository::TaskRepository;
