// Repository implementations (data access layer)
// Adapters that implement the domain repository ports

pub mod in_memory;
pub mod postgres_agent_repository;
pub mod postgres_knowledge_repository;
pub mod postgres_operator_repository;
pub mod postgres_project_repository;
pub mod postgres_sprint_repository;
pub mod postgres_task_repository;

pub use in_memory::InMemoryStore;
pub use postgres_agent_repository::PostgresAgentRepository;
pub use postgres_knowledge_repository::PostgresKnowledgeRepository;
pub use postgres_operator_repository::PostgresOperatorRepository;
pub use postgres_project_repository::PostgresProjectRepository;
pub use postgres_sprint_repository::PostgresSprintRepository;
pub use postgres_task_repository::PostgresTaskRepository;
