use axum::extract::FromRef;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::agents::ProjectLauncher;
use crate::config::Settings;
use crate::domain::repositories::{
    AgentOutputRepository, AgentRepository, KnowledgeRepository, OperatorRepository,
    ProjectRepository, SprintRepository, TaskRepository,
};
use crate::infrastructure::repositories::{
    InMemoryStore, PostgresAgentRepository, PostgresKnowledgeRepository,
    PostgresOperatorRepository, PostgresProjectRepository, PostgresSprintRepository,
    PostgresTaskRepository,
};

/// Shared handler state
///
/// Repositories sit behind trait objects so the same router runs against
/// Postgres or the in-memory store. The launcher owns the agent team and is
/// serialized behind a mutex.
#[derive(Clone)]
pub struct AppState {
    pub projects: Arc<dyn ProjectRepository>,
    pub sprints: Arc<dyn SprintRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub outputs: Arc<dyn AgentOutputRepository>,
    pub operators: Arc<dyn OperatorRepository>,
    pub knowledge: Arc<dyn KnowledgeRepository>,
    pub launcher: Arc<Mutex<ProjectLauncher>>,
    pub settings: Arc<Settings>,
    pub storage: &'static str,
}

impl AppState {
    pub fn postgres(pool: PgPool, settings: Settings) -> Self {
        let agent_repo = Arc::new(PostgresAgentRepository::new(pool.clone()));
        Self {
            projects: Arc::new(PostgresProjectRepository::new(pool.clone())),
            sprints: Arc::new(PostgresSprintRepository::new(pool.clone())),
            tasks: Arc::new(PostgresTaskRepository::new(pool.clone())),
            agents: agent_repo.clone(),
            outputs: agent_repo,
            operators: Arc::new(PostgresOperatorRepository::new(pool.clone())),
            knowledge: Arc::new(PostgresKnowledgeRepository::new(pool)),
            launcher: Arc::new(Mutex::new(ProjectLauncher::new(&settings))),
            settings: Arc::new(settings),
            storage: "postgres",
        }
    }

    pub fn in_memory(settings: Settings) -> Self {
        let store = InMemoryStore::new();
        Self {
            projects: Arc::new(store.clone()),
            sprints: Arc::new(store.clone()),
            tasks: Arc::new(store.clone()),
            agents: Arc::new(store.clone()),
            outputs: Arc::new(store.clone()),
            operators: Arc::new(store.clone()),
            knowledge: Arc::new(store),
            launcher: Arc::new(Mutex::new(ProjectLauncher::new(&settings))),
            settings: Arc::new(settings),
            storage: "in_memory",
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.settings.jwt_secret
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}
