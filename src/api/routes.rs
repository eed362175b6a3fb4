use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::handlers::{agents, auth, health, knowledge, memory, projects, sprints};
use crate::api::state::AppState;

/// Every route the service exposes, with tracing and permissive CORS
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::liveness))
        .route("/api/health", get(health::health))
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/projects", get(projects::list_projects))
        .route("/api/projects/create", post(projects::create_project))
        .route(
            "/api/projects/:id",
            get(projects::get_project).delete(projects::delete_project),
        )
        .route(
            "/api/projects/:id/sprints",
            get(sprints::list_sprints).post(sprints::create_sprint),
        )
        .route(
            "/api/projects/:id/conflicts",
            get(knowledge::list_conflicts).post(knowledge::resolve_conflict),
        )
        .route("/api/projects/:id/memory", get(memory::project_memory))
        .route(
            "/api/projects/:id/meetings",
            get(memory::meeting_history).post(memory::record_meeting),
        )
        .route(
            "/api/projects/:id/retrospective",
            post(memory::conduct_retrospective),
        )
        .route(
            "/api/sprints/:id/tasks",
            get(sprints::list_tasks).post(sprints::create_task),
        )
        .route("/api/agents/status", get(agents::agents_status))
        .route("/api/agents/register", post(agents::register_agent))
        .route("/api/agents/:id/action", post(agents::agent_action))
        .route("/api/agents/:id/switch", post(agents::switch_agent))
        .route("/api/agents/:id/context", get(agents::agent_context))
        .route("/api/agents/:id/evolution", get(agents::agent_evolution))
        .route("/api/knowledge", get(knowledge::list_knowledge))
        .route("/api/knowledge/search", get(knowledge::search_memories))
        .route("/api/knowledge/experience", post(knowledge::submit_experience))
        .route("/api/knowledge/recommend", post(knowledge::recommend_knowledge))
        .route("/api/knowledge/evolve", post(knowledge::evolve_knowledge))
        .route("/api/knowledge/:id/feedback", post(knowledge::knowledge_feedback))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
