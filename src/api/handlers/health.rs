use axum::{extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::api::state::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let launcher = state.launcher.lock().await;
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "environment": state.settings.app_env,
        "services": {
            "storage": state.storage,
            "agents": launcher.team().len(),
            "active_projects": launcher.list_active_projects().len(),
        }
    }))
}

/// GET /health
pub async fn liveness() -> &'static str {
    "OK"
}
