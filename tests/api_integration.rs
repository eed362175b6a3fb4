//! End-to-end API tests against the in-memory repositories
//!
//! Each test builds a fresh router, so state never leaks between tests.

use agentteam_api::api::{build_router, AppState};
use agentteam_api::config::Settings;
use agentteam_api::domain::agent::AgentOutput;
use agentteam_api::domain::repositories::AgentOutputRepository;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt; // for oneshot
use uuid::Uuid;

fn setup_app() -> Router {
    build_router(AppState::in_memory(Settings::default()))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Registers an operator and returns a bearer token
async fn login(app: &Router) -> String {
    let credentials = json!({"email": "lead@example.com", "password": "sprint-ready-42"});
    let (status, _) = send(app, Method::POST, "/api/auth/register", None, Some(credentials.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(app, Method::POST, "/api/auth/login", None, Some(credentials)).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

fn storefront() -> Value {
    json!({
        "name": "Storefront",
        "description": "Online shop for handmade goods",
        "requirements": ["Users should browse products", "Users should pay by card"],
        "business_goals": ["increase sales"],
        "budget": 25000.0
    })
}

async fn create_project(app: &Router, token: &str) -> Value {
    let (status, body) = send(app, Method::POST, "/api/projects/create", Some(token), Some(storefront())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn liveness_and_health() {
    let app = setup_app();

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");

    let (status, body) = send(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "development");
    assert_eq!(body["services"]["storage"], "in_memory");
    assert_eq!(body["services"]["agents"], 5);
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_input() {
    let app = setup_app();
    login(&app).await;

    let again = json!({"email": "lead@example.com", "password": "sprint-ready-42"});
    let (status, body) = send(&app, Method::POST, "/api/auth/register", None, Some(again)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Email already registered");

    let short = json!({"email": "new@example.com", "password": "short"});
    let (status, _) = send(&app, Method::POST, "/api/auth/register", None, Some(short)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_email = json!({"email": "not-an-email", "password": "long enough pass"});
    let (status, _) = send(&app, Method::POST, "/api/auth/register", None, Some(bad_email)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = setup_app();
    login(&app).await;

    let wrong = json!({"email": "lead@example.com", "password": "not-the-password"});
    let (status, body) = send(&app, Method::POST, "/api/auth/login", None, Some(wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = setup_app();

    let (status, _) = send(&app, Method::POST, "/api/projects/create", None, Some(storefront())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::POST, "/api/projects/create", Some("garbage"), Some(storefront())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().starts_with("Invalid token"));
}

#[tokio::test]
async fn create_project_runs_the_team_and_persists() {
    let app = setup_app();
    let token = login(&app).await;

    let created = create_project(&app, &token).await;
    assert_eq!(created["project"]["status"], "active");
    assert_eq!(created["project"]["name"], "Storefront");
    assert_eq!(created["sprint"]["sprint_number"], 1);
    assert_eq!(created["assigned_agents"].as_array().unwrap().len(), 5);
    assert_eq!(created["next_steps"].as_array().unwrap().len(), 5);
    for phase in ["planning", "requirements", "architecture", "development", "qa_planning"] {
        assert_eq!(created["phases"][phase]["succeeded"], true, "{phase}");
    }

    let id = created["project"]["id"].as_str().unwrap();
    let (status, body) = send(&app, Method::GET, &format!("/api/projects/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project"]["id"], id);
    assert_eq!(body["sprints"].as_array().unwrap().len(), 1);
    assert!(body["launch"]["phases"]["planning"].is_object());

    let (status, body) = send(&app, Method::GET, "/api/projects", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total"], 1);
    assert_eq!(body["summary"]["by_status"]["active"], 1);
}

#[tokio::test]
async fn create_project_without_name_is_bad_request() {
    let app = setup_app();
    let token = login(&app).await;

    let (status, _) = send(&app, Method::POST, "/api/projects/create", Some(&token), Some(json!({"name": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_project_removes_it() {
    let app = setup_app();
    let token = login(&app).await;
    let created = create_project(&app, &token).await;
    let uri = format!("/api/projects/{}", created["project"]["id"].as_str().unwrap());

    let (status, _) = send(&app, Method::DELETE, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::DELETE, &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sprints_and_tasks_flow() {
    let app = setup_app();
    let token = login(&app).await;
    let created = create_project(&app, &token).await;
    let project_id = created["project"]["id"].as_str().unwrap();
    let sprints_uri = format!("/api/projects/{project_id}/sprints");

    let (status, sprint) = send(&app, Method::POST, &sprints_uri, Some(&token), Some(json!({"goal": "Checkout"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sprint["sprint_number"], 2);
    assert_eq!(sprint["status"], "planning");

    let (status, _) = send(&app, Method::POST, &sprints_uri, Some(&token), Some(json!({"goal": "Dup", "sprint_number": 2}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, sprints) = send(&app, Method::GET, &sprints_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sprints.as_array().unwrap().len(), 2);

    let tasks_uri = format!("/api/sprints/{}/tasks", sprint["id"].as_str().unwrap());
    let task = json!({
        "title": "Card payment form",
        "priority": 5,
        "story_points": 3,
        "acceptance_criteria": ["Rejects expired cards"],
        "assign_to_role": "developer"
    });
    let (status, task) = send(&app, Method::POST, &tasks_uri, Some(&token), Some(task)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "todo");
    assert_eq!(task["assigned_agent_id"], "dev-001");
    assert_eq!(task["project_id"], project_id);

    let (status, _) = send(&app, Method::POST, &tasks_uri, Some(&token), Some(json!({"title": "x", "priority": 9}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, tasks) = send(&app, Method::GET, &tasks_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn sprint_routes_404_for_unknown_parents() {
    let app = setup_app();
    let token = login(&app).await;
    let missing = uuid::Uuid::new_v4();

    let (status, _) = send(&app, Method::GET, &format!("/api/projects/{missing}/sprints"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, &format!("/api/sprints/{missing}/tasks"), Some(&token), Some(json!({"title": "t"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn agent_status_register_and_actions() {
    let app = setup_app();
    let token = login(&app).await;

    let (status, body) = send(&app, Method::GET, "/api/agents/status", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total"], 5);
    assert_eq!(body["summary"]["available"], 5);

    let reviewer = json!({"agent_id": "reviewer-001", "role": "reviewer"});
    let (status, body) = send(&app, Method::POST, "/api/agents/register", Some(&token), Some(reviewer.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["llm_provider"], "deepseek");

    let (status, _) = send(&app, Method::POST, "/api/agents/register", Some(&token), Some(reviewer)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, Method::POST, "/api/agents/qa-001/action", Some(&token), Some(json!({"type": "pause"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "offline");

    let (status, body) = send(&app, Method::POST, "/api/agents/reviewer-001/action", Some(&token), Some(json!({"type": "pause"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "offline");

    let (_, body) = send(&app, Method::GET, "/api/agents/status", None, None).await;
    assert_eq!(body["summary"]["total"], 6);
    assert_eq!(body["summary"]["by_status"]["offline"], 2);

    let (status, _) = send(&app, Method::POST, "/api/agents/qa-001/action", Some(&token), Some(json!({"type": "explode"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, "/api/agents/unknown-007/action", Some(&token), Some(json!({"type": "resume"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn paused_manager_blocks_launch() {
    let app = setup_app();
    let token = login(&app).await;

    let (status, _) = send(&app, Method::POST, "/api/agents/manager-001/action", Some(&token), Some(json!({"type": "pause"}))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, "/api/projects/create", Some(&token), Some(storefront())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("planning"));

    let (_, body) = send(&app, Method::GET, "/api/projects", None, None).await;
    assert_eq!(body["summary"]["total"], 0);

    let (status, _) = send(&app, Method::POST, "/api/agents/manager-001/action", Some(&token), Some(json!({"type": "restart"}))).await;
    assert_eq!(status, StatusCode::OK);
    create_project(&app, &token).await;
}

/// Output store whose writes always fail
struct OfflineOutputs;

#[async_trait]
impl AgentOutputRepository for OfflineOutputs {
    async fn save(&self, _output: &AgentOutput) -> Result<(), String> {
        Err("Output storage offline".to_string())
    }

    async fn find_by_project(&self, _project_id: Uuid) -> Result<Vec<AgentOutput>, String> {
        Ok(Vec::new())
    }

    async fn find_by_agent(&self, _agent_id: &str) -> Result<Vec<AgentOutput>, String> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn failed_output_save_rolls_back_the_launch() {
    let mut state = AppState::in_memory(Settings::default());
    state.outputs = Arc::new(OfflineOutputs);
    let app = build_router(state);
    let token = login(&app).await;

    let (status, body) = send(&app, Method::POST, "/api/projects/create", Some(&token), Some(storefront())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("offline"));

    let (_, body) = send(&app, Method::GET, "/api/projects", None, None).await;
    assert_eq!(body["summary"]["total"], 0);

    let (_, body) = send(&app, Method::GET, "/api/health", None, None).await;
    assert_eq!(body["services"]["active_projects"], 0);
}

#[tokio::test]
async fn budget_outside_storage_precision_is_bad_request() {
    let app = setup_app();
    let token = login(&app).await;

    let mut request = storefront();
    request["budget"] = json!(1e12);
    let (status, body) = send(&app, Method::POST, "/api/projects/create", Some(&token), Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Budget must be below"));

    let mut request = storefront();
    request["budget"] = json!(1234.5678);
    let (status, body) = send(&app, Method::POST, "/api/projects/create", Some(&token), Some(request)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["project"]["budget"], "1234.57");
}

#[tokio::test]
async fn conflicts_are_arbitrated_and_persisted() {
    let app = setup_app();
    let token = login(&app).await;
    let created = create_project(&app, &token).await;
    let uri = format!("/api/projects/{}/conflicts", created["project"]["id"].as_str().unwrap());

    let conflict = json!({
        "agent1_id": "dev-001",
        "agent2_id": "arch-001",
        "type": "technical",
        "description": "ORM versus hand written SQL"
    });
    let (status, _) = send(&app, Method::POST, &uri, None, Some(conflict.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::POST, &uri, Some(&token), Some(conflict)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["resolution_method"], "rule_based");
    assert_eq!(body["resolved_by"], "manager-001");
    assert!(body["decision"].as_str().unwrap().contains("Architect"));

    let same_agent = json!({"agent1_id": "dev-001", "agent2_id": "dev-001", "type": "priority"});
    let (status, _) = send(&app, Method::POST, &uri, Some(&token), Some(same_agent)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown_type = json!({"agent1_id": "dev-001", "agent2_id": "qa-001", "type": "weather"});
    let (status, _) = send(&app, Method::POST, &uri, Some(&token), Some(unknown_type)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["total"], 1);
    assert_eq!(body["summary"]["resolved"], 1);
    assert_eq!(body["conflicts"][0]["agent2_id"], "arch-001");

    let missing = format!("/api/projects/{}/conflicts", Uuid::new_v4());
    let (status, _) = send(&app, Method::GET, &missing, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn experience_becomes_stored_knowledge() {
    let app = setup_app();
    let token = login(&app).await;

    let report = json!({
        "agent_id": "dev-001",
        "experience": {
            "task_executions": [
                {"success": true, "task_type": "deployment", "steps": ["build image", "run migrations", "roll out"]}
            ]
        },
        "context": {"task_type": "deployment"}
    });
    let (status, body) = send(&app, Method::POST, "/api/knowledge/experience", Some(&token), Some(report)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["stored"], 1);
    assert_eq!(body["knowledge"][0]["type"], "procedure");
    let id = body["knowledge"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, "/api/knowledge?type=procedure", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["knowledge"][0]["effectiveness_score"], 1.0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/knowledge/recommend",
        None,
        Some(json!({"context": {"task_type": "deployment"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["recommendations"][0]["id"], id.as_str());

    let feedback = json!({"agent_id": "qa-001", "success": false, "result": {"rollback": true}});
    let (status, body) = send(&app, Method::POST, &format!("/api/knowledge/{id}/feedback"), Some(&token), Some(feedback.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert!((body["success_rate"].as_f64().unwrap() - 0.9).abs() < 1e-9);

    let (_, body) = send(&app, Method::GET, "/api/knowledge?type=procedure", None, None).await;
    assert!((body["knowledge"][0]["effectiveness_score"].as_f64().unwrap() - 0.9).abs() < 1e-9);

    let (status, _) = send(&app, Method::POST, &format!("/api/knowledge/{}/feedback", Uuid::new_v4()), Some(&token), Some(feedback)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::POST, "/api/knowledge/evolve", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["before_count"], 1);
    assert_eq!(body["after_count"], 1);
}

#[tokio::test]
async fn launched_project_keeps_sprint_memory_and_minutes() {
    let app = setup_app();
    let token = login(&app).await;
    let created = create_project(&app, &token).await;
    let id = created["project"]["id"].as_str().unwrap();

    let (status, body) = send(&app, Method::GET, &format!("/api/projects/{id}/memory"), None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["core"]["sprint_goal"], "Deliver the first increment of Storefront");
    assert_eq!(body["layers"]["episodic"], 1);
    assert_eq!(body["context"]["project_name"], "Storefront");
    assert_eq!(body["allocation"]["team"].as_array().unwrap().len(), 5);

    let meetings = format!("/api/projects/{id}/meetings");
    let daily = json!({
        "type": "daily",
        "participants": ["dev-001", "qa-001"],
        "outcomes": {"agent_updates": {"dev-001": {"blockers": ["Payment sandbox is down"]}}}
    });
    let (status, body) = send(&app, Method::POST, &meetings, Some(&token), Some(daily)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["minutes"]["type"], "daily");
    assert_eq!(body["minutes"]["participants"].as_array().unwrap().len(), 2);

    let outsider = json!({"type": "review", "participants": ["ghost-001"]});
    let (status, _) = send(&app, Method::POST, &meetings, Some(&token), Some(outsider)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::POST, &meetings, Some(&token), Some(json!({"type": "brunch"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, &meetings, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let (_, body) = send(&app, Method::GET, &format!("{meetings}?type=planning"), None, None).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["meetings"][0]["participants"].as_array().unwrap().len(), 5);

    let missing = format!("/api/projects/{}/memory", Uuid::new_v4());
    let (status, _) = send(&app, Method::GET, &missing, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn retrospective_scores_the_project_and_stores_lessons() {
    let app = setup_app();
    let token = login(&app).await;
    let created = create_project(&app, &token).await;
    let id = created["project"]["id"].as_str().unwrap();
    let uri = format!("/api/projects/{id}/retrospective");

    let (status, _) = send(&app, Method::POST, &uri, Some(&token), Some(json!({"stakeholder_satisfaction": 1.5}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, report) = send(&app, Method::POST, &uri, Some(&token), Some(json!({"stakeholder_satisfaction": 0.9}))).await;
    assert_eq!(status, StatusCode::OK, "{report}");
    assert_eq!(report["project_id"], id);
    assert_eq!(report["performance_analysis"].as_object().unwrap().len(), 6);
    let score = report["overall_score"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&score));

    let mut stored = 0;
    for lesson_type in ["success_pattern", "failure_pattern", "optimization"] {
        let (_, body) = send(&app, Method::GET, &format!("/api/knowledge?type={lesson_type}"), None, None).await;
        stored += body["total"].as_u64().unwrap();
    }
    assert_eq!(stored as usize, report["lessons_learned"].as_array().unwrap().len());

    let missing = format!("/api/projects/{}/retrospective", Uuid::new_v4());
    let (status, _) = send(&app, Method::POST, &missing, Some(&token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn agents_switch_projects_and_report_evolution() {
    let app = setup_app();
    let token = login(&app).await;
    let created = create_project(&app, &token).await;
    let id = created["project"]["id"].as_str().unwrap();

    let (status, _) = send(&app, Method::GET, "/api/agents/dev-001/context", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::POST, "/api/agents/dev-001/switch", Some(&token), Some(json!({"project_id": id}))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["project_id"], id);
    assert!(body["context"].is_object());

    let (status, body) = send(&app, Method::GET, "/api/agents/dev-001/context", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["project_id"], id);
    assert_eq!(body["sprint_goal"], "Deliver the first increment of Storefront");
    assert_eq!(body["agent_context"]["role"], "developer");

    let (status, _) = send(&app, Method::POST, "/api/agents/dev-001/switch", Some(&token), Some(json!({"project_id": "elsewhere"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/api/agents/ghost-001/switch", Some(&token), Some(json!({"project_id": id}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::GET, "/api/agents/dev-001/evolution", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evolution"]["performance_history_count"], 1);
    assert_eq!(body["workload"]["projects"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::GET, "/api/agents/status", None, None).await;
    assert_eq!(body["message_bus"]["registered_agents"], 5);
    assert!(body["allocation"]["overallocated_agents"].as_array().unwrap().is_empty());
}
