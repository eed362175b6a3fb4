//! Postgres repository tests
//!
//! Need a reachable database: `DATABASE_URL=... cargo test -- --ignored`.
//! Migrations are applied on connect; every test works on its own project
//! and removes it afterwards.

use agentteam_api::auth::password::hash_password;
use agentteam_api::domain::agent::{AgentOutput, AgentProfile, AgentRole, AgentStatus};
use agentteam_api::domain::knowledge::{ConflictResolution, SharedKnowledge};
use agentteam_api::domain::operator::Email;
use agentteam_api::domain::project::{Project, ProjectStatus};
use agentteam_api::domain::repositories::{
    AgentOutputRepository, AgentRepository, KnowledgeRepository, Operator, OperatorRepository,
    ProjectRepository, SprintRepository, TaskRepository,
};
use agentteam_api::domain::sprint::Sprint;
use agentteam_api::domain::task::{Task, TaskStatus};
use agentteam_api::infrastructure::repositories::{
    PostgresAgentRepository, PostgresKnowledgeRepository, PostgresOperatorRepository,
    PostgresProjectRepository, PostgresSprintRepository, PostgresTaskRepository,
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

async fn saved_project(pool: &PgPool, name: &str) -> Project {
    let (project, _) = Project::new(
        name.to_string(),
        "repository test".to_string(),
        "api".to_string(),
        json!({"language": "rust"}),
        json!({}),
        None,
    )
    .expect("valid project");
    PostgresProjectRepository::new(pool.clone())
        .save(&project)
        .await
        .expect("save project");
    project
}

async fn cleanup_project(pool: &PgPool, id: Uuid) {
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .expect("Failed to clean up project");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn project_save_find_and_update() {
    let pool = setup_test_db().await;
    let repo = PostgresProjectRepository::new(pool.clone());
    let mut project = saved_project(&pool, "Repo Project").await;

    let found = repo.find_by_id(project.id()).await.unwrap().expect("project exists");
    assert_eq!(found.name(), "Repo Project");
    assert_eq!(found.status(), ProjectStatus::Planning);
    assert_eq!(found.tech_stack()["language"], "rust");

    project.activate().unwrap();
    repo.save(&project).await.unwrap();
    let active = repo.find_by_status(ProjectStatus::Active).await.unwrap();
    assert!(active.iter().any(|p| p.id() == project.id()));

    cleanup_project(&pool, project.id()).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn project_delete_cascades_and_reports_missing() {
    let pool = setup_test_db().await;
    let repo = PostgresProjectRepository::new(pool.clone());
    let project = saved_project(&pool, "Doomed").await;

    let sprint = Sprint::new(project.id(), 1, "Sprint 1".into(), "goal".into()).unwrap();
    PostgresSprintRepository::new(pool.clone()).save(&sprint).await.unwrap();

    repo.delete(project.id()).await.unwrap();
    assert!(repo.find_by_id(project.id()).await.unwrap().is_none());
    assert!(PostgresSprintRepository::new(pool.clone())
        .find_by_id(sprint.id())
        .await
        .unwrap()
        .is_none());

    let err = repo.delete(project.id()).await.unwrap_err();
    assert!(err.contains("not found"));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn sprint_numbers_are_unique_per_project() {
    let pool = setup_test_db().await;
    let repo = PostgresSprintRepository::new(pool.clone());
    let project = saved_project(&pool, "Sprints").await;

    let first = Sprint::new(project.id(), 1, "One".into(), "".into()).unwrap();
    let second = Sprint::new(project.id(), 2, "Two".into(), "".into()).unwrap();
    repo.save(&second).await.unwrap();
    repo.save(&first).await.unwrap();

    let clash = Sprint::new(project.id(), 2, "Two again".into(), "".into()).unwrap();
    assert!(repo.save(&clash).await.unwrap_err().contains("duplicate"));

    let numbers: Vec<i32> = repo
        .find_by_project(project.id())
        .await
        .unwrap()
        .iter()
        .map(Sprint::sprint_number)
        .collect();
    assert_eq!(numbers, vec![1, 2]);

    cleanup_project(&pool, project.id()).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn task_lifecycle_round_trips() {
    let pool = setup_test_db().await;
    let repo = PostgresTaskRepository::new(pool.clone());
    let project = saved_project(&pool, "Tasks").await;
    let sprint = Sprint::new(project.id(), 1, "One".into(), "".into()).unwrap();
    PostgresSprintRepository::new(pool.clone()).save(&sprint).await.unwrap();

    let mut task = Task::new(
        project.id(),
        Some(sprint.id()),
        "Login form".into(),
        "".into(),
        "feature".into(),
        Some(4),
        Some(3),
    )
    .unwrap();
    task.assign("dev-001".into(), AgentRole::Developer);
    task.start().unwrap();
    repo.save(&task).await.unwrap();

    let found = repo.find_by_id(task.id()).await.unwrap().expect("task exists");
    assert_eq!(found.status(), TaskStatus::InProgress);
    assert_eq!(found.assigned_agent_id(), Some("dev-001"));
    assert!(found.started_at().is_some());

    assert_eq!(repo.find_by_sprint(sprint.id()).await.unwrap().len(), 1);
    assert_eq!(repo.find_by_project(project.id()).await.unwrap().len(), 1);

    cleanup_project(&pool, project.id()).await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn agents_and_outputs_persist() {
    let pool = setup_test_db().await;
    let repo = PostgresAgentRepository::new(pool.clone());
    let project = saved_project(&pool, "Agents").await;

    let agent_id = format!("qa-{}", Uuid::new_v4());
    let mut profile = AgentProfile::new(agent_id.clone(), AgentRole::Qa, "qwen-72b".into()).unwrap();
    profile.set_status(AgentStatus::Waiting);
    AgentRepository::save(&repo, &profile).await.unwrap();

    let found = AgentRepository::find_by_id(&repo, &agent_id).await.unwrap().expect("agent exists");
    assert_eq!(found.current_status(), AgentStatus::Waiting);
    assert!(repo
        .find_by_role(AgentRole::Qa)
        .await
        .unwrap()
        .iter()
        .any(|a| a.id() == agent_id));

    let output = AgentOutput::new(agent_id.clone(), project.id(), None, "test_plan".into(), json!({"cases": 3}), 0.9).unwrap();
    AgentOutputRepository::save(&repo, &output).await.unwrap();
    let outputs = repo.find_by_agent(&agent_id).await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].content()["cases"], 3);

    cleanup_project(&pool, project.id()).await;
    sqlx::query("DELETE FROM agents WHERE id = $1")
        .bind(&agent_id)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn operator_emails_are_unique() {
    let pool = setup_test_db().await;
    let repo = PostgresOperatorRepository::new(pool.clone());
    let email = Email::new(format!("ops-{}@example.com", Uuid::new_v4())).unwrap();

    let operator = Operator {
        id: Uuid::new_v4(),
        email: email.clone(),
        password_hash: hash_password("long enough").unwrap(),
        display_name: "Ops".into(),
        is_active: true,
    };
    let id = repo.create(operator.clone()).await.unwrap();

    let found = repo.find_by_email(&email).await.unwrap().expect("operator exists");
    assert_eq!(found.id, id);
    repo.update_last_login(id).await.unwrap();

    let clash = Operator { id: Uuid::new_v4(), ..operator };
    assert!(repo.create(clash).await.unwrap_err().contains("duplicate"));

    sqlx::query("DELETE FROM operators WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn conflicts_and_knowledge_persist() {
    let pool = setup_test_db().await;
    let repo = PostgresKnowledgeRepository::new(pool.clone());
    let project = saved_project(&pool, "Knowledge Project").await;

    let mut conflict = ConflictResolution::new(
        project.id(),
        "dev-001".to_string(),
        "arch-001".to_string(),
        "technical".to_string(),
        "ORM choice".to_string(),
    )
    .unwrap();
    repo.save_conflict(&conflict).await.unwrap();
    conflict
        .resolve("rule_based", "Defer to architect", "Owns the architecture", "manager-001")
        .unwrap();
    repo.save_conflict(&conflict).await.unwrap();

    let stored = repo.find_conflicts_by_project(project.id()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].is_resolved());
    assert_eq!(stored[0].resolution_method(), "rule_based");

    let knowledge_type = format!("procedure-{}", Uuid::new_v4());
    let mut entry = SharedKnowledge::new(
        knowledge_type.clone(),
        "Deploy checklist".to_string(),
        json!({"steps": ["build", "ship"]}),
        Some(project.id()),
        vec!["api".to_string()],
        vec!["project_experience".to_string()],
        Some("dev-001".to_string()),
    )
    .unwrap();
    repo.save_knowledge(&entry).await.unwrap();
    entry.record_usage(true);
    repo.save_knowledge(&entry).await.unwrap();

    let found = repo.find_knowledge_by_id(entry.id()).await.unwrap().expect("knowledge exists");
    assert_eq!(found.usage_count(), 1);
    assert_eq!(found.source_project_id(), Some(project.id()));
    assert_eq!(found.tags(), ["project_experience".to_string()]);
    assert_eq!(repo.find_knowledge_by_type(&knowledge_type).await.unwrap().len(), 1);

    cleanup_project(&pool, project.id()).await;
    assert!(repo.find_conflicts_by_project(project.id()).await.unwrap().is_empty());
    let orphaned = repo.find_knowledge_by_id(entry.id()).await.unwrap().expect("knowledge survives");
    assert_eq!(orphaned.source_project_id(), None);

    sqlx::query("DELETE FROM shared_knowledge WHERE id = $1")
        .bind(entry.id())
        .execute(&pool)
        .await
        .unwrap();
}
