use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::agent::{AgentOutput, AgentProfile, AgentRole};
use crate::domain::knowledge::{ConflictResolution, SharedKnowledge};
use crate::domain::operator::Email;
use crate::domain::project::{Project, ProjectStatus};
use crate::domain::repositories::{
    AgentOutputRepository, AgentRepository, KnowledgeRepository, Operator, OperatorRepository,
    ProjectRepository, SprintRepository, TaskRepository,
};
use crate::domain::sprint::Sprint;
use crate::domain::task::Task;

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    sprints: HashMap<Uuid, Sprint>,
    tasks: HashMap<Uuid, Task>,
    agents: HashMap<String, AgentProfile>,
    outputs: HashMap<Uuid, AgentOutput>,
    conflicts: HashMap<Uuid, ConflictResolution>,
    knowledge: HashMap<Uuid, SharedKnowledge>,
    operators: HashMap<Uuid, Operator>,
}

/// Process-local store implementing every repository port
///
/// Mirrors the Postgres schema's constraints: foreign keys on insert,
/// unique sprint numbers per project, unique operator emails, and cascading
/// project deletes. Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryStore {
    async fn save(&self, project: &Project) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        tables.projects.insert(project.id(), project.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, String> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Project>, String> {
        let tables = self.tables.read().await;
        let mut projects: Vec<Project> = tables.projects.values().cloned().collect();
        projects.sort_by_key(|p| std::cmp::Reverse(p.created_at()));
        Ok(projects)
    }

    async fn find_by_status(&self, status: ProjectStatus) -> Result<Vec<Project>, String> {
        let all = ProjectRepository::find_all(self).await?;
        Ok(all.into_iter().filter(|p| p.status() == status).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        if tables.projects.remove(&id).is_none() {
            return Err(format!("Project not found: {}", id));
        }

        tables.sprints.retain(|_, s| s.project_id() != id);
        tables.tasks.retain(|_, t| t.project_id() != id);
        tables.outputs.retain(|_, o| o.project_id() != id);
        tables.conflicts.retain(|_, c| c.project_id() != id);
        Ok(())
    }
}

#[async_trait]
impl SprintRepository for InMemoryStore {
    async fn save(&self, sprint: &Sprint) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&sprint.project_id()) {
            return Err(format!("Project not found: {}", sprint.project_id()));
        }

        let duplicate = tables.sprints.values().any(|s| {
            s.id() != sprint.id()
                && s.project_id() == sprint.project_id()
                && s.sprint_number() == sprint.sprint_number()
        });
        if duplicate {
            return Err(format!(
                "Sprint number {} is a duplicate for project {}",
                sprint.sprint_number(),
                sprint.project_id()
            ));
        }

        tables.sprints.insert(sprint.id(), sprint.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Sprint>, String> {
        Ok(self.tables.read().await.sprints.get(&id).cloned())
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Sprint>, String> {
        let tables = self.tables.read().await;
        let mut sprints: Vec<Sprint> = tables
            .sprints
            .values()
            .filter(|s| s.project_id() == project_id)
            .cloned()
            .collect();
        sprints.sort_by_key(|s| s.sprint_number());
        Ok(sprints)
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn save(&self, task: &Task) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&task.project_id()) {
            return Err(format!("Project not found: {}", task.project_id()));
        }
        if let Some(sprint_id) = task.sprint_id() {
            if !tables.sprints.contains_key(&sprint_id) {
                return Err(format!("Sprint not found: {}", sprint_id));
            }
        }

        tables.tasks.insert(task.id(), task.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, String> {
        Ok(self.tables.read().await.tasks.get(&id).cloned())
    }

    async fn find_by_sprint(&self, sprint_id: Uuid) -> Result<Vec<Task>, String> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.sprint_id() == Some(sprint_id))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then(a.created_at().cmp(&b.created_at()))
        });
        Ok(tasks)
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Task>, String> {
        let tables = self.tables.read().await;
        let mut tasks: Vec<Task> = tables
            .tasks
            .values()
            .filter(|t| t.project_id() == project_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at());
        Ok(tasks)
    }
}

#[async_trait]
impl AgentRepository for InMemoryStore {
    async fn save(&self, agent: &AgentProfile) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        tables.agents.insert(agent.id().to_string(), agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AgentProfile>, String> {
        Ok(self.tables.read().await.agents.get(id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<AgentProfile>, String> {
        let tables = self.tables.read().await;
        let mut agents: Vec<AgentProfile> = tables.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(agents)
    }

    async fn find_by_role(&self, role: AgentRole) -> Result<Vec<AgentProfile>, String> {
        let all = AgentRepository::find_all(self).await?;
        Ok(all.into_iter().filter(|a| a.role() == role).collect())
    }
}

#[async_trait]
impl AgentOutputRepository for InMemoryStore {
    async fn save(&self, output: &AgentOutput) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        if !tables.agents.contains_key(output.agent_id()) {
            return Err(format!("Agent not found: {}", output.agent_id()));
        }
        if !tables.projects.contains_key(&output.project_id()) {
            return Err(format!("Project not found: {}", output.project_id()));
        }

        tables.outputs.insert(output.id(), output.clone());
        Ok(())
    }

    async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<AgentOutput>, String> {
        let tables = self.tables.read().await;
        let mut outputs: Vec<AgentOutput> = tables
            .outputs
            .values()
            .filter(|o| o.project_id() == project_id)
            .cloned()
            .collect();
        outputs.sort_by_key(|o| o.created_at());
        Ok(outputs)
    }

    async fn find_by_agent(&self, agent_id: &str) -> Result<Vec<AgentOutput>, String> {
        let tables = self.tables.read().await;
        let mut outputs: Vec<AgentOutput> = tables
            .outputs
            .values()
            .filter(|o| o.agent_id() == agent_id)
            .cloned()
            .collect();
        outputs.sort_by_key(|o| o.created_at());
        Ok(outputs)
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryStore {
    async fn save_conflict(&self, conflict: &ConflictResolution) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&conflict.project_id()) {
            return Err(format!("Project not found: {}", conflict.project_id()));
        }

        tables.conflicts.insert(conflict.id(), conflict.clone());
        Ok(())
    }

    async fn find_conflicts_by_project(
        &self,
        project_id: Uuid,
    ) -> Result<Vec<ConflictResolution>, String> {
        let tables = self.tables.read().await;
        let mut conflicts: Vec<ConflictResolution> = tables
            .conflicts
            .values()
            .filter(|c| c.project_id() == project_id)
            .cloned()
            .collect();
        conflicts.sort_by_key(|c| c.created_at());
        Ok(conflicts)
    }

    async fn save_knowledge(&self, knowledge: &SharedKnowledge) -> Result<(), String> {
        let mut tables = self.tables.write().await;
        tables.knowledge.insert(knowledge.id(), knowledge.clone());
        Ok(())
    }

    async fn find_knowledge_by_id(&self, id: Uuid) -> Result<Option<SharedKnowledge>, String> {
        Ok(self.tables.read().await.knowledge.get(&id).cloned())
    }

    async fn find_knowledge_by_type(
        &self,
        knowledge_type: &str,
    ) -> Result<Vec<SharedKnowledge>, String> {
        let tables = self.tables.read().await;
        let mut entries: Vec<SharedKnowledge> = tables
            .knowledge
            .values()
            .filter(|k| k.knowledge_type() == knowledge_type)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            b.effectiveness_score()
                .total_cmp(&a.effectiveness_score())
                .then(b.usage_count().cmp(&a.usage_count()))
        });
        Ok(entries)
    }
}

#[async_trait]
impl OperatorRepository for InMemoryStore {
    async fn create(&self, operator: Operator) -> Result<Uuid, String> {
        let mut tables = self.tables.write().await;
        if tables.operators.values().any(|o| o.email == operator.email) {
            return Err(format!("duplicate email: {}", operator.email));
        }

        let id = operator.id;
        tables.operators.insert(id, operator);
        Ok(id)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Operator>, String> {
        Ok(self.tables.read().await.operators.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Operator>, String> {
        let tables = self.tables.read().await;
        Ok(tables.operators.values().find(|o| &o.email == email).cloned())
    }

    async fn update_last_login(&self, operator_id: Uuid) -> Result<(), String> {
        if !self.tables.read().await.operators.contains_key(&operator_id) {
            return Err(format!("Operator not found: {}", operator_id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn project(name: &str) -> Project {
        let (project, _) = Project::new(
            name.to_string(),
            "desc".to_string(),
            "web".to_string(),
            json!({}),
            json!({}),
            None,
        )
        .unwrap();
        project
    }

    #[tokio::test]
    async fn deleting_a_project_cascades() {
        let store = InMemoryStore::new();
        let p = project("Shop");
        ProjectRepository::save(&store, &p).await.unwrap();

        let sprint = Sprint::new(p.id(), 1, "Sprint 1".to_string(), "MVP".to_string()).unwrap();
        SprintRepository::save(&store, &sprint).await.unwrap();

        let task = Task::new(
            p.id(),
            Some(sprint.id()),
            "Login".to_string(),
            String::new(),
            "feature".to_string(),
            None,
            None,
        )
        .unwrap();
        TaskRepository::save(&store, &task).await.unwrap();

        ProjectRepository::delete(&store, p.id()).await.unwrap();

        assert!(SprintRepository::find_by_id(&store, sprint.id())
            .await
            .unwrap()
            .is_none());
        assert!(TaskRepository::find_by_id(&store, task.id())
            .await
            .unwrap()
            .is_none());
        assert!(ProjectRepository::delete(&store, p.id()).await.is_err());
    }

    #[tokio::test]
    async fn sprint_numbers_are_unique_per_project() {
        let store = InMemoryStore::new();
        let p = project("Shop");
        ProjectRepository::save(&store, &p).await.unwrap();

        let first = Sprint::new(p.id(), 1, "One".to_string(), String::new()).unwrap();
        let again = Sprint::new(p.id(), 1, "Again".to_string(), String::new()).unwrap();
        SprintRepository::save(&store, &first).await.unwrap();

        let err = SprintRepository::save(&store, &again).await.unwrap_err();
        assert!(err.contains("duplicate"));

        // re-saving the same sprint is an update, not a duplicate
        SprintRepository::save(&store, &first).await.unwrap();
    }

    #[tokio::test]
    async fn sprint_requires_existing_project() {
        let store = InMemoryStore::new();
        let orphan = Sprint::new(Uuid::new_v4(), 1, "One".to_string(), String::new()).unwrap();
        assert!(SprintRepository::save(&store, &orphan).await.is_err());
    }

    #[tokio::test]
    async fn operator_emails_are_unique() {
        let store = InMemoryStore::new();
        let operator = Operator {
            id: Uuid::new_v4(),
            email: Email::new("lead@example.com").unwrap(),
            password_hash: "hash".to_string(),
            display_name: "Lead".to_string(),
            is_active: true,
        };
        let mut clash = operator.clone();
        clash.id = Uuid::new_v4();

        store.create(operator).await.unwrap();
        assert!(store.create(clash).await.unwrap_err().contains("duplicate"));
    }

    #[tokio::test]
    async fn conflicts_and_knowledge_round_trip() {
        let store = InMemoryStore::new();
        let p = project("Shop");
        ProjectRepository::save(&store, &p).await.unwrap();

        let mut conflict = ConflictResolution::new(
            p.id(),
            "dev-001".to_string(),
            "arch-001".to_string(),
            "technical".to_string(),
            "ORM choice".to_string(),
        )
        .unwrap();
        conflict
            .resolve("rule_based", "Defer to architect", "Owns the architecture", "manager-001")
            .unwrap();
        store.save_conflict(&conflict).await.unwrap();

        let orphan = ConflictResolution::new(
            Uuid::new_v4(),
            "pm-001".to_string(),
            "qa-001".to_string(),
            "priority".to_string(),
            String::new(),
        )
        .unwrap();
        assert!(store.save_conflict(&orphan).await.is_err());

        let stored = store.find_conflicts_by_project(p.id()).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].resolved_by(), Some("manager-001"));

        let mut weak = SharedKnowledge::new(
            "procedure".to_string(),
            "Deploy checklist".to_string(),
            json!({"steps": ["build", "ship"]}),
            Some(p.id()),
            vec!["web".to_string()],
            vec![],
            Some("dev-001".to_string()),
        )
        .unwrap();
        weak.record_usage(false);
        let strong = SharedKnowledge::new(
            "procedure".to_string(),
            "Rollback checklist".to_string(),
            json!({}),
            None,
            vec![],
            vec![],
            None,
        )
        .unwrap();
        store.save_knowledge(&weak).await.unwrap();
        store.save_knowledge(&strong).await.unwrap();

        let ranked = store.find_knowledge_by_type("procedure").await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].title(), "Rollback checklist");

        // saving again replaces the entry
        weak.record_usage(true);
        store.save_knowledge(&weak).await.unwrap();
        let found = store.find_knowledge_by_id(weak.id()).await.unwrap().unwrap();
        assert_eq!(found.usage_count(), 2);
        assert!(store.find_knowledge_by_type("pattern").await.unwrap().is_empty());

        ProjectRepository::delete(&store, p.id()).await.unwrap();
        assert!(store.find_conflicts_by_project(p.id()).await.unwrap().is_empty());
    }
}
