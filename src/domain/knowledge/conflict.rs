use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A disagreement between two agents and, once settled, how it was settled
///
/// # Invariants
/// - The two agents must differ
/// - A conflict is resolved at most once
#[derive(Debug, Clone)]
pub struct ConflictResolution {
    id: Uuid,
    project_id: Uuid,
    agent1_id: String,
    agent2_id: String,
    conflict_type: String,
    description: String,
    resolution_method: String,
    decision: String,
    rationale: String,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
}

impl ConflictResolution {
    pub fn new(
        project_id: Uuid,
        agent1_id: String,
        agent2_id: String,
        conflict_type: String,
        description: String,
    ) -> Result<Self, String> {
        if agent1_id.trim().is_empty() || agent2_id.trim().is_empty() {
            return Err("Both agents must be named".to_string());
        }
        if agent1_id == agent2_id {
            return Err("An agent cannot conflict with itself".to_string());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            project_id,
            agent1_id,
            agent2_id,
            conflict_type,
            description,
            resolution_method: String::new(),
            decision: String::new(),
            rationale: String::new(),
            created_at: Utc::now(),
            resolved_at: None,
            resolved_by: None,
        })
    }

    pub fn resolve(
        &mut self,
        method: impl Into<String>,
        decision: impl Into<String>,
        rationale: impl Into<String>,
        resolved_by: impl Into<String>,
    ) -> Result<(), String> {
        if self.is_resolved() {
            return Err(format!("Conflict {} is already resolved", self.id));
        }

        self.resolution_method = method.into();
        self.decision = decision.into();
        self.rationale = rationale.into();
        self.resolved_by = Some(resolved_by.into());
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn project_id(&self) -> Uuid {
        self.project_id
    }

    pub fn agent1_id(&self) -> &str {
        &self.agent1_id
    }

    pub fn agent2_id(&self) -> &str {
        &self.agent2_id
    }

    pub fn conflict_type(&self) -> &str {
        &self.conflict_type
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn resolution_method(&self) -> &str {
        &self.resolution_method
    }

    pub fn decision(&self) -> &str {
        &self.decision
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn resolved_by(&self) -> Option<&str> {
        self.resolved_by.as_deref()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        project_id: Uuid,
        agent1_id: String,
        agent2_id: String,
        conflict_type: String,
        description: String,
        resolution_method: String,
        decision: String,
        rationale: String,
        created_at: DateTime<Utc>,
        resolved_at: Option<DateTime<Utc>>,
        resolved_by: Option<String>,
    ) -> Self {
        Self {
            id,
            project_id,
            agent1_id,
            agent2_id,
            conflict_type,
            description,
            resolution_method,
            decision,
            rationale,
            created_at,
            resolved_at,
            resolved_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> ConflictResolution {
        ConflictResolution::new(
            Uuid::new_v4(),
            "pm-001".to_string(),
            "arch-001".to_string(),
            "technical".to_string(),
            "REST vs GraphQL".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn resolves_once() {
        let mut c = conflict();
        assert!(!c.is_resolved());

        c.resolve("rule_based", "Use REST", "Architect owns API style", "manager-001")
            .unwrap();
        assert!(c.is_resolved());
        assert_eq!(c.resolved_by(), Some("manager-001"));
        assert_eq!(c.decision(), "Use REST");

        assert!(c.resolve("ai_mediated", "x", "y", "manager-001").is_err());
    }

    #[test]
    fn self_conflict_rejected() {
        let result = ConflictResolution::new(
            Uuid::new_v4(),
            "dev-001".to_string(),
            "dev-001".to_string(),
            "priority".to_string(),
            String::new(),
        );
        assert!(result.is_err());
    }
}
