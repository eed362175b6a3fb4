use serde::{Deserialize, Serialize};

/// Role an agent plays on the team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "agent_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Manager,
    Pm,
    Architect,
    Developer,
    Qa,
    Ui,
    Scrum,
    Reviewer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 8] = [
        AgentRole::Manager,
        AgentRole::Pm,
        AgentRole::Architect,
        AgentRole::Developer,
        AgentRole::Qa,
        AgentRole::Ui,
        AgentRole::Scrum,
        AgentRole::Reviewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Manager => "manager",
            AgentRole::Pm => "pm",
            AgentRole::Architect => "architect",
            AgentRole::Developer => "developer",
            AgentRole::Qa => "qa",
            AgentRole::Ui => "ui",
            AgentRole::Scrum => "scrum",
            AgentRole::Reviewer => "reviewer",
        }
    }

    /// Parses a role name, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        let lower = value.trim().to_lowercase();
        Self::ALL.into_iter().find(|role| role.as_str() == lower)
    }

    /// How many projects an agent of this role can serve at once
    pub fn project_capacity(&self) -> usize {
        match self {
            AgentRole::Manager => 3,
            AgentRole::Pm => 2,
            AgentRole::Architect => 2,
            AgentRole::Developer => 1,
            AgentRole::Qa => 2,
            AgentRole::Ui => 2,
            AgentRole::Scrum => 5,
            AgentRole::Reviewer => 3,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Runtime status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "agent_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Waiting,
    Error,
    Offline,
}

impl AgentStatus {
    /// Whether the agent can pick up new work
    pub fn is_available(&self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Waiting)
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Working => write!(f, "working"),
            AgentStatus::Waiting => write!(f, "waiting"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(AgentRole::parse("PM"), Some(AgentRole::Pm));
        assert_eq!(AgentRole::parse(" architect "), Some(AgentRole::Architect));
        assert_eq!(AgentRole::parse("devops"), None);
    }

    #[test]
    fn every_role_round_trips_through_its_name() {
        for role in AgentRole::ALL {
            assert_eq!(AgentRole::parse(role.as_str()), Some(role));
        }
    }

    #[test]
    fn developers_focus_on_one_project() {
        assert_eq!(AgentRole::Developer.project_capacity(), 1);
        assert_eq!(AgentRole::Scrum.project_capacity(), 5);
    }

    #[test]
    fn availability() {
        assert!(AgentStatus::Idle.is_available());
        assert!(!AgentStatus::Working.is_available());
        assert!(!AgentStatus::Offline.is_available());
    }
}
