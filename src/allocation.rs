// Agent allocation across concurrently running projects

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Settings;
use crate::domain::agent::AgentRole;

/// Total allocation at which an agent counts as underused
const UNDERUSED_BELOW: f64 = 0.7;

#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("Maximum concurrent projects ({0}) reached")]
    ProjectLimitReached(usize),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project {0} is already tracked")]
    AlreadyTracked(String),

    #[error("Agent {agent_id} ({role}) has no capacity left")]
    OverCapacity { agent_id: String, role: AgentRole },

    #[error("Project {project_id} already has {max} agents")]
    TeamFull { project_id: String, max: usize },

    #[error("Allocation must be within (0, 1], got {0}")]
    InvalidAllocation(f64),

    #[error("Project {0} is not paused")]
    NotPaused(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl ProjectPriority {
    /// Unknown labels fall back to `Medium`
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationState {
    Active,
    Paused,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentAllocation {
    pub agent_id: String,
    pub project_id: String,
    pub role: AgentRole,
    /// Share of the agent's time, 0..=1
    pub allocation: f64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AgentAllocation {
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackedProject {
    pub project_id: String,
    pub name: String,
    pub priority: ProjectPriority,
    pub state: AllocationState,
    pub team: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentWorkload {
    pub agent_id: String,
    pub total_allocation: f64,
    pub is_overallocated: bool,
    pub current_project: Option<String>,
    pub projects: Vec<AgentAllocation>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AllocationReport {
    pub overallocated_agents: Vec<String>,
    pub underused_agents: Vec<(String, f64)>,
    pub missing_roles: Vec<(String, Vec<AgentRole>)>,
}

/// Keeps track of which agents work on which project and how much
#[derive(Debug)]
pub struct ProjectAllocator {
    max_projects: usize,
    max_agents_per_project: usize,
    projects: HashMap<String, TrackedProject>,
    allocations: HashMap<String, Vec<AgentAllocation>>,
    current_project: HashMap<String, String>,
}

impl ProjectAllocator {
    pub fn new(max_projects: usize, max_agents_per_project: usize) -> Self {
        Self {
            max_projects,
            max_agents_per_project,
            projects: HashMap::new(),
            allocations: HashMap::new(),
            current_project: HashMap::new(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.max_concurrent_projects, settings.max_agents_per_project)
    }

    pub fn track_project(
        &mut self,
        project_id: &str,
        name: &str,
        priority: ProjectPriority,
    ) -> Result<(), AllocationError> {
        if self.projects.contains_key(project_id) {
            return Err(AllocationError::AlreadyTracked(project_id.to_string()));
        }
        if self.projects.len() >= self.max_projects {
            warn!(project_id, limit = self.max_projects, "Project limit reached");
            return Err(AllocationError::ProjectLimitReached(self.max_projects));
        }

        self.projects.insert(
            project_id.to_string(),
            TrackedProject {
                project_id: project_id.to_string(),
                name: name.to_string(),
                priority,
                state: AllocationState::Active,
                team: Vec::new(),
                created_at: Utc::now(),
            },
        );
        info!(project_id, name, "Tracking project");
        Ok(())
    }

    /// Stops tracking a project and ends every allocation to it
    pub fn release_project(&mut self, project_id: &str) -> bool {
        let Some(project) = self.projects.remove(project_id) else {
            return false;
        };
        for agent_id in &project.team {
            self.end_allocation(agent_id, project_id);
        }
        true
    }

    pub fn assign_agent(
        &mut self,
        project_id: &str,
        agent_id: &str,
        role: AgentRole,
        allocation: f64,
    ) -> Result<(), AllocationError> {
        if !(allocation > 0.0 && allocation <= 1.0) {
            return Err(AllocationError::InvalidAllocation(allocation));
        }

        let project = self
            .projects
            .get(project_id)
            .ok_or_else(|| AllocationError::ProjectNotFound(project_id.to_string()))?;
        let already_member = project.team.iter().any(|a| a == agent_id);

        if !already_member && project.team.len() >= self.max_agents_per_project {
            warn!(project_id, agent_id, "Project team is full");
            return Err(AllocationError::TeamFull {
                project_id: project_id.to_string(),
                max: self.max_agents_per_project,
            });
        }

        let capacity = role.project_capacity() as f64;
        if self.total_allocation(agent_id) + allocation > capacity {
            warn!(agent_id, role = role.as_str(), "Agent over capacity");
            return Err(AllocationError::OverCapacity {
                agent_id: agent_id.to_string(),
                role,
            });
        }

        if let Some(project) = self.projects.get_mut(project_id) {
            if !already_member {
                project.team.push(agent_id.to_string());
            }
        }
        self.allocations
            .entry(agent_id.to_string())
            .or_default()
            .push(AgentAllocation {
                agent_id: agent_id.to_string(),
                project_id: project_id.to_string(),
                role,
                allocation,
                start_date: Utc::now(),
                end_date: None,
            });
        self.current_project
            .entry(agent_id.to_string())
            .or_insert_with(|| project_id.to_string());

        info!(project_id, agent_id, allocation, "Assigned agent to project");
        Ok(())
    }

    pub fn remove_agent(&mut self, project_id: &str, agent_id: &str) -> bool {
        let Some(project) = self.projects.get_mut(project_id) else {
            return false;
        };
        project.team.retain(|a| a != agent_id);
        self.end_allocation(agent_id, project_id);
        info!(project_id, agent_id, "Removed agent from project");
        true
    }

    /// Moves an agent's focus to another project it is allocated to
    pub fn switch_agent(&mut self, agent_id: &str, to_project: &str) -> Result<Option<String>, AllocationError> {
        let allocated = self
            .active_allocations(agent_id)
            .any(|a| a.project_id == to_project);
        if !self.projects.contains_key(to_project) || !allocated {
            return Err(AllocationError::ProjectNotFound(to_project.to_string()));
        }

        let previous = self
            .current_project
            .insert(agent_id.to_string(), to_project.to_string());
        info!(agent_id, from = ?previous, to = to_project, "Switched agent project");
        Ok(previous)
    }

    pub fn workload(&self, agent_id: &str) -> AgentWorkload {
        let projects: Vec<AgentAllocation> = self.active_allocations(agent_id).cloned().collect();
        let total = projects.iter().map(|a| a.allocation).sum::<f64>();
        AgentWorkload {
            agent_id: agent_id.to_string(),
            total_allocation: total,
            is_overallocated: total > 1.0,
            current_project: self.current_project.get(agent_id).cloned(),
            projects,
        }
    }

    pub fn pause_project(&mut self, project_id: &str) -> Result<(), AllocationError> {
        let project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| AllocationError::ProjectNotFound(project_id.to_string()))?;
        project.state = AllocationState::Paused;
        info!(project_id, "Paused project allocation");
        Ok(())
    }

    pub fn resume_project(&mut self, project_id: &str) -> Result<(), AllocationError> {
        let project = self
            .projects
            .get_mut(project_id)
            .ok_or_else(|| AllocationError::ProjectNotFound(project_id.to_string()))?;
        if project.state != AllocationState::Paused {
            return Err(AllocationError::NotPaused(project_id.to_string()));
        }
        project.state = AllocationState::Active;
        info!(project_id, "Resumed project allocation");
        Ok(())
    }

    pub fn project(&self, project_id: &str) -> Option<&TrackedProject> {
        self.projects.get(project_id)
    }

    /// Tracked projects, most urgent first
    pub fn list_projects(&self) -> Vec<&TrackedProject> {
        let mut projects: Vec<&TrackedProject> = self.projects.values().collect();
        projects.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        projects
    }

    /// Flags overallocated and underused agents, and projects lacking a
    /// role from `required`
    pub fn report(&self, required: &[AgentRole]) -> AllocationReport {
        let mut report = AllocationReport::default();

        let mut agents: Vec<&String> = self.allocations.keys().collect();
        agents.sort();
        for agent_id in agents {
            let total = self.total_allocation(agent_id);
            if total > 1.0 {
                report.overallocated_agents.push(agent_id.clone());
            } else if total < UNDERUSED_BELOW {
                report.underused_agents.push((agent_id.clone(), 1.0 - total));
            }
        }

        for project in self.list_projects() {
            let roles: Vec<AgentRole> = project
                .team
                .iter()
                .filter_map(|a| {
                    self.active_allocations(a)
                        .find(|al| al.project_id == project.project_id)
                        .map(|al| al.role)
                })
                .collect();
            let missing: Vec<AgentRole> = required.iter().copied().filter(|r| !roles.contains(r)).collect();
            if !missing.is_empty() {
                report.missing_roles.push((project.project_id.clone(), missing));
            }
        }

        report
    }

    fn active_allocations<'a>(&'a self, agent_id: &str) -> impl Iterator<Item = &'a AgentAllocation> + 'a {
        self.allocations
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter(|a| a.is_active())
    }

    fn total_allocation(&self, agent_id: &str) -> f64 {
        self.active_allocations(agent_id).map(|a| a.allocation).sum()
    }

    fn end_allocation(&mut self, agent_id: &str, project_id: &str) {
        let now = Utc::now();
        if let Some(list) = self.allocations.get_mut(agent_id) {
            for allocation in list
                .iter_mut()
                .filter(|a| a.project_id == project_id && a.is_active())
            {
                allocation.end_date = Some(now);
            }
        }
        if self.current_project.get(agent_id).map(String::as_str) == Some(project_id) {
            let next = self
                .active_allocations(agent_id)
                .next()
                .map(|a| a.project_id.clone());
            match next {
                Some(p) => {
                    self.current_project.insert(agent_id.to_string(), p);
                }
                None => {
                    self.current_project.remove(agent_id);
                }
            }
        }
    }
}
