use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use super::base::{array_field, is_success, is_truthy, str_field, task_kind, Agent, AgentContext, AgentCore};
use super::errors::{AgentError, AgentResult};
use super::prompts::{library, PromptTemplate};
use crate::domain::agent::AgentRole;

/// Score at which validated work is approved
pub const APPROVAL_THRESHOLD: f64 = 0.8;

const SPRINT_DAYS: u32 = 10;

const RESULT_KEYS: [&str; 6] = [
    "coordination_result",
    "validation_result",
    "conflict_resolution",
    "assignment",
    "sprint_plan",
    "project_plan",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    Technical,
    Priority,
    Approach,
    Resource,
    Timeline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    Medium,
    Low,
}

/// Extra check applied on top of the required fields for some roles
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoleCheck {
    MinStoryCount(usize),
    MinTestCoverage(f64),
    MinPassRate(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityStandard {
    pub required_fields: &'static [&'static str],
    pub role_check: Option<RoleCheck>,
}

/// Quality bar a role's deliverables are held to
pub fn quality_standard(role: &str) -> Option<QualityStandard> {
    let standard = match role.to_lowercase().as_str() {
        "pm" => QualityStandard {
            required_fields: &["user_stories", "acceptance_criteria", "priority"],
            role_check: Some(RoleCheck::MinStoryCount(3)),
        },
        "architect" => QualityStandard {
            required_fields: &["tech_stack", "architecture_diagram", "api_design"],
            role_check: None,
        },
        "developer" => QualityStandard {
            required_fields: &["code", "tests", "documentation"],
            role_check: Some(RoleCheck::MinTestCoverage(0.8)),
        },
        "qa" => QualityStandard {
            required_fields: &["test_cases", "test_results", "bug_report"],
            role_check: Some(RoleCheck::MinPassRate(0.95)),
        },
        "ui" => QualityStandard {
            required_fields: &["design_specs", "components", "style_guide"],
            role_check: None,
        },
        _ => return None,
    };
    Some(standard)
}

/// Scores a deliverable against its role's standard
///
/// Required fields weigh 0.4, the role check 0.3 and general completeness
/// 0.3; the total is normalised by the weights that applied.
pub fn score_output(output: &Value, role: &str) -> Value {
    let mut score = 0.0;
    let mut max_score = 0.0;
    let mut details = Vec::new();
    let standard = quality_standard(role);

    if let Some(standard) = &standard {
        let present = standard
            .required_fields
            .iter()
            .filter(|field| {
                let ok = output.get(**field).map(is_truthy).unwrap_or(false);
                details.push(if ok {
                    format!("Required field '{field}' present")
                } else {
                    format!("Missing required field '{field}'")
                });
                ok
            })
            .count();
        score += present as f64 / standard.required_fields.len() as f64 * 0.4;
        max_score += 0.4;

        if let Some(check) = standard.role_check {
            let passed = match check {
                RoleCheck::MinStoryCount(min) => {
                    let count = array_field(output, "user_stories").len();
                    details.push(format!("User stories: {count} (minimum {min})"));
                    count >= min
                }
                RoleCheck::MinTestCoverage(min) => {
                    let coverage = output.get("test_coverage").and_then(Value::as_f64).unwrap_or(0.0);
                    details.push(format!("Test coverage: {:.1}% (minimum {:.1}%)", coverage * 100.0, min * 100.0));
                    coverage >= min
                }
                RoleCheck::MinPassRate(min) => {
                    let rate = output.get("pass_rate").and_then(Value::as_f64).unwrap_or(0.0);
                    details.push(format!("Pass rate: {:.1}% (minimum {:.1}%)", rate * 100.0, min * 100.0));
                    rate >= min
                }
            };
            if passed {
                score += 0.3;
            }
            max_score += 0.3;
        }
    }

    let general = general_quality(output);
    score += general * 0.3;
    max_score += 0.3;
    details.push(format!("General quality score: {general:.2}"));

    let final_score = if max_score > 0.0 { score / max_score } else { 0.0 };
    json!({
        "score": final_score,
        "details": details,
        "pass": final_score >= APPROVAL_THRESHOLD,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

fn general_quality(output: &Value) -> f64 {
    match output.as_object() {
        Some(map) if !map.is_empty() => {
            let filled = map.values().filter(|v| is_truthy(v)).count();
            (filled as f64 / map.len() as f64 + 0.2).min(1.0)
        }
        _ => 0.0,
    }
}

/// Agent id responsible for a kind of work
pub fn agent_for_task_type(task_type: &str) -> Option<&'static str> {
    match task_type {
        "requirements" => Some("pm-001"),
        "architecture" => Some("arch-001"),
        "development" => Some("dev-001"),
        "testing" => Some("qa-001"),
        "ui_design" => Some("ui-001"),
        "code_review" => Some("reviewer-001"),
        _ => None,
    }
}

/// Complexity band from requirement count, budget and project type
pub fn assess_project_complexity(project_info: &Value) -> &'static str {
    let requirements = array_field(project_info, "requirements").len();
    let budget = project_info.get("budget").and_then(Value::as_f64).unwrap_or(0.0);
    let project_type = str_field(project_info, "type", "web");

    if requirements > 10 || budget > 1_000_000.0 || matches!(project_type, "enterprise" | "platform") {
        "high"
    } else if requirements > 5 || budget > 500_000.0 {
        "medium"
    } else {
        "low"
    }
}

/// Coordinates the rest of the team
pub struct ManagerAgent {
    core: AgentCore,
    active_tasks: HashMap<String, Value>,
    conflict_history: Vec<Value>,
    project_plans: HashMap<String, Value>,
    validations: Vec<Value>,
}

impl ManagerAgent {
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            active_tasks: HashMap::new(),
            conflict_history: Vec::new(),
            project_plans: HashMap::new(),
            validations: Vec::new(),
        }
    }

    pub fn with_id(id: &str, context_max_tokens: usize) -> Self {
        Self::new(AgentCore::new(id, AgentRole::Manager, "deepseek", context_max_tokens))
    }

    pub fn conflict_history(&self, project_id: Option<&str>) -> Vec<&Value> {
        self.conflict_history
            .iter()
            .filter(|c| project_id.map_or(true, |p| str_field(c, "project_id", "") == p))
            .collect()
    }

    pub fn active_tasks(&self, agent_id: Option<&str>) -> Vec<&Value> {
        self.active_tasks
            .values()
            .filter(|t| agent_id.map_or(true, |a| str_field(t, "assigned_to", "") == a))
            .collect()
    }

    pub fn project_plan(&self, project_id: &str) -> Option<&Value> {
        self.project_plans.get(project_id)
    }

    pub fn validations(&self) -> &[Value] {
        &self.validations
    }

    fn coordinate_team(&self, task: &Value) -> Value {
        let coordination_type = str_field(task, "coordination_type", "daily_standup");
        if coordination_type != "daily_standup" {
            return json!({
                "status": "success",
                "coordination_result": {
                    "type": coordination_type,
                    "message": "Team coordination completed",
                },
            });
        }

        let statuses = task
            .get("agent_statuses")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        json!({
            "status": "success",
            "coordination_result": {
                "type": "daily_standup",
                "blockers": identify_blockers(&statuses),
                "priorities": determine_priorities(&statuses),
                "agent_statuses": statuses,
                "timestamp": Utc::now().to_rfc3339(),
            },
        })
    }

    fn validate_work(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        let agent_id = str_field(task, "agent_id", "");
        let output = task.get("output").filter(|o| is_truthy(o));
        let Some(output) = output.filter(|_| !agent_id.is_empty()) else {
            return Err(AgentError::InvalidInput("Missing agent_id or output".to_string()));
        };
        let role = str_field(task, "agent_role", "").to_lowercase();

        let result = score_output(output, &role);
        let score = result["score"].as_f64().unwrap_or(0.0);
        info!(agent_id, score, "Validation result");

        self.validations.push(json!({
            "agent_id": agent_id,
            "project_id": ctx.project_id,
            "score": score,
        }));

        Ok(json!({
            "status": "success",
            "approved": score >= APPROVAL_THRESHOLD,
            "validation_result": result,
        }))
    }

    fn resolve_conflict(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        let conflict = task.get("conflict").cloned().unwrap_or_else(|| json!({}));
        let conflict_type: ConflictType =
            serde_json::from_value(conflict.get("type").cloned().unwrap_or_else(|| json!("approach")))
                .map_err(|_| AgentError::InvalidInput(format!("Unknown conflict type: {}", conflict["type"])))?;

        let agent1 = str_field(&conflict, "agent1_id", "");
        let agent2 = str_field(&conflict, "agent2_id", "");
        info!(agent1, agent2, conflict_type = ?conflict_type, "Resolving conflict");

        let resolution = match conflict_type {
            ConflictType::Priority => json!({
                "decision": "Defer to PM Agent for priority decisions",
                "rationale": "PM Agent has primary responsibility for prioritization",
                "method": "rule_based",
            }),
            ConflictType::Technical => json!({
                "decision": "Defer to Architect Agent for technical decisions",
                "rationale": "Architect Agent has primary responsibility for technical architecture",
                "method": "rule_based",
            }),
            _ => json!({
                "decision": "Compromise solution needed - both agents should collaborate",
                "rationale": "Complex conflicts require collaborative approach",
                "method": "ai_mediated",
                "next_steps": [
                    "Schedule joint meeting",
                    "Define shared objectives",
                    "Create compromise implementation plan",
                ],
            }),
        };

        let record = json!({
            "agent1_id": agent1,
            "agent2_id": agent2,
            "type": conflict_type,
            "description": str_field(&conflict, "description", ""),
            "resolution": resolution,
            "timestamp": Utc::now().to_rfc3339(),
            "project_id": ctx.project_id,
        });
        self.core.add_decision_context(&record["resolution"]);
        self.conflict_history.push(record.clone());

        Ok(json!({"status": "success", "conflict_resolution": record}))
    }

    fn assign_task(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        let details = task.get("task_details").cloned().unwrap_or_else(|| json!({}));
        let task_type = str_field(&details, "type", "");
        let priority: TaskPriority =
            serde_json::from_value(task.get("priority").cloned().unwrap_or_else(|| json!("medium")))
                .map_err(|_| AgentError::InvalidInput(format!("Unknown priority: {}", task["priority"])))?;

        let assigned = agent_for_task_type(task_type)
            .ok_or_else(|| AgentError::InvalidInput(format!("No suitable agent for task type '{task_type}'")))?;

        let task_id = task
            .get("task_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("task-{}", Uuid::new_v4()));

        let assignment = json!({
            "task_id": task_id,
            "assigned_to": assigned,
            "task_details": details,
            "priority": priority,
            "assigned_at": Utc::now().to_rfc3339(),
            "deadline": task.get("deadline").cloned().unwrap_or(Value::Null),
            "project_id": ctx.project_id,
        });
        self.active_tasks.insert(task_id.clone(), assignment.clone());
        info!(task_id = %task_id, assigned_to = assigned, "Assigned task");

        Ok(json!({"status": "success", "assignment": assignment}))
    }

    fn plan_sprint(&self, task: &Value, ctx: &AgentContext) -> Value {
        let goal = str_field(task, "sprint_goal", "");
        let stories = array_field(task, "user_stories");

        let mut assignments: Map<String, Value> = Map::new();
        for story in stories {
            if let Some(agent) = agent_for_task_type(str_field(story, "type", "development")) {
                let bucket = assignments
                    .entry(agent.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(list) = bucket {
                    list.push(story.clone());
                }
            }
        }

        json!({
            "status": "success",
            "sprint_plan": {
                "sprint_id": format!("sprint-{}-{}", ctx.project_id, Utc::now().timestamp_millis()),
                "goal": goal,
                "stories": stories,
                "assignments": assignments,
                "timeline": sprint_timeline(stories),
                "risks": sprint_risks(stories),
                "success_criteria": [
                    format!("Sprint goal achieved: {goal}"),
                    format!("All {} user stories completed", stories.len()),
                    "No critical bugs in production",
                    "All acceptance criteria met",
                    "Code review approval for all changes",
                ],
            },
        })
    }

    fn plan_project(&mut self, task: &Value, ctx: &AgentContext) -> Value {
        let info = task.get("project_info").cloned().unwrap_or_else(|| json!({}));
        let name = str_field(&info, "name", "Unnamed Project");
        info!(project = name, "Planning project");

        let complexity = assess_project_complexity(&info);
        let project_type = str_field(&info, "type", "web");

        let mut agents = vec!["Manager", "PM", "Architect", "Developer", "QA"];
        if matches!(project_type, "mobile" | "desktop") {
            agents.push("UI");
        }
        if complexity == "high" {
            agents.extend(["DevOps", "Security"]);
        }

        let weeks = match complexity {
            "low" => 6,
            "high" => 24,
            _ => 12,
        };

        let budget = info.get("budget").and_then(Value::as_f64).unwrap_or(0.0);
        let mut risks = Vec::new();
        if array_field(&info, "requirements").len() > 15 {
            risks.push("Complex requirements may lead to scope creep");
        }
        if budget < 100_000.0 {
            risks.push("Limited budget may constrain development options");
        }
        if str_field(&info, "description", "").to_uppercase().contains("AI") {
            risks.push("AI/ML components may require specialized expertise");
        }

        let timeline = str_field(&info, "timeline", "3 months");
        let budget_label = info
            .get("budget")
            .filter(|b| !b.is_null())
            .map(|b| b.to_string())
            .unwrap_or_else(|| "allocated".to_string());

        let plan = json!({
            "project_id": ctx.project_id,
            "name": name,
            "complexity_level": complexity,
            "assigned_agents": agents,
            "estimated_timeline": {
                "estimated_weeks": weeks,
                "phases_breakdown": {
                    "planning": "1-2 weeks",
                    "development": format!("{}-{} weeks", weeks - 4, weeks - 2),
                    "testing": "1-2 weeks",
                    "deployment": "1 week",
                },
            },
            "phases": [
                {"phase": "requirements_analysis", "agent": "PM", "duration": "1-2 weeks"},
                {"phase": "architecture_design", "agent": "Architect", "duration": "1-2 weeks"},
                {"phase": "development", "agent": "Developer", "duration": "4-8 weeks"},
                {"phase": "testing", "agent": "QA", "duration": "2-3 weeks"},
                {"phase": "deployment", "agent": "DevOps", "duration": "1 week"},
            ],
            "risk_factors": risks,
            "success_criteria": [
                "All functional requirements implemented and tested",
                "Performance meets specified benchmarks",
                "User acceptance testing passed",
                format!("Project delivered within {timeline}"),
                format!("Budget maintained within {budget_label} limits"),
            ],
        });
        self.project_plans.insert(ctx.project_id.clone(), plan.clone());

        json!({
            "status": "success",
            "project_plan": plan,
            "message": format!("Project planning completed for {name}"),
        })
    }
}

fn identify_blockers(statuses: &Map<String, Value>) -> Vec<Value> {
    statuses
        .iter()
        .flat_map(|(agent_id, status)| {
            array_field(status, "blockers").iter().filter_map(Value::as_str).map(move |blocker| {
                let severity = if blocker.to_lowercase().contains("waiting") { "high" } else { "medium" };
                json!({"agent_id": agent_id, "blocker": blocker, "severity": severity})
            })
        })
        .collect()
}

fn determine_priorities(statuses: &Map<String, Value>) -> Vec<Value> {
    statuses
        .iter()
        .filter_map(|(agent_id, status)| {
            let progress = status.get("progress").and_then(Value::as_f64).unwrap_or(0.0);
            if str_field(status, "status", "") == "idle" {
                Some(json!({"agent_id": agent_id, "priority": "Assign new task", "urgency": "high"}))
            } else if progress > 0.8 {
                Some(json!({
                    "agent_id": agent_id,
                    "priority": "Prepare for task completion and handoff",
                    "urgency": "medium",
                }))
            } else {
                None
            }
        })
        .collect()
}

fn story_points(story: &Value) -> f64 {
    story.get("points").and_then(Value::as_f64).unwrap_or(1.0)
}

fn sprint_timeline(stories: &[Value]) -> Value {
    let total: f64 = stories.iter().map(story_points).sum();
    json!({
        "total_story_points": total,
        "sprint_duration_days": SPRINT_DAYS,
        "daily_velocity": total / SPRINT_DAYS as f64,
        "milestones": [
            {"day": 3, "target": "Requirements finalized"},
            {"day": 6, "target": "Development 50% complete"},
            {"day": 9, "target": "Testing complete"},
            {"day": 10, "target": "Sprint review ready"},
        ],
    })
}

fn sprint_risks(stories: &[Value]) -> Vec<Value> {
    let mut risks = Vec::new();
    let complex = stories.iter().filter(|s| story_points(s) >= 8.0).count();
    if complex > 0 {
        risks.push(json!({
            "type": "complexity",
            "description": format!("{complex} high-complexity stories may cause delays"),
            "mitigation": "Break down complex stories, add buffer time",
        }));
    }
    if stories.len() > 5 {
        risks.push(json!({
            "type": "scope",
            "description": "Large number of stories may be ambitious for one sprint",
            "mitigation": "Prioritize must-have features, defer nice-to-haves",
        }));
    }
    risks
}

#[async_trait]
impl Agent for ManagerAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process_task(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        let kind = task_kind(task, "coordinate");
        info!(agent_id = %self.core.id(), task_type = kind, "Processing management task");

        match kind {
            "coordinate" => Ok(self.coordinate_team(task)),
            "validate" => self.validate_work(task, ctx),
            "resolve_conflict" => self.resolve_conflict(task, ctx),
            "assign_task" => self.assign_task(task, ctx),
            "sprint_planning" => Ok(self.plan_sprint(task, ctx)),
            "project_planning" => Ok(self.plan_project(task, ctx)),
            other => Err(AgentError::UnsupportedTask {
                role: AgentRole::Manager,
                task_type: other.to_string(),
            }),
        }
    }

    fn validate_output(&self, output: &Value) -> bool {
        is_success(output) && RESULT_KEYS.iter().any(|key| output.get(*key).is_some())
    }

    fn prompt_template(&self) -> PromptTemplate {
        library::manager()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> ManagerAgent {
        ManagerAgent::with_id("manager-001", 8000)
    }

    fn ctx() -> AgentContext {
        AgentContext::for_project("proj-1")
    }

    #[test]
    fn complete_pm_output_is_approved() {
        let output = json!({
            "user_stories": [{"id": 1}, {"id": 2}, {"id": 3}],
            "acceptance_criteria": ["a"],
            "priority": "high",
        });
        let result = score_output(&output, "pm");
        assert!((result["score"].as_f64().unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(result["pass"], true);
    }

    #[test]
    fn thin_developer_output_is_rejected() {
        let output = json!({"code": "fn main() {}", "tests": [], "documentation": ""});
        let result = score_output(&output, "developer");
        // 1/3 required fields, coverage missing, 1/3 filled + 0.2 general
        let expected = (0.4 / 3.0 + (1.0 / 3.0 + 0.2) * 0.3) / 1.0;
        assert!((result["score"].as_f64().unwrap() - expected).abs() < 1e-9);
        assert_eq!(result["pass"], false);
    }

    #[test]
    fn architect_score_normalises_without_role_check() {
        let output = json!({"tech_stack": ["rust"], "architecture_diagram": "x", "api_design": {"a": 1}});
        let result = score_output(&output, "architect");
        assert!((result["score"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_role_uses_general_quality_only() {
        let result = score_output(&json!({"a": 1, "b": ""}), "scrum");
        assert!((result["score"].as_f64().unwrap() - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn validate_requires_agent_and_output() {
        let mut m = manager();
        let err = m
            .process_task(&json!({"type": "validate", "agent_id": "pm-001"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn priority_conflicts_defer_to_pm() {
        let mut m = manager();
        let out = m
            .process_task(
                &json!({"type": "resolve_conflict", "conflict": {"type": "priority", "agent1_id": "dev-001", "agent2_id": "pm-001"}}),
                &ctx(),
            )
            .await
            .unwrap();

        let resolution = &out["conflict_resolution"]["resolution"];
        assert_eq!(resolution["method"], "rule_based");
        assert!(resolution["decision"].as_str().unwrap().contains("PM"));
        assert_eq!(m.conflict_history(Some("proj-1")).len(), 1);
        assert!(m.conflict_history(Some("other")).is_empty());
    }

    #[tokio::test]
    async fn approach_conflicts_are_mediated() {
        let mut m = manager();
        let out = m
            .process_task(&json!({"type": "resolve_conflict", "conflict": {}}), &ctx())
            .await
            .unwrap();
        assert_eq!(out["conflict_resolution"]["resolution"]["method"], "ai_mediated");
        assert_eq!(out["conflict_resolution"]["type"], "approach");
    }

    #[tokio::test]
    async fn assign_task_routes_by_type() {
        let mut m = manager();
        let out = m
            .process_task(
                &json!({"type": "assign_task", "task_id": "t-1", "task_details": {"type": "testing"}, "priority": "high"}),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(out["assignment"]["assigned_to"], "qa-001");
        assert_eq!(m.active_tasks(Some("qa-001")).len(), 1);

        let err = m
            .process_task(&json!({"type": "assign_task", "task_details": {"type": "gardening"}}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn sprint_plan_flags_complexity_and_scope() {
        let mut m = manager();
        let stories: Vec<Value> = (0..6)
            .map(|i| json!({"title": format!("s{i}"), "points": if i == 0 { 8 } else { 2 }}))
            .collect();
        let out = m
            .process_task(&json!({"type": "sprint_planning", "sprint_goal": "MVP", "user_stories": stories}), &ctx())
            .await
            .unwrap();

        let plan = &out["sprint_plan"];
        assert_eq!(plan["timeline"]["total_story_points"], 18.0);
        assert!((plan["timeline"]["daily_velocity"].as_f64().unwrap() - 1.8).abs() < 1e-9);
        let kinds: Vec<&str> = plan["risks"].as_array().unwrap().iter().map(|r| r["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["complexity", "scope"]);
        assert_eq!(plan["assignments"]["dev-001"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn standup_reports_blockers_and_priorities() {
        let mut m = manager();
        let out = m
            .process_task(
                &json!({
                    "type": "coordinate",
                    "agent_statuses": {
                        "dev-001": {"status": "working", "progress": 0.9, "blockers": []},
                        "qa-001": {"status": "idle", "progress": 0.0, "blockers": ["Waiting for development completion"]},
                    },
                }),
                &ctx(),
            )
            .await
            .unwrap();

        assert!(m.validate_output(&out));
        let result = &out["coordination_result"];
        assert_eq!(result["blockers"][0]["severity"], "high");
        assert_eq!(result["priorities"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn enterprise_projects_are_high_complexity() {
        let mut m = manager();
        let out = m
            .process_task(
                &json!({"type": "project_planning", "project_info": {"name": "ERP", "type": "enterprise", "description": "AI powered", "budget": 50000}}),
                &ctx(),
            )
            .await
            .unwrap();

        let plan = &out["project_plan"];
        assert_eq!(plan["complexity_level"], "high");
        assert_eq!(plan["estimated_timeline"]["estimated_weeks"], 24);
        assert!(plan["assigned_agents"].as_array().unwrap().contains(&json!("Security")));
        assert_eq!(plan["risk_factors"].as_array().unwrap().len(), 2);
        assert!(m.project_plan("proj-1").is_some());
    }

    #[test]
    fn complexity_bands() {
        assert_eq!(assess_project_complexity(&json!({"requirements": [1, 2, 3, 4, 5, 6]})), "medium");
        assert_eq!(assess_project_complexity(&json!({"budget": 2_000_000})), "high");
        assert_eq!(assess_project_complexity(&json!({"type": "mobile"})), "low");
    }

    #[tokio::test]
    async fn unknown_task_type_is_unsupported() {
        let mut m = manager();
        let err = m.process_task(&json!({"type": "dance"}), &ctx()).await.unwrap_err();
        assert!(matches!(err, AgentError::UnsupportedTask { .. }));
    }
}
