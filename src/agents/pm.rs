use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::info;

use super::base::{array_field, has_truthy, is_success, is_truthy, str_field, task_kind, Agent, AgentContext, AgentCore};
use super::errors::{AgentError, AgentResult};
use super::prompts::{library, PromptTemplate};
use crate::domain::agent::AgentRole;

const DEFAULT_VELOCITY: f64 = 40.0;
const DEFAULT_SPRINTS_PER_MONTH: f64 = 2.0;
const DEFAULT_STAKEHOLDERS: [&str; 4] = ["Business", "Development", "Design", "QA"];
const CONSENSUS_THRESHOLD: f64 = 0.7;

/// Keyword category for a requirement description
pub fn categorize_requirement(description: &str) -> &'static str {
    let text = description.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

    if has(&["performance", "speed", "load"]) {
        "performance"
    } else if has(&["security", "auth", "encrypt"]) {
        "security"
    } else if has(&["ui", "interface", "design"]) {
        "interface"
    } else if has(&["data", "database", "store"]) {
        "data"
    } else {
        "functional"
    }
}

/// 0.5 plus 0.2 for every business goal sharing a word with the description, capped at 1
pub fn business_value(description: &str, goals: &[String]) -> f64 {
    let text = description.to_lowercase();
    let matched = goals
        .iter()
        .filter(|goal| goal.to_lowercase().split_whitespace().any(|word| text.contains(word)))
        .count();
    (0.5 + 0.2 * matched as f64).min(1.0)
}

/// Story points from description length
pub fn estimate_story_points(description: &str) -> u32 {
    match description.chars().count() {
        0..=99 => 2,
        100..=299 => 5,
        300..=499 => 8,
        _ => 13,
    }
}

pub fn story_priority(business_value: f64) -> &'static str {
    if business_value > 0.8 {
        "high"
    } else if business_value > 0.6 {
        "medium"
    } else {
        "low"
    }
}

fn priority_score(story: &Value) -> u32 {
    match str_field(story, "priority", "medium") {
        "critical" => 4,
        "high" => 3,
        "low" => 1,
        _ => 2,
    }
}

fn moscow_label(priority: &str) -> &'static str {
    match priority {
        "critical" => "Must",
        "high" => "Should",
        "medium" => "Could",
        _ => "Won't",
    }
}

fn moscow_rank(label: &str) -> u32 {
    match label {
        "Must" => 4,
        "Should" => 3,
        "Could" => 2,
        _ => 1,
    }
}

fn points_of(story: &Value, default: f64) -> f64 {
    story.get("story_points").and_then(Value::as_f64).unwrap_or(default)
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn count_by(stories: &[Value], key: &str, default: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for story in stories {
        *counts.entry(str_field(story, key, default).to_string()).or_insert(0) += 1;
    }
    counts
}

/// Product manager: requirements, stories, backlog and roadmap
pub struct PmAgent {
    core: AgentCore,
    requirements_backlog: Vec<Value>,
    user_stories: BTreeMap<String, Value>,
    roadmap: Option<Value>,
}

impl PmAgent {
    pub fn new(core: AgentCore) -> Self {
        Self {
            core,
            requirements_backlog: Vec::new(),
            user_stories: BTreeMap::new(),
            roadmap: None,
        }
    }

    pub fn with_id(id: &str, context_max_tokens: usize) -> Self {
        Self::new(AgentCore::new(id, AgentRole::Pm, "deepseek", context_max_tokens))
    }

    pub fn requirements_backlog(&self) -> &[Value] {
        &self.requirements_backlog
    }

    pub fn user_story(&self, id: &str) -> Option<&Value> {
        self.user_stories.get(id)
    }

    pub fn roadmap(&self) -> Option<&Value> {
        self.roadmap.as_ref()
    }

    fn analyze_requirements(&mut self, task: &Value) -> Value {
        let raw = array_field(task, "requirements");
        let goals: Vec<String> = array_field(task, "business_goals")
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect();
        info!(count = raw.len(), "Analyzing requirements");

        let offset = self.requirements_backlog.len();
        let structured: Vec<Value> = raw
            .iter()
            .enumerate()
            .map(|(i, req)| {
                let (mut fields, source) = match req {
                    Value::String(text) => {
                        let kind = if text.to_lowercase().contains("should") {
                            "functional"
                        } else {
                            "non-functional"
                        };
                        let mut map = Map::new();
                        map.insert("description".into(), json!(text));
                        map.insert("type".into(), json!(kind));
                        map.insert("complexity".into(), json!("medium"));
                        map.insert("priority".into(), json!("medium"));
                        (map, "text_input".to_string())
                    }
                    Value::Object(map) => {
                        let source = map.get("source").and_then(Value::as_str).unwrap_or("unknown").to_string();
                        (map.clone(), source)
                    }
                    other => {
                        let mut map = Map::new();
                        map.insert("description".into(), json!(other.to_string()));
                        (map, "unknown".to_string())
                    }
                };

                let description = fields.get("description").and_then(Value::as_str).unwrap_or("").to_string();
                fields.insert("id".into(), json!(format!("REQ-{:03}", offset + i + 1)));
                fields.insert("analyzed_at".into(), json!(Utc::now().to_rfc3339()));
                fields.insert("source".into(), json!(source));
                fields.insert("category".into(), json!(categorize_requirement(&description)));
                fields.insert("business_value".into(), json!(business_value(&description, &goals)));
                Value::Object(fields)
            })
            .collect();

        let alignment = if structured.is_empty() {
            0.0
        } else {
            structured.iter().filter_map(|r| r["business_value"].as_f64()).sum::<f64>() / structured.len() as f64
        };
        let overall = match structured.len() {
            0..=5 => "low",
            6..=15 => "medium",
            _ => "high",
        };

        self.requirements_backlog.extend(structured.iter().cloned());

        json!({
            "status": "success",
            "analysis": {
                "total_requirements": structured.len(),
                "requirements": structured,
                "dependencies": [],
                "conflicts": [],
                "business_alignment": alignment,
                "implementation_complexity": {"overall": overall, "technical_risk": "low"},
                "recommendations": [
                    "Prioritize core functionality first",
                    "Address conflicts before implementation",
                ],
            },
        })
    }

    fn create_user_stories(&mut self, task: &Value) -> Value {
        let requirements: Vec<Value> = match array_field(task, "requirements") {
            [] => self.requirements_backlog.clone(),
            given => given.to_vec(),
        };
        let persona = array_field(task, "personas")
            .first()
            .cloned()
            .unwrap_or_else(|| json!({"name": "User", "id": "default"}));
        let persona_name = str_field(&persona, "name", "User");
        let persona_goal = str_field(&persona, "primary_goal", "accomplish tasks");
        info!(count = requirements.len(), "Creating user stories");

        let offset = self.user_stories.len();
        let stories: Vec<Value> = requirements
            .iter()
            .enumerate()
            .map(|(i, req)| {
                let description = str_field(req, "description", "");
                let value = req.get("business_value").and_then(Value::as_f64).unwrap_or(0.5);
                let points = estimate_story_points(description);
                json!({
                    "id": format!("US-{:03}", offset + i + 1),
                    "title": format!("{persona_name} - {}...", truncate_chars(description, 50)),
                    "story": format!(
                        "As a {persona_name}, I want to {}, so that I can {persona_goal}",
                        description.to_lowercase()
                    ),
                    "description": description,
                    "persona": persona_name,
                    "persona_id": str_field(&persona, "id", "default"),
                    "requirement_id": req.get("id").cloned().unwrap_or(Value::Null),
                    "category": str_field(req, "category", "functional"),
                    "created_at": Utc::now().to_rfc3339(),
                    "priority": story_priority(value),
                    "story_type": "feature",
                    "complexity": points,
                    "story_points": points,
                    "acceptance_criteria": [
                        "Given the user is authenticated",
                        format!("When they {}", description.to_lowercase()),
                        "Then the system should respond appropriately",
                        "And the user should see confirmation of the action",
                    ],
                })
            })
            .collect();

        let mut epics: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for story in &stories {
            epics
                .entry(str_field(story, "category", "functional").to_string())
                .or_default()
                .push(story["id"].clone());
        }
        let epics: Vec<Value> = epics
            .into_iter()
            .filter(|(_, ids)| ids.len() > 1)
            .map(|(category, ids)| json!({"name": format!("{category} epic"), "stories": ids}))
            .collect();

        for story in &stories {
            if let Some(id) = story["id"].as_str() {
                self.user_stories.insert(id.to_string(), story.clone());
            }
        }

        let effort: f64 = stories.iter().map(|s| points_of(s, 0.0)).sum();
        json!({
            "status": "success",
            "summary": {
                "total_stories": stories.len(),
                "by_priority": count_by(&stories, "priority", "medium"),
                "by_type": count_by(&stories, "story_type", "feature"),
                "estimated_effort": effort,
            },
            "epics": epics,
            "user_stories": stories,
        })
    }

    fn prioritize_backlog(&self, task: &Value) -> Value {
        let mut stories: Vec<Value> = match task.get("stories").and_then(Value::as_array) {
            Some(given) => given.clone(),
            None => self.user_stories.values().cloned().collect(),
        };
        let method = str_field(task, "method", "moscow");
        let velocity = task.get("velocity").and_then(Value::as_f64).unwrap_or(DEFAULT_VELOCITY);
        info!(count = stories.len(), method, "Prioritizing backlog");

        let rationale = if method == "moscow" {
            for story in stories.iter_mut() {
                let label = moscow_label(str_field(story, "priority", "medium"));
                if let Some(map) = story.as_object_mut() {
                    map.insert("moscow".into(), json!(label));
                }
            }
            stories.sort_by_key(|s| std::cmp::Reverse(moscow_rank(str_field(s, "moscow", ""))));
            "MoSCoW: critical stories are Must, high Should, medium Could, the rest Won't"
        } else {
            stories.sort_by(|a, b| {
                let ratio = |s: &Value| priority_score(s) as f64 / points_of(s, 3.0).max(1.0);
                ratio(b).total_cmp(&ratio(a))
            });
            "Value over effort: priority score divided by story points"
        };

        let mut sprints: Vec<Value> = Vec::new();
        let mut current: Vec<Value> = Vec::new();
        let mut load = 0.0;
        for story in &stories {
            let points = points_of(story, 3.0);
            if load + points > velocity && !current.is_empty() {
                sprints.push(json!({"sprint": sprints.len() + 1, "points": load, "stories": current}));
                current = Vec::new();
                load = 0.0;
            }
            current.push(story.get("id").cloned().unwrap_or(Value::Null));
            load += points;
        }
        if !current.is_empty() {
            sprints.push(json!({"sprint": sprints.len() + 1, "points": load, "stories": current}));
        }

        json!({
            "status": "success",
            "prioritized_backlog": stories,
            "sprint_recommendations": sprints,
            "prioritization_rationale": rationale,
        })
    }

    fn define_acceptance_criteria(&mut self, task: &Value) -> Value {
        let ids: Vec<&str> = array_field(task, "story_ids").iter().filter_map(Value::as_str).collect();
        let mut enhanced = Vec::new();

        for id in ids {
            let Some(story) = self.user_stories.get_mut(id) else { continue };
            let description = str_field(story, "description", "perform the action").to_lowercase();
            let criteria = vec![
                "Given the user is authenticated".to_string(),
                format!("When they {description}"),
                "Then the system should respond appropriately".to_string(),
                "And the user should see confirmation of the action".to_string(),
                "And invalid input is rejected with a clear message".to_string(),
            ];
            let scenarios: Vec<Value> = criteria
                .iter()
                .enumerate()
                .map(|(i, c)| json!({"id": format!("{id}-TS-{:02}", i + 1), "verifies": c}))
                .collect();

            if let Some(map) = story.as_object_mut() {
                map.insert("acceptance_criteria".into(), json!(criteria));
                map.insert("test_scenarios".into(), json!(scenarios));
                map.insert(
                    "edge_cases".into(),
                    json!(["Empty input", "Maximum length input", "Concurrent submissions"]),
                );
                map.insert(
                    "definition_of_done".into(),
                    json!([
                        "Code reviewed and merged",
                        "Acceptance criteria verified",
                        "Tests written and passing",
                        "Documentation updated",
                    ]),
                );
                map.insert("updated_at".into(), json!(Utc::now().to_rfc3339()));
            }
            enhanced.push(story.clone());
        }

        let sum_len = |key: &str| enhanced.iter().map(|s| array_field(s, key).len()).sum::<usize>();
        let avg_criteria = if enhanced.is_empty() {
            0.0
        } else {
            sum_len("acceptance_criteria") as f64 / enhanced.len() as f64
        };

        json!({
            "status": "success",
            "quality_metrics": {
                "avg_criteria_per_story": avg_criteria,
                "total_test_scenarios": sum_len("test_scenarios"),
                "edge_cases_identified": sum_len("edge_cases"),
            },
            "enhanced_stories": enhanced,
        })
    }

    fn create_prd(&self, task: &Value, ctx: &AgentContext) -> Value {
        let overview = task.get("project_overview").cloned().unwrap_or_else(|| json!({}));
        let objectives = array_field(task, "business_objectives");
        let users = array_field(task, "target_users");
        let stories: Vec<&Value> = self.user_stories.values().collect();

        let mut functional: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for req in &self.requirements_backlog {
            functional
                .entry(str_field(req, "category", "functional").to_string())
                .or_default()
                .push(req.clone());
        }

        let prd = json!({
            "document_info": {
                "title": format!("Product Requirements Document - {}", str_field(&overview, "name", "Product")),
                "version": "1.0",
                "created_by": self.core.id(),
                "created_at": Utc::now().to_rfc3339(),
                "project_id": ctx.project_id,
            },
            "executive_summary": format!(
                "{} requirements and {} user stories supporting {} business objectives",
                self.requirements_backlog.len(),
                stories.len(),
                objectives.len()
            ),
            "product_overview": {
                "vision": str_field(&overview, "vision", ""),
                "mission": str_field(&overview, "mission", ""),
                "success_metrics": objectives,
                "target_market": users,
            },
            "user_personas": users,
            "functional_requirements": functional,
            "user_stories": stories,
            "non_functional_requirements": {
                "performance": "p95 response under 200 ms",
                "availability": "99.9%",
                "security": "authenticated access to all user data",
            },
            "success_criteria": objectives,
            "risks_and_mitigation": [
                {"risk": "Scope creep", "mitigation": "Backlog grooming every sprint"},
            ],
        });

        let sections = prd.as_object().map(|m| m.len()).unwrap_or(0);
        let filled = prd.as_object().map(|m| m.values().filter(|v| is_truthy(v)).count()).unwrap_or(0);
        let completeness = if sections == 0 { 0.0 } else { filled as f64 / sections as f64 };

        json!({
            "status": "success",
            "document_statistics": {
                "total_pages_estimated": (prd.to_string().len() / 3000).max(1),
                "requirements_covered": self.requirements_backlog.len(),
                "user_stories_included": stories.len(),
                "completeness_score": completeness,
            },
            "prd": prd,
        })
    }

    fn stakeholder_review(&self, task: &Value) -> Value {
        let items = array_field(task, "items");
        let stakeholders: Vec<String> = match task.get("stakeholders").and_then(Value::as_array) {
            Some(list) => list.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            None => DEFAULT_STAKEHOLDERS.iter().map(|s| s.to_string()).collect(),
        };

        let results: Vec<Value> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let feedback: Vec<Value> = stakeholders
                    .iter()
                    .map(|stakeholder| {
                        let approved = stakeholder_approves(stakeholder, item);
                        json!({
                            "stakeholder": stakeholder,
                            "approved": approved,
                            "comment": if approved { "Looks good" } else { "Needs more detail" },
                        })
                    })
                    .collect();
                let approvals = feedback.iter().filter(|f| f["approved"] == true).count();
                let consensus = if feedback.is_empty() {
                    0.0
                } else {
                    approvals as f64 / feedback.len() as f64
                };
                json!({
                    "item_id": item.get("id").cloned().unwrap_or_else(|| json!(format!("item-{i}"))),
                    "item_type": str_field(item, "type", "user_story"),
                    "stakeholder_feedback": feedback,
                    "consensus_level": consensus,
                    "action_required": approvals < feedback.len(),
                })
            })
            .collect();

        let consensus_reached = results
            .iter()
            .filter(|r| r["consensus_level"].as_f64().unwrap_or(0.0) > CONSENSUS_THRESHOLD)
            .count();
        let needing_changes: Vec<&Value> = results.iter().filter(|r| r["action_required"] == true).collect();
        let approval_rate = if results.is_empty() {
            0.0
        } else {
            results.iter().filter_map(|r| r["consensus_level"].as_f64()).sum::<f64>() / results.len() as f64
        };
        let next_steps: Vec<String> = if needing_changes.is_empty() {
            vec!["Move reviewed items into sprint planning".to_string()]
        } else {
            needing_changes
                .iter()
                .map(|r| format!("Revise {} and resubmit for review", str_field(r, "item_id", "item")))
                .collect()
        };

        json!({
            "status": "success",
            "review_summary": {
                "total_items_reviewed": items.len(),
                "consensus_reached": consensus_reached,
                "items_requiring_changes": needing_changes.len(),
                "overall_approval_rate": approval_rate,
            },
            "next_steps": next_steps,
            "feedback_results": results,
        })
    }

    fn plan_roadmap(&mut self, task: &Value) -> Value {
        let horizon = task.get("horizon_months").and_then(Value::as_u64).unwrap_or(12);
        let capacity = task.get("team_capacity").cloned().unwrap_or_else(|| json!({}));
        let velocity = capacity.get("velocity").and_then(Value::as_f64).unwrap_or(DEFAULT_VELOCITY);
        let sprints_per_month = capacity
            .get("sprints_per_month")
            .and_then(Value::as_f64)
            .unwrap_or(DEFAULT_SPRINTS_PER_MONTH);
        let monthly_capacity = velocity * sprints_per_month;

        let mut stories: Vec<&Value> = self.user_stories.values().collect();
        stories.sort_by_key(|s| std::cmp::Reverse(priority_score(s)));

        let mut releases: Vec<Vec<&Value>> = Vec::new();
        let mut current: Vec<&Value> = Vec::new();
        let mut load = 0.0;
        for story in stories {
            let points = points_of(story, 3.0);
            if load + points > monthly_capacity && !current.is_empty() {
                releases.push(std::mem::take(&mut current));
                load = 0.0;
            }
            current.push(story);
            load += points;
        }
        if !current.is_empty() {
            releases.push(current);
        }

        let now = Utc::now();
        let releases: Vec<Value> = releases
            .into_iter()
            .enumerate()
            .map(|(i, stories)| {
                let total: f64 = stories.iter().map(|s| points_of(s, 3.0)).sum();
                let mut themes: Vec<&str> = stories.iter().map(|s| str_field(s, "category", "functional")).collect();
                themes.sort_unstable();
                themes.dedup();
                json!({
                    "release_number": i + 1,
                    "target_date": (now + Duration::days(30 * (i as i64 + 1))).to_rfc3339(),
                    "total_points": total,
                    "themes": themes,
                    "stories": stories,
                })
            })
            .collect();

        let milestones: Vec<String> = releases
            .iter()
            .map(|r| format!("Release {} ships {} points", r["release_number"], r["total_points"]))
            .collect();
        let mut risks = Vec::new();
        if releases.len() as u64 > horizon {
            risks.push("Backlog exceeds the planning horizon");
        }

        let roadmap = json!({
            "time_horizon_months": horizon,
            "total_releases": releases.len(),
            "releases": releases,
            "assumptions": {
                "team_velocity": velocity,
                "sprints_per_month": sprints_per_month,
                "capacity_utilization": 0.8,
            },
            "key_milestones": milestones,
            "risks": risks,
        });
        self.roadmap = Some(roadmap.clone());

        json!({"status": "success", "roadmap": roadmap})
    }
}

fn stakeholder_approves(stakeholder: &str, item: &Value) -> bool {
    match stakeholder.to_lowercase().as_str() {
        "business" => {
            item.get("business_value").and_then(Value::as_f64).unwrap_or(0.0) >= 0.5
                || matches!(str_field(item, "priority", ""), "critical" | "high")
        }
        "design" => has_truthy(item, "persona") || has_truthy(item, "story"),
        "qa" => has_truthy(item, "acceptance_criteria"),
        _ => has_truthy(item, "description"),
    }
}

#[async_trait]
impl Agent for PmAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process_task(&mut self, task: &Value, ctx: &AgentContext) -> AgentResult<Value> {
        let kind = task_kind(task, "analyze_requirements");
        info!(agent_id = %self.core.id(), task_type = kind, "Processing PM task");

        match kind {
            "analyze_requirements" => Ok(self.analyze_requirements(task)),
            "create_user_stories" => Ok(self.create_user_stories(task)),
            "prioritize_backlog" => Ok(self.prioritize_backlog(task)),
            "define_acceptance_criteria" => Ok(self.define_acceptance_criteria(task)),
            "create_prd" => Ok(self.create_prd(task, ctx)),
            "stakeholder_review" => Ok(self.stakeholder_review(task)),
            "roadmap_planning" => Ok(self.plan_roadmap(task)),
            other => Err(AgentError::UnsupportedTask {
                role: AgentRole::Pm,
                task_type: other.to_string(),
            }),
        }
    }

    fn validate_output(&self, output: &Value) -> bool {
        if !is_success(output) {
            return false;
        }
        if let Some(stories) = output.get("user_stories") {
            return stories.as_array().map_or(false, |list| {
                list.iter().all(|s| {
                    has_truthy(s, "title") && has_truthy(s, "acceptance_criteria") && has_truthy(s, "priority")
                })
            });
        }
        if let Some(prd) = output.get("prd") {
            return ["executive_summary", "functional_requirements", "user_stories"]
                .iter()
                .all(|section| prd.get(*section).is_some());
        }
        true
    }

    fn prompt_template(&self) -> PromptTemplate {
        library::product_manager()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pm() -> PmAgent {
        PmAgent::with_id("pm-001", 8000)
    }

    fn ctx() -> AgentContext {
        AgentContext::for_project("proj-1")
    }

    #[test]
    fn categories_follow_keywords() {
        assert_eq!(categorize_requirement("Page load speed under 1s"), "performance");
        assert_eq!(categorize_requirement("OAuth login"), "security");
        assert_eq!(categorize_requirement("Export reports to the database"), "data");
        assert_eq!(categorize_requirement("Send reminders"), "functional");
    }

    #[test]
    fn business_value_caps_at_one() {
        let goals = vec!["grow revenue".to_string(), "retain users".to_string(), "users love it".to_string()];
        assert!((business_value("users pay more revenue", &goals) - 1.0).abs() < 1e-9);
        assert!((business_value("nothing relevant", &[]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn points_grow_with_description_length() {
        assert_eq!(estimate_story_points("short"), 2);
        assert_eq!(estimate_story_points(&"x".repeat(150)), 5);
        assert_eq!(estimate_story_points(&"x".repeat(450)), 8);
        assert_eq!(estimate_story_points(&"x".repeat(900)), 13);
    }

    #[tokio::test]
    async fn analysis_numbers_requirements_and_fills_backlog() {
        let mut agent = pm();
        let out = agent
            .process_task(
                &json!({
                    "type": "analyze_requirements",
                    "requirements": ["Users should log in securely", {"description": "Dashboard UI", "source": "client"}],
                    "business_goals": ["secure users"],
                }),
                &ctx(),
            )
            .await
            .unwrap();

        let reqs = out["analysis"]["requirements"].as_array().unwrap();
        assert_eq!(reqs[0]["id"], "REQ-001");
        assert_eq!(reqs[0]["type"], "functional");
        assert_eq!(reqs[1]["source"], "client");
        assert_eq!(reqs[1]["category"], "interface");
        assert_eq!(agent.requirements_backlog().len(), 2);
    }

    #[tokio::test]
    async fn stories_come_from_backlog_when_none_given() {
        let mut agent = pm();
        agent
            .process_task(&json!({"type": "analyze_requirements", "requirements": ["Export data", "Import data"]}), &ctx())
            .await
            .unwrap();
        let out = agent
            .process_task(&json!({"type": "create_user_stories"}), &ctx())
            .await
            .unwrap();

        assert!(agent.validate_output(&out));
        let stories = out["user_stories"].as_array().unwrap();
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[1]["id"], "US-002");
        assert_eq!(stories[0]["priority"], "low");
        assert_eq!(stories[0]["acceptance_criteria"].as_array().unwrap().len(), 4);
        assert_eq!(out["summary"]["estimated_effort"], 4.0);
        assert_eq!(out["epics"].as_array().unwrap().len(), 1);
        assert!(agent.user_story("US-001").is_some());
    }

    #[tokio::test]
    async fn moscow_orders_must_first() {
        let agent = pm();
        let out = agent.prioritize_backlog(&json!({
            "stories": [
                {"id": "a", "priority": "low"},
                {"id": "b", "priority": "critical"},
                {"id": "c", "priority": "high"},
            ],
        }));
        let order: Vec<&str> = out["prioritized_backlog"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["moscow"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["Must", "Should", "Won't"]);
    }

    #[tokio::test]
    async fn roadmap_splits_releases_by_monthly_capacity() {
        let mut agent = pm();
        let reqs: Vec<Value> = (0..5).map(|i| json!({"description": format!("{i}{}", "x".repeat(450))})).collect();
        agent
            .process_task(&json!({"type": "create_user_stories", "requirements": reqs}), &ctx())
            .await
            .unwrap();

        // five 8-point stories against 10 points a month
        let out = agent
            .process_task(
                &json!({"type": "roadmap_planning", "team_capacity": {"velocity": 10, "sprints_per_month": 1}}),
                &ctx(),
            )
            .await
            .unwrap();
        assert_eq!(out["roadmap"]["total_releases"], 5);
        assert!(agent.roadmap().is_some());
    }

    #[tokio::test]
    async fn review_flags_items_without_criteria() {
        let agent = pm();
        let out = agent.stakeholder_review(&json!({
            "items": [
                {"id": "US-1", "description": "d", "story": "s", "priority": "high", "acceptance_criteria": ["x"]},
                {"id": "US-2", "description": "d"},
            ],
        }));
        let results = out["feedback_results"].as_array().unwrap();
        assert_eq!(results[0]["consensus_level"], 1.0);
        assert_eq!(results[1]["action_required"], true);
        assert_eq!(out["review_summary"]["consensus_reached"], 1);
    }

    #[tokio::test]
    async fn prd_validates_with_required_sections() {
        let mut agent = pm();
        let out = agent
            .process_task(&json!({"type": "create_prd", "project_overview": {"name": "Shop"}}), &ctx())
            .await
            .unwrap();
        assert!(agent.validate_output(&out));
        assert_eq!(out["prd"]["document_info"]["project_id"], "proj-1");
    }

    #[test]
    fn stories_missing_fields_fail_validation() {
        let agent = pm();
        assert!(!agent.validate_output(&json!({"status": "success", "user_stories": [{"title": "t"}]})));
        assert!(!agent.validate_output(&json!({"status": "error"})));
    }
}
