use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::sprint::{MemoryError, MemoryLayer, SprintMemoryManager};

/// Agent that picks up help requests and retrospective improvements
const COORDINATOR: &str = "manager-001";
/// Owner of carried-over stories without an assignee
const BACKLOG_OWNER: &str = "pm-001";
/// Planned points may exceed capacity by this factor before it is a blocker
const CAPACITY_BUFFER: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingType {
    Planning,
    Daily,
    Review,
    Retrospective,
    AdHoc,
}

impl MeetingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Daily => "daily",
            Self::Review => "review",
            Self::Retrospective => "retrospective",
            Self::AdHoc => "ad_hoc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        [Self::Planning, Self::Daily, Self::Review, Self::Retrospective, Self::AdHoc]
            .into_iter()
            .find(|t| t.as_str() == value)
    }

    /// Standard agenda and expected outcomes; ad hoc meetings have none
    pub fn template(&self) -> Option<Value> {
        let (agenda, outcomes): (Vec<&str>, Vec<&str>) = match self {
            Self::Planning => (
                vec![
                    "Review sprint goal",
                    "Estimate user stories",
                    "Assign stories to team members",
                    "Identify dependencies and risks",
                    "Confirm team capacity",
                ],
                vec![
                    "Sprint goal defined",
                    "User stories estimated and assigned",
                    "Sprint backlog finalized",
                    "Risks identified and mitigated",
                ],
            ),
            Self::Daily => (
                vec![
                    "What did you complete yesterday?",
                    "What will you work on today?",
                    "Are there any blockers or impediments?",
                ],
                vec!["Progress visibility", "Blocker identification", "Team coordination"],
            ),
            Self::Review => (
                vec![
                    "Demo completed features",
                    "Review sprint goals achievement",
                    "Gather stakeholder feedback",
                    "Discuss incomplete items",
                ],
                vec![
                    "Features demonstrated",
                    "Feedback collected",
                    "Incomplete items identified",
                    "Next sprint input gathered",
                ],
            ),
            Self::Retrospective => (
                vec![
                    "What went well?",
                    "What could be improved?",
                    "What will we commit to improve?",
                    "Action items for next sprint",
                ],
                vec![
                    "Process improvements identified",
                    "Action items defined",
                    "Team alignment on changes",
                    "Commitment to improvements",
                ],
            ),
            Self::AdHoc => return None,
        };
        Some(json!({ "agenda_items": agenda, "expected_outcomes": outcomes }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attendance {
    #[default]
    Present,
    Absent,
    Partial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub agent_id: String,
    pub role: String,
    #[serde(default)]
    pub attendance: Attendance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub description: String,
    pub assigned_to: String,
    #[serde(default)]
    pub due_date: Option<String>,
    pub priority: String,
    pub status: String,
}

impl ActionItem {
    fn open(id: String, description: String, assigned_to: impl Into<String>, priority: impl Into<String>) -> Self {
        Self {
            id,
            description,
            assigned_to: assigned_to.into(),
            due_date: None,
            priority: priority.into(),
            status: "open".to_string(),
        }
    }
}

/// Structured record of one sprint meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingMinutes {
    pub meeting_id: String,
    #[serde(rename = "type")]
    pub meeting_type: MeetingType,
    pub date: DateTime<Utc>,
    pub participants: Vec<Participant>,
    pub agenda: Value,
    pub outcomes: Value,
    pub action_items: Vec<ActionItem>,
    pub decisions: Vec<Value>,
    pub blockers_identified: Vec<Value>,
    pub next_steps: Vec<String>,
}

impl MeetingMinutes {
    /// Counts plus the outcomes that matter for the meeting type
    pub fn summary(&self) -> Value {
        let outcome_count = |key: &str| self.outcomes.get(key).and_then(Value::as_array).map_or(0, Vec::len);

        let key_outcomes = match self.meeting_type {
            MeetingType::Planning => vec![
                format!(
                    "Sprint goal: {}",
                    self.outcomes.get("sprint_goal").and_then(Value::as_str).unwrap_or("Not set")
                ),
                format!("Stories planned: {}", outcome_count("user_stories")),
                format!(
                    "Team capacity: {}",
                    self.outcomes
                        .get("team_capacity")
                        .map(Value::to_string)
                        .unwrap_or_else(|| "Not specified".to_string())
                ),
            ],
            MeetingType::Review => vec![
                format!("Stories completed: {}", outcome_count("completed_stories")),
                format!("Stories incomplete: {}", outcome_count("incomplete_stories")),
                format!("Demo feedback items: {}", outcome_count("demo_feedback")),
            ],
            _ => Vec::new(),
        };

        json!({
            "meeting_id": self.meeting_id,
            "type": self.meeting_type,
            "date": self.date,
            "key_outcomes": key_outcomes,
            "action_items_count": self.action_items.len(),
            "decisions_count": self.decisions.len(),
            "blockers_count": self.blockers_identified.len(),
        })
    }
}

/// Writes meeting minutes into a sprint's memory
///
/// Minutes land in episodic memory; their decisions and blockers are also
/// copied into the sprint's core record.
pub struct MeetingMinutesManager<'a> {
    memory: &'a mut SprintMemoryManager,
}

impl<'a> MeetingMinutesManager<'a> {
    pub fn new(memory: &'a mut SprintMemoryManager) -> Self {
        Self { memory }
    }

    pub fn create_minutes(
        &mut self,
        project_id: &str,
        sprint_id: &str,
        meeting_type: MeetingType,
        participants: Vec<Participant>,
        agenda: Value,
        outcomes: Value,
    ) -> Result<MeetingMinutes, MemoryError> {
        if !self.memory.is_initialized(project_id, sprint_id) {
            return Err(MemoryError::SprintNotInitialized {
                project_id: project_id.to_string(),
                sprint_id: sprint_id.to_string(),
            });
        }

        let now = Utc::now();
        let mut minutes = MeetingMinutes {
            meeting_id: format!("{}_{}", meeting_type.as_str(), now.timestamp_micros()),
            meeting_type,
            date: now,
            participants,
            agenda: if agenda.is_null() {
                meeting_type.template().unwrap_or_else(|| json!({}))
            } else {
                agenda
            },
            outcomes,
            action_items: Vec::new(),
            decisions: Vec::new(),
            blockers_identified: Vec::new(),
            next_steps: Vec::new(),
        };

        match meeting_type {
            MeetingType::Planning => process_planning(&mut minutes),
            MeetingType::Daily => process_daily(&mut minutes),
            MeetingType::Review => process_review(&mut minutes),
            MeetingType::Retrospective => process_retrospective(&mut minutes),
            MeetingType::AdHoc => {}
        }

        self.memory
            .add_meeting(project_id, sprint_id, meeting_type.as_str(), json!(minutes));
        for decision in &minutes.decisions {
            self.memory.add_decision(project_id, sprint_id, decision.clone())?;
        }
        for blocker in &minutes.blockers_identified {
            self.memory.add_blocker(project_id, sprint_id, blocker.clone())?;
        }

        info!(
            project_id,
            sprint_id,
            meeting_id = %minutes.meeting_id,
            meeting_type = meeting_type.as_str(),
            "Recorded meeting minutes"
        );
        Ok(minutes)
    }

    /// Minutes stored for the sprint, newest first
    pub fn history(
        &self,
        project_id: &str,
        sprint_id: &str,
        meeting_type: Option<MeetingType>,
        limit: usize,
    ) -> Vec<MeetingMinutes> {
        let mut minutes: Vec<MeetingMinutes> = self
            .memory
            .layer_items(project_id, sprint_id, MemoryLayer::Episodic)
            .into_iter()
            .filter(|item| {
                meeting_type.map_or(true, |t| item.content.get("type").and_then(Value::as_str) == Some(t.as_str()))
            })
            .filter_map(|item| serde_json::from_value(item.content.get("data")?.clone()).ok())
            .collect();

        minutes.sort_by(|a: &MeetingMinutes, b| b.date.cmp(&a.date).then_with(|| b.meeting_id.cmp(&a.meeting_id)));
        minutes.truncate(limit);
        minutes
    }
}

fn str_or<'v>(value: &'v Value, key: &str, default: &'v str) -> &'v str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

fn list<'v>(value: &'v Value, key: &str) -> &'v [Value] {
    value.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn id_text(value: &Value) -> String {
    match value.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => "unknown".to_string(),
    }
}

fn process_planning(minutes: &mut MeetingMinutes) {
    let outcomes = &minutes.outcomes;
    let stories = list(outcomes, "user_stories");

    for story in stories {
        let Some(assignee) = story.get("assigned_to").and_then(Value::as_str) else {
            continue;
        };
        let mut item = ActionItem::open(
            format!("story_{}", id_text(story)),
            format!("Complete user story: {}", str_or(story, "title", "Untitled")),
            assignee,
            str_or(story, "priority", "medium"),
        );
        item.due_date = story.get("due_date").and_then(Value::as_str).map(str::to_string);
        minutes.action_items.push(item);
    }

    minutes.decisions.push(json!({
        "type": "sprint_goal",
        "description": format!("Sprint goal set: {}", str_or(outcomes, "sprint_goal", "")),
        "rationale": "Team consensus during planning",
        "impact": "high",
    }));

    if let Some(capacity) = outcomes.get("team_capacity").and_then(Value::as_object) {
        let available: f64 = capacity.values().filter_map(Value::as_f64).sum();
        let planned: f64 = stories
            .iter()
            .filter_map(|s| s.get("points").and_then(Value::as_f64))
            .sum();
        if !capacity.is_empty() && planned > available * CAPACITY_BUFFER {
            minutes.blockers_identified.push(json!({
                "id": format!("capacity_concern_{}", minutes.date.timestamp_micros()),
                "type": "capacity",
                "description": format!("Story points ({planned}) exceed team capacity ({available})"),
                "severity": "medium",
                "suggested_action": "Consider removing lower priority stories",
            }));
        }
    }
}

fn process_daily(minutes: &mut MeetingMinutes) {
    let stamp = minutes.date.timestamp_micros();
    if let Some(updates) = minutes.outcomes.get("agent_updates").and_then(Value::as_object) {
        for (agent_id, update) in updates {
            for (n, blocker) in list(update, "blockers").iter().enumerate() {
                let description = blocker.as_str().map_or_else(|| blocker.to_string(), str::to_string);
                minutes.blockers_identified.push(json!({
                    "id": format!("blocker_{agent_id}_{stamp}_{n}"),
                    "type": "task",
                    "description": description,
                    "affected_agent": agent_id,
                    "severity": "medium",
                }));
            }

            if let Some(help) = update.get("needs_help").and_then(Value::as_str).filter(|h| !h.is_empty()) {
                minutes.action_items.push(ActionItem::open(
                    format!("help_{agent_id}_{stamp}"),
                    format!("Provide assistance to {agent_id}: {help}"),
                    COORDINATOR,
                    "high",
                ));
            }
        }
    }

    minutes.next_steps = vec![
        "Continue with assigned tasks".to_string(),
        "Address identified blockers".to_string(),
        "Coordinate on dependencies".to_string(),
    ];
}

fn process_review(minutes: &mut MeetingMinutes) {
    let outcomes = &minutes.outcomes;

    let completed = list(outcomes, "completed_stories");
    if !completed.is_empty() {
        let titles: Vec<Value> = completed.iter().map(|s| s.get("title").cloned().unwrap_or(Value::Null)).collect();
        minutes.decisions.push(json!({
            "type": "story_completion",
            "description": format!("Accepted {} completed stories", completed.len()),
            "details": titles,
            "impact": "high",
        }));
    }

    for story in list(outcomes, "incomplete_stories") {
        minutes.action_items.push(ActionItem::open(
            format!("carryover_{}", id_text(story)),
            format!("Carry over incomplete story: {}", str_or(story, "title", "Untitled")),
            str_or(story, "assigned_to", BACKLOG_OWNER),
            "high",
        ));
    }

    for feedback in list(outcomes, "demo_feedback") {
        minutes.decisions.push(json!({
            "type": "feedback_item",
            "description": str_or(feedback, "description", ""),
            "priority": str_or(feedback, "priority", "medium"),
            "action_required": feedback.get("action_required").and_then(Value::as_bool).unwrap_or(false),
        }));
    }
}

fn process_retrospective(minutes: &mut MeetingMinutes) {
    let stamp = minutes.date.timestamp_micros();
    for (n, improvement) in list(&minutes.outcomes, "improvements").iter().enumerate() {
        minutes.action_items.push(ActionItem::open(
            format!("improvement_{stamp}_{n}"),
            str_or(improvement, "description", "").to_string(),
            str_or(improvement, "owner", COORDINATOR),
            str_or(improvement, "priority", "medium"),
        ));
        minutes.decisions.push(json!({
            "type": "process_improvement",
            "description": str_or(improvement, "description", ""),
            "rationale": "Identified during retrospective",
            "expected_benefit": str_or(improvement, "expected_benefit", ""),
        }));
    }

    minutes.next_steps = vec![
        "Apply identified improvements in next sprint".to_string(),
        "Monitor effectiveness of changes".to_string(),
        "Continue practices that worked well".to_string(),
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> SprintMemoryManager {
        let mut memory = SprintMemoryManager::new();
        memory.initialize_sprint("p1", "s1", "Ship checkout", Value::Null);
        memory
    }

    fn team() -> Vec<Participant> {
        ["manager-001", "dev-001"]
            .iter()
            .map(|id| Participant {
                agent_id: id.to_string(),
                role: id.trim_end_matches("-001").to_string(),
                attendance: Attendance::Present,
            })
            .collect()
    }

    #[test]
    fn planning_assigns_stories_and_flags_capacity() {
        let mut memory = memory();
        let mut meetings = MeetingMinutesManager::new(&mut memory);
        let minutes = meetings
            .create_minutes(
                "p1",
                "s1",
                MeetingType::Planning,
                team(),
                Value::Null,
                json!({
                    "sprint_goal": "Ship checkout",
                    "user_stories": [
                        {"id": 1, "title": "Pay by card", "assigned_to": "dev-001", "points": 8},
                        {"id": 2, "title": "Receipts", "points": 5}
                    ],
                    "team_capacity": {"dev-001": 10}
                }),
            )
            .unwrap();

        assert_eq!(minutes.action_items.len(), 1);
        assert_eq!(minutes.action_items[0].id, "story_1");
        assert_eq!(minutes.action_items[0].description, "Complete user story: Pay by card");
        assert_eq!(minutes.decisions[0]["description"], "Sprint goal set: Ship checkout");
        assert_eq!(minutes.blockers_identified.len(), 1);
        assert_eq!(
            minutes.blockers_identified[0]["description"],
            "Story points (13) exceed team capacity (10)"
        );
        assert_eq!(minutes.agenda["agenda_items"][0], "Review sprint goal");

        let core = memory.core("p1", "s1").unwrap();
        assert_eq!(core["key_decisions"].as_array().unwrap().len(), 1);
        assert_eq!(core["active_blockers"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn daily_collects_blockers_and_help_requests() {
        let mut memory = memory();
        let minutes = MeetingMinutesManager::new(&mut memory)
            .create_minutes(
                "p1",
                "s1",
                MeetingType::Daily,
                team(),
                Value::Null,
                json!({"agent_updates": {
                    "dev-001": {"blockers": ["API keys missing", "CI flaky"], "needs_help": "payment sandbox"},
                    "qa-001": {"blockers": []}
                }}),
            )
            .unwrap();

        assert_eq!(minutes.blockers_identified.len(), 2);
        assert_eq!(minutes.blockers_identified[0]["affected_agent"], "dev-001");
        assert_eq!(minutes.action_items.len(), 1);
        assert_eq!(minutes.action_items[0].assigned_to, "manager-001");
        assert_eq!(minutes.action_items[0].priority, "high");
        assert_eq!(minutes.next_steps.len(), 3);
    }

    #[test]
    fn review_and_retro_shape_decisions() {
        let mut memory = memory();
        let mut meetings = MeetingMinutesManager::new(&mut memory);
        let review = meetings
            .create_minutes(
                "p1",
                "s1",
                MeetingType::Review,
                team(),
                Value::Null,
                json!({
                    "completed_stories": [{"title": "Pay by card"}],
                    "incomplete_stories": [{"id": "s-9", "title": "Receipts"}],
                    "demo_feedback": [{"description": "Bigger buttons", "action_required": true}]
                }),
            )
            .unwrap();
        assert_eq!(review.decisions.len(), 2);
        assert_eq!(review.decisions[0]["details"], json!(["Pay by card"]));
        assert_eq!(review.action_items[0].id, "carryover_s-9");
        assert_eq!(review.action_items[0].assigned_to, "pm-001");
        assert_eq!(review.summary()["key_outcomes"][1], "Stories incomplete: 1");

        let retro = meetings
            .create_minutes(
                "p1",
                "s1",
                MeetingType::Retrospective,
                team(),
                Value::Null,
                json!({"improvements": [{"description": "Pair on payments", "expected_benefit": "fewer bugs"}]}),
            )
            .unwrap();
        assert_eq!(retro.action_items[0].assigned_to, "manager-001");
        assert_eq!(retro.decisions[0]["rationale"], "Identified during retrospective");
    }

    #[test]
    fn history_reads_back_from_episodic_memory() {
        let mut memory = memory();
        memory.add_meeting("p1", "s1", "standup", json!({"free": "form"}));
        let mut meetings = MeetingMinutesManager::new(&mut memory);
        meetings
            .create_minutes("p1", "s1", MeetingType::Daily, team(), Value::Null, json!({}))
            .unwrap();
        meetings
            .create_minutes("p1", "s1", MeetingType::AdHoc, team(), json!({"topic": "outage"}), json!({}))
            .unwrap();

        assert_eq!(meetings.history("p1", "s1", None, 10).len(), 2);
        let daily = meetings.history("p1", "s1", Some(MeetingType::Daily), 10);
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].meeting_type, MeetingType::Daily);
        assert!(MeetingType::AdHoc.template().is_none());
    }

    #[test]
    fn uninitialized_sprint_is_rejected() {
        let mut memory = SprintMemoryManager::new();
        let result = MeetingMinutesManager::new(&mut memory).create_minutes(
            "p1",
            "s1",
            MeetingType::Daily,
            Vec::new(),
            Value::Null,
            json!({}),
        );
        assert!(matches!(result, Err(MemoryError::SprintNotInitialized { .. })));
        assert!(memory.layer_items("p1", "s1", MemoryLayer::Episodic).is_empty());
    }
}
