use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Upper bound on a serialized message
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 300;
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;
/// Every conflict report is routed to the team manager
pub const CONFLICT_MEDIATOR: &str = "manager-001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskAssignment,
    WorkComplete,
    WorkRequest,
    DependencyReady,
    InformationShare,
    StatusUpdate,
    ProgressReport,
    HelpRequest,
    ConflictReport,
    BlockerReport,
    ValidationRequest,
    ValidationResponse,
    ReviewRequest,
    ReviewResponse,
    MeetingInvite,
    MeetingResponse,
    MeetingUpdate,
    Heartbeat,
    ErrorReport,
    ShutdownNotice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Delivered,
    Read,
    Processed,
    Failed,
    Expired,
}

/// Envelope exchanged between agents on the bus
///
/// `to_agent` holds an agent id for direct delivery, a role name for
/// role delivery, and is ignored for broadcast and project delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub message_id: Uuid,
    pub conversation_id: Option<Uuid>,
    pub from_agent: String,
    pub to_agent: String,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub subject: String,
    pub payload: Value,
    pub project_id: Option<String>,
    pub sprint_id: Option<String>,
    pub task_id: Option<String>,
    pub status: MessageStatus,
    pub delivery_attempts: u32,
    pub max_delivery_attempts: u32,
    pub requires_response: bool,
    pub response_timeout_seconds: Option<u64>,
    pub in_reply_to: Option<Uuid>,
}

impl BusMessage {
    pub fn new(from_agent: impl Into<String>, to_agent: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            conversation_id: None,
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            message_type,
            priority: MessagePriority::Medium,
            created_at: Utc::now(),
            expires_at: None,
            subject: String::new(),
            payload: json!({}),
            project_id: None,
            sprint_id: None,
            task_id: None,
            status: MessageStatus::Pending,
            delivery_attempts: 0,
            max_delivery_attempts: MAX_DELIVERY_ATTEMPTS,
            requires_response: false,
            response_timeout_seconds: None,
            in_reply_to: None,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn for_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn for_task(mut self, task_id: Option<String>) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn expires_in(mut self, ttl: Duration) -> Self {
        self.expires_at = Some(self.created_at + ttl);
        self
    }

    pub fn expecting_response(mut self, timeout_secs: Option<u64>) -> Self {
        self.requires_response = true;
        self.response_timeout_seconds = timeout_secs;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn should_retry_delivery(&self) -> bool {
        self.status == MessageStatus::Failed
            && self.delivery_attempts < self.max_delivery_attempts
            && !self.is_expired()
    }

    /// Reply addressed to the sender, continuing this conversation
    pub fn reply(
        &self,
        from_agent: impl Into<String>,
        message_type: MessageType,
        payload: Value,
        subject: Option<&str>,
    ) -> BusMessage {
        let mut reply = BusMessage::new(from_agent, self.from_agent.clone(), message_type)
            .with_priority(self.priority)
            .with_payload(payload)
            .with_subject(match subject {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => format!("Re: {}", self.subject),
            });
        reply.conversation_id = Some(self.conversation_id.unwrap_or(self.message_id));
        reply.project_id = self.project_id.clone();
        reply.sprint_id = self.sprint_id.clone();
        reply.task_id = self.task_id.clone();
        reply.in_reply_to = Some(self.message_id);
        reply
    }

    /// Copy of this message for one recipient of a fan-out delivery
    pub(crate) fn addressed_to(&self, agent_id: &str) -> BusMessage {
        let mut copy = self.clone();
        copy.message_id = Uuid::new_v4();
        copy.to_agent = agent_id.to_string();
        copy
    }
}

fn field(value: &Value, key: &str) -> Value {
    value.get(key).cloned().unwrap_or(Value::Null)
}

fn field_or(value: &Value, key: &str, default: Value) -> Value {
    value.get(key).cloned().unwrap_or(default)
}

fn text<'a>(value: &'a Value, key: &str, default: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub fn task_assignment(
    from: &str,
    to: &str,
    task: &Value,
    project_id: &str,
    priority: MessagePriority,
) -> BusMessage {
    BusMessage::new(from, to, MessageType::TaskAssignment)
        .with_priority(priority)
        .with_subject(format!("Task Assignment: {}", text(task, "title", "New Task")))
        .with_payload(json!({
            "task": task,
            "deadline": field(task, "deadline"),
            "requirements": field_or(task, "requirements", json!([])),
            "dependencies": field_or(task, "dependencies", json!([])),
        }))
        .for_project(project_id)
        .expecting_response(Some(DEFAULT_RESPONSE_TIMEOUT_SECS))
}

pub fn work_complete(
    from: &str,
    to: &str,
    result: &Value,
    project_id: &str,
    task_id: Option<String>,
) -> BusMessage {
    BusMessage::new(from, to, MessageType::WorkComplete)
        .with_priority(MessagePriority::High)
        .with_subject(format!("Work Complete: {}", text(result, "task_name", "Task")))
        .with_payload(json!({
            "result": result,
            "completion_time": Utc::now().to_rfc3339(),
            "quality_metrics": field_or(result, "quality_metrics", json!({})),
            "next_steps": field_or(result, "next_steps", json!([])),
        }))
        .for_project(project_id)
        .for_task(task_id)
        .expecting_response(None)
}

pub fn help_request(
    from: &str,
    to: &str,
    details: &Value,
    project_id: &str,
    urgency: MessagePriority,
) -> BusMessage {
    BusMessage::new(from, to, MessageType::HelpRequest)
        .with_priority(urgency)
        .with_subject(format!("Help Needed: {}", text(details, "topic", "Assistance Required")))
        .with_payload(json!({
            "problem_description": text(details, "problem", ""),
            "context": field_or(details, "context", json!({})),
            "attempted_solutions": field_or(details, "attempted", json!([])),
            "urgency_reason": text(details, "urgency_reason", ""),
        }))
        .for_project(project_id)
        .expecting_response(Some(1800))
}

pub fn conflict_report(from: &str, conflicting_agent: &str, details: &Value, project_id: &str) -> BusMessage {
    BusMessage::new(from, CONFLICT_MEDIATOR, MessageType::ConflictReport)
        .with_priority(MessagePriority::High)
        .with_subject(format!("Conflict Report: {from} vs {conflicting_agent}"))
        .with_payload(json!({
            "conflicting_agent": conflicting_agent,
            "conflict_type": text(details, "type", "unknown"),
            "description": text(details, "description", ""),
            "our_position": text(details, "our_position", ""),
            "their_position": text(details, "their_position", ""),
            "impact": text(details, "impact", "medium"),
            "suggested_resolution": text(details, "suggestion", ""),
        }))
        .for_project(project_id)
        .expecting_response(None)
}

pub fn validation_request(from: &str, to: &str, data: &Value, project_id: &str) -> BusMessage {
    BusMessage::new(from, to, MessageType::ValidationRequest)
        .with_subject(format!("Validation Request: {}", text(data, "item_type", "Item")))
        .with_payload(json!({
            "validation_type": text(data, "type", "general"),
            "item_to_validate": field_or(data, "item", json!({})),
            "validation_criteria": field_or(data, "criteria", json!([])),
            "context": field_or(data, "context", json!({})),
            "deadline": field(data, "deadline"),
        }))
        .for_project(project_id)
        .expecting_response(Some(3600))
}

pub fn status_update(from: &str, to: &str, status: &Value, project_id: &str) -> BusMessage {
    BusMessage::new(from, to, MessageType::StatusUpdate)
        .with_priority(MessagePriority::Low)
        .with_subject(format!("Status Update from {from}"))
        .with_payload(json!({
            "current_status": text(status, "status", "working"),
            "current_task": field_or(status, "current_task", json!({})),
            "progress": field_or(status, "progress", json!(0.0)),
            "blockers": field_or(status, "blockers", json!([])),
            "estimated_completion": field(status, "eta"),
            "next_steps": field_or(status, "next_steps", json!([])),
        }))
        .for_project(project_id)
}

/// One invite per attendee
pub fn meeting_invites(from: &str, attendees: &[String], meeting: &Value, project_id: &str) -> Vec<BusMessage> {
    attendees
        .iter()
        .map(|to| {
            BusMessage::new(from, to.as_str(), MessageType::MeetingInvite)
                .with_subject(format!("Meeting Invitation: {}", text(meeting, "title", "Team Meeting")))
                .with_payload(json!({
                    "meeting_type": text(meeting, "type", "general"),
                    "title": text(meeting, "title", ""),
                    "agenda": field_or(meeting, "agenda", json!([])),
                    "scheduled_time": text(meeting, "time", ""),
                    "duration_minutes": field_or(meeting, "duration", json!(60)),
                    "attendees": attendees,
                    "meeting_link": text(meeting, "link", ""),
                    "preparation_required": field_or(meeting, "preparation", json!([])),
                }))
                .for_project(project_id)
                .expecting_response(Some(7200))
        })
        .collect()
}

/// Lists every problem with a message; empty when it is well formed
pub fn validate_message(message: &BusMessage) -> Vec<String> {
    let mut errors = Vec::new();

    if message.from_agent.trim().is_empty() {
        errors.push("Missing from_agent".to_string());
    }
    if message.to_agent.trim().is_empty() {
        errors.push("Missing to_agent".to_string());
    }

    let size = serde_json::to_vec(message).map(|b| b.len()).unwrap_or(usize::MAX);
    if size > MAX_MESSAGE_BYTES {
        errors.push(format!("Message too large: {size} bytes (max: {MAX_MESSAGE_BYTES})"));
    }

    if message.is_expired() {
        errors.push("Message has expired".to_string());
    }

    let has = |key: &str| message.payload.get(key).is_some();
    match message.message_type {
        MessageType::TaskAssignment if !has("task") => {
            errors.push("Task assignment missing task details".to_string())
        }
        MessageType::WorkComplete if !has("result") => errors.push("Work complete missing result".to_string()),
        MessageType::HelpRequest if !has("problem_description") => {
            errors.push("Help request missing problem description".to_string())
        }
        MessageType::ConflictReport => {
            if !has("conflicting_agent") {
                errors.push("Conflict report missing conflicting agent".to_string());
            }
            if !has("description") {
                errors.push("Conflict report missing description".to_string());
            }
        }
        MessageType::ValidationRequest if !has("item_to_validate") => {
            errors.push("Validation request missing item to validate".to_string())
        }
        _ => {}
    }

    errors
}
