use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::protocol::{validate_message, BusMessage, MessageStatus};
use crate::domain::agent::AgentRole;

/// How long a queued message stays deliverable
pub const DEFAULT_MESSAGE_TTL_SECS: i64 = 3600;

#[derive(Debug, Error, PartialEq)]
pub enum BusError {
    #[error("Agent {0} is not registered")]
    AgentNotRegistered(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),

    #[error("Project delivery requires a project_id")]
    MissingProject,

    #[error("No recipients for message")]
    NoRecipients,

    #[error("Invalid message: {}", .0.join("; "))]
    InvalidMessage(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Direct,
    Broadcast,
    /// `to_agent` names a role
    Role,
    /// Every agent that joined the message's project
    Project,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub message: BusMessage,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BusStats {
    pub registered_agents: usize,
    pub tracked_messages: usize,
    pub messages_sent: u64,
    pub messages_delivered: u64,
    pub messages_failed: u64,
    pub dead_letters: usize,
    pub queue_sizes: BTreeMap<String, usize>,
}

#[derive(Debug, Default)]
pub struct RetryOutcome {
    pub retried: usize,
    pub dead_lettered: usize,
}

#[derive(Debug)]
struct Mailbox {
    role: AgentRole,
    projects: HashSet<String>,
    queue: Vec<Queued>,
}

#[derive(Debug)]
struct Queued {
    message: BusMessage,
    expires_at: DateTime<Utc>,
    seq: u64,
}

#[derive(Debug)]
struct Tracked {
    message: BusMessage,
    sent_at: DateTime<Utc>,
}

impl Tracked {
    /// Tracking lapses at the message's own expiry or one TTL after sending,
    /// whichever comes first; processed messages lapse immediately
    fn is_stale(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.message.status == MessageStatus::Processed
            || self.message.is_expired_at(now)
            || now > self.sent_at + ttl
    }
}

#[derive(Debug, Default)]
struct BusState {
    mailboxes: HashMap<String, Mailbox>,
    tracking: HashMap<Uuid, Tracked>,
    dead_letters: Vec<DeadLetter>,
    seq: u64,
    sent: u64,
    delivered: u64,
    failed: u64,
}

impl BusState {
    /// Queues a message for its `to_agent`, failing when no mailbox exists
    fn enqueue(&mut self, message: BusMessage, ttl: Duration, now: DateTime<Utc>) -> Result<(), BusMessage> {
        let Some(mailbox) = self.mailboxes.get_mut(&message.to_agent) else {
            return Err(message);
        };

        let ttl_end = now + ttl;
        let expires_at = message.expires_at.map_or(ttl_end, |at| at.min(ttl_end));
        self.seq += 1;
        mailbox.queue.push(Queued {
            message,
            expires_at,
            seq: self.seq,
        });
        Ok(())
    }

    fn track(&mut self, mut message: BusMessage, status: MessageStatus, now: DateTime<Utc>) {
        message.status = status;
        self.tracking.insert(message.message_id, Tracked { message, sent_at: now });
    }
}

/// In-process message bus with one priority queue per agent
///
/// Messages that cannot be delivered are tracked as failed and retried by
/// [`MessageBus::retry_failed`] until their attempts run out, at which
/// point they move to the dead-letter list.
#[derive(Debug)]
pub struct MessageBus {
    state: RwLock<BusState>,
    ttl: Duration,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(DEFAULT_MESSAGE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(BusState::default()),
            ttl,
        }
    }

    pub async fn register_agent(&self, agent_id: &str, role: AgentRole) {
        let mut state = self.state.write().await;
        state
            .mailboxes
            .entry(agent_id.to_string())
            .and_modify(|m| m.role = role)
            .or_insert_with(|| Mailbox {
                role,
                projects: HashSet::new(),
                queue: Vec::new(),
            });
        info!(agent_id, role = role.as_str(), "Registered agent on message bus");
    }

    /// Drops the agent's mailbox and any queued messages
    pub async fn unregister_agent(&self, agent_id: &str) -> bool {
        let removed = self.state.write().await.mailboxes.remove(agent_id).is_some();
        if removed {
            info!(agent_id, "Unregistered agent from message bus");
        }
        removed
    }

    pub async fn join_project(&self, agent_id: &str, project_id: &str) -> Result<(), BusError> {
        let mut state = self.state.write().await;
        let mailbox = state
            .mailboxes
            .get_mut(agent_id)
            .ok_or_else(|| BusError::AgentNotRegistered(agent_id.to_string()))?;
        mailbox.projects.insert(project_id.to_string());
        Ok(())
    }

    pub async fn leave_project(&self, agent_id: &str, project_id: &str) {
        if let Some(mailbox) = self.state.write().await.mailboxes.get_mut(agent_id) {
            mailbox.projects.remove(project_id);
        }
    }

    /// Sends a message and returns how many mailboxes received a copy
    ///
    /// A direct message to an unregistered agent is kept as failed so it can
    /// be retried once the agent registers.
    pub async fn send(&self, message: BusMessage, mode: DeliveryMode) -> Result<usize, BusError> {
        let errors = validate_message(&message);
        if !errors.is_empty() {
            warn!(message_id = %message.message_id, ?errors, "Rejected invalid message");
            return Err(BusError::InvalidMessage(errors));
        }

        debug!(
            message_id = %message.message_id,
            from = %message.from_agent,
            to = %message.to_agent,
            message_type = ?message.message_type,
            ?mode,
            "Sending message"
        );

        let now = Utc::now();
        let mut state = self.state.write().await;

        let copies: Vec<BusMessage> = match mode {
            DeliveryMode::Direct => vec![message],
            DeliveryMode::Broadcast => state
                .mailboxes
                .keys()
                .filter(|id| **id != message.from_agent)
                .map(|id| message.addressed_to(id))
                .collect(),
            DeliveryMode::Role => {
                let role =
                    AgentRole::parse(&message.to_agent).ok_or_else(|| BusError::UnknownRole(message.to_agent.clone()))?;
                state
                    .mailboxes
                    .iter()
                    .filter(|(_, m)| m.role == role)
                    .map(|(id, _)| message.addressed_to(id))
                    .collect()
            }
            DeliveryMode::Project => {
                let project = message.project_id.clone().ok_or(BusError::MissingProject)?;
                state
                    .mailboxes
                    .iter()
                    .filter(|(id, m)| **id != message.from_agent && m.projects.contains(&project))
                    .map(|(id, _)| message.addressed_to(id))
                    .collect()
            }
        };

        if copies.is_empty() {
            return Err(BusError::NoRecipients);
        }

        let mut delivered = 0usize;
        let mut missing = None;
        for copy in copies {
            let tracked = copy.clone();
            match state.enqueue(copy, self.ttl, now) {
                Ok(()) => {
                    state.track(tracked, MessageStatus::Pending, now);
                    delivered += 1;
                }
                Err(mut undelivered) => {
                    undelivered.delivery_attempts += 1;
                    missing = Some(undelivered.to_agent.clone());
                    state.track(undelivered, MessageStatus::Failed, now);
                }
            }
        }

        state.sent += delivered as u64;
        match (delivered, missing) {
            (0, Some(agent)) => {
                warn!(agent_id = %agent, "Recipient not registered, message held for retry");
                Err(BusError::AgentNotRegistered(agent))
            }
            _ => Ok(delivered),
        }
    }

    /// Pops up to `max` messages, most urgent first and FIFO within a
    /// priority; expired messages are dropped on the way
    pub async fn receive(&self, agent_id: &str, max: usize) -> Vec<BusMessage> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let Some(mailbox) = state.mailboxes.get_mut(agent_id) else {
            return Vec::new();
        };

        mailbox.queue.retain(|q| q.expires_at >= now);
        mailbox
            .queue
            .sort_by(|a, b| a.message.priority.cmp(&b.message.priority).then(a.seq.cmp(&b.seq)));

        let take = max.min(mailbox.queue.len());
        let batch: Vec<BusMessage> = mailbox.queue.drain(..take).map(|q| q.message).collect();

        for message in &batch {
            if let Some(tracked) = state.tracking.get_mut(&message.message_id) {
                tracked.message.status = MessageStatus::Delivered;
            }
        }
        state.delivered += batch.len() as u64;

        batch
            .into_iter()
            .map(|mut m| {
                m.status = MessageStatus::Delivered;
                m
            })
            .collect()
    }

    pub async fn mark_processed(&self, message_id: Uuid) {
        if let Some(tracked) = self.state.write().await.tracking.get_mut(&message_id) {
            tracked.message.status = MessageStatus::Processed;
        }
    }

    /// Flags a delivered message whose handling failed so it is retried
    pub async fn mark_failed(&self, message_id: Uuid) {
        if let Some(tracked) = self.state.write().await.tracking.get_mut(&message_id) {
            tracked.message.status = MessageStatus::Failed;
        }
    }

    /// Re-delivers failed messages; those out of attempts are dead-lettered
    pub async fn retry_failed(&self) -> RetryOutcome {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut outcome = RetryOutcome::default();

        let failed: Vec<Uuid> = state
            .tracking
            .iter()
            .filter(|(_, t)| t.message.status == MessageStatus::Failed)
            .map(|(id, _)| *id)
            .collect();

        for id in failed {
            let Some(tracked) = state.tracking.remove(&id) else {
                continue;
            };
            let mut message = tracked.message;

            if !message.should_retry_delivery() {
                warn!(message_id = %id, attempts = message.delivery_attempts, "Moved message to dead letters");
                state.failed += 1;
                state.dead_letters.push(DeadLetter {
                    message,
                    failed_at: now,
                    reason: "max_retry_attempts_exceeded".to_string(),
                });
                outcome.dead_lettered += 1;
                continue;
            }

            message.delivery_attempts += 1;
            outcome.retried += 1;
            let mut queued = message.clone();
            queued.status = MessageStatus::Pending;
            match state.enqueue(queued, self.ttl, now) {
                Ok(()) => state.track(message, MessageStatus::Pending, tracked.sent_at),
                Err(_) => state.track(message, MessageStatus::Failed, tracked.sent_at),
            }
        }

        if outcome.retried + outcome.dead_lettered > 0 {
            info!(retried = outcome.retried, dead_lettered = outcome.dead_lettered, "Retried failed messages");
        }
        outcome
    }

    /// Drops expired and processed messages from tracking, and expired
    /// messages from every queue
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let mut state = self.state.write().await;
        let before = state.tracking.len();
        state.tracking.retain(|_, t| !t.is_stale(ttl, now));
        let purged = before - state.tracking.len();

        for mailbox in state.mailboxes.values_mut() {
            mailbox.queue.retain(|q| q.expires_at >= now);
        }

        if purged > 0 {
            info!(purged, "Purged expired messages");
        }
        purged
    }

    pub async fn message_status(&self, message_id: Uuid) -> Option<MessageStatus> {
        self.state
            .read()
            .await
            .tracking
            .get(&message_id)
            .map(|t| t.message.status)
    }

    pub async fn queue_size(&self, agent_id: &str) -> usize {
        self.state
            .read()
            .await
            .mailboxes
            .get(agent_id)
            .map_or(0, |m| m.queue.len())
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.read().await.dead_letters.clone()
    }

    pub async fn stats(&self) -> BusStats {
        let state = self.state.read().await;
        BusStats {
            registered_agents: state.mailboxes.len(),
            tracked_messages: state.tracking.len(),
            messages_sent: state.sent,
            messages_delivered: state.delivered,
            messages_failed: state.failed,
            dead_letters: state.dead_letters.len(),
            queue_sizes: state
                .mailboxes
                .iter()
                .map(|(id, m)| (id.clone(), m.queue.len()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::protocol::{MessagePriority, MessageType};
    use serde_json::json;

    async fn bus() -> MessageBus {
        let bus = MessageBus::new();
        bus.register_agent("manager-001", AgentRole::Manager).await;
        bus.register_agent("dev-001", AgentRole::Developer).await;
        bus.register_agent("dev-002", AgentRole::Developer).await;
        bus.register_agent("qa-001", AgentRole::Qa).await;
        bus
    }

    fn msg(to: &str, priority: MessagePriority) -> BusMessage {
        BusMessage::new("manager-001", to, MessageType::InformationShare).with_priority(priority)
    }

    #[tokio::test]
    async fn direct_delivery_reaches_one_mailbox() {
        let bus = bus().await;
        assert_eq!(bus.send(msg("dev-001", MessagePriority::Medium), DeliveryMode::Direct).await, Ok(1));
        assert_eq!(bus.queue_size("dev-001").await, 1);
        assert_eq!(bus.queue_size("dev-002").await, 0);
    }

    #[tokio::test]
    async fn receive_orders_by_priority_then_arrival() {
        let bus = bus().await;
        let low = msg("dev-001", MessagePriority::Low).with_subject("low");
        let first_high = msg("dev-001", MessagePriority::High).with_subject("high-1");
        let critical = msg("dev-001", MessagePriority::Critical).with_subject("critical");
        let second_high = msg("dev-001", MessagePriority::High).with_subject("high-2");
        for m in [low, first_high, critical, second_high] {
            bus.send(m, DeliveryMode::Direct).await.unwrap();
        }

        let received = bus.receive("dev-001", 3).await;
        let subjects: Vec<&str> = received.iter().map(|m| m.subject.as_str()).collect();
        assert_eq!(subjects, vec!["critical", "high-1", "high-2"]);
        assert_eq!(bus.queue_size("dev-001").await, 1);
        assert_eq!(
            bus.message_status(received[0].message_id).await,
            Some(MessageStatus::Delivered)
        );
    }

    #[tokio::test]
    async fn broadcast_skips_sender() {
        let bus = bus().await;
        let sent = bus.send(msg("*", MessagePriority::Low), DeliveryMode::Broadcast).await;
        assert_eq!(sent, Ok(3));
        assert_eq!(bus.queue_size("manager-001").await, 0);
    }

    #[tokio::test]
    async fn role_delivery_targets_matching_agents() {
        let bus = bus().await;
        assert_eq!(bus.send(msg("developer", MessagePriority::High), DeliveryMode::Role).await, Ok(2));
        assert_eq!(bus.queue_size("qa-001").await, 0);

        let err = bus.send(msg("wizard", MessagePriority::High), DeliveryMode::Role).await;
        assert_eq!(err, Err(BusError::UnknownRole("wizard".to_string())));
    }

    #[tokio::test]
    async fn project_delivery_needs_members() {
        let bus = bus().await;
        let no_project = bus.send(msg("*", MessagePriority::Low), DeliveryMode::Project).await;
        assert_eq!(no_project, Err(BusError::MissingProject));

        bus.join_project("qa-001", "p1").await.unwrap();
        let sent = bus
            .send(msg("*", MessagePriority::Low).for_project("p1"), DeliveryMode::Project)
            .await;
        assert_eq!(sent, Ok(1));
        assert_eq!(bus.queue_size("qa-001").await, 1);

        let nobody = bus
            .send(msg("*", MessagePriority::Low).for_project("p2"), DeliveryMode::Project)
            .await;
        assert_eq!(nobody, Err(BusError::NoRecipients));
    }

    #[tokio::test]
    async fn invalid_messages_are_rejected() {
        let bus = bus().await;
        let bad = BusMessage::new("manager-001", "dev-001", MessageType::TaskAssignment);
        assert!(matches!(
            bus.send(bad, DeliveryMode::Direct).await,
            Err(BusError::InvalidMessage(_))
        ));
    }

    #[tokio::test]
    async fn failed_delivery_retries_then_dead_letters() {
        let bus = bus().await;
        let message = msg("ui-001", MessagePriority::Medium);
        let id = message.message_id;
        assert_eq!(
            bus.send(message, DeliveryMode::Direct).await,
            Err(BusError::AgentNotRegistered("ui-001".to_string()))
        );
        assert_eq!(bus.message_status(id).await, Some(MessageStatus::Failed));

        // attempts 1 -> 2 -> 3, then out of retries
        assert_eq!(bus.retry_failed().await.retried, 1);
        assert_eq!(bus.retry_failed().await.retried, 1);
        let last = bus.retry_failed().await;
        assert_eq!(last.dead_lettered, 1);

        let dead = bus.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].message.delivery_attempts, 3);
        assert_eq!(bus.stats().await.messages_failed, 1);
    }

    #[tokio::test]
    async fn retry_succeeds_once_recipient_registers() {
        let bus = bus().await;
        let message = msg("ui-001", MessagePriority::Medium);
        let id = message.message_id;
        let _ = bus.send(message, DeliveryMode::Direct).await;

        bus.register_agent("ui-001", AgentRole::Ui).await;
        assert_eq!(bus.retry_failed().await.retried, 1);
        assert_eq!(bus.message_status(id).await, Some(MessageStatus::Pending));
        assert_eq!(bus.receive("ui-001", 10).await.len(), 1);
    }

    #[tokio::test]
    async fn expired_messages_are_purged() {
        let bus = bus().await;
        let message = msg("dev-001", MessagePriority::Medium).expires_in(Duration::minutes(5));
        bus.send(message, DeliveryMode::Direct).await.unwrap();

        let later = Utc::now() + Duration::minutes(10);
        assert_eq!(bus.purge_expired(later).await, 1);
        assert_eq!(bus.queue_size("dev-001").await, 0);
    }

    #[tokio::test]
    async fn processed_and_lapsed_messages_leave_tracking() {
        let bus = bus().await;
        for _ in 0..50 {
            bus.send(msg("dev-001", MessagePriority::Medium), DeliveryMode::Direct).await.unwrap();
        }
        for message in bus.receive("dev-001", 50).await {
            bus.mark_processed(message.message_id).await;
        }
        // delivered but never processed, no explicit expiry
        bus.send(msg("qa-001", MessagePriority::Low), DeliveryMode::Direct).await.unwrap();
        assert_eq!(bus.stats().await.tracked_messages, 51);

        assert_eq!(bus.purge_expired(Utc::now()).await, 50);
        assert_eq!(bus.stats().await.tracked_messages, 1);

        let month_later = Utc::now() + Duration::days(30);
        assert_eq!(bus.purge_expired(month_later).await, 1);
        assert_eq!(bus.stats().await.tracked_messages, 0);
    }

    #[tokio::test]
    async fn stats_reflect_traffic() {
        let bus = bus().await;
        bus.send(msg("dev-001", MessagePriority::Medium), DeliveryMode::Direct).await.unwrap();
        bus.receive("dev-001", 10).await;

        let stats = bus.stats().await;
        assert_eq!(stats.registered_agents, 4);
        assert_eq!(stats.messages_sent, 1);
        assert_eq!(stats.messages_delivered, 1);
        assert_eq!(stats.queue_sizes["dev-001"], 0);
    }

    #[tokio::test]
    async fn unregister_drops_mailbox() {
        let bus = bus().await;
        assert!(bus.unregister_agent("qa-001").await);
        assert!(!bus.unregister_agent("qa-001").await);
        let payload = json!({"note": "hi"});
        let result = bus
            .send(msg("qa-001", MessagePriority::Low).with_payload(payload), DeliveryMode::Direct)
            .await;
        assert!(result.is_err());
    }
}
