//! Application-level acknowledgement tracking
//!
//! An acked publish is only complete once the receiving actor has processed
//! it and sent back a `gridworks.ack` naming its message id. The tracker is
//! owned by the dispatch loop; the periodic scan is just another loop item.

use super::link::Qos;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Delivered to an [`AckTimeoutPolicy`] when a deadline passes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No ack for {message_type} {message_id} on link {link} (retries so far: {retry_count})")]
pub struct AckTimeoutError {
    pub message_id: Uuid,
    pub link: String,
    pub message_type: String,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutDecision {
    /// Publish the same message (same id) again with a fresh deadline
    Retry,
    /// Give up and force the owning link to Faulted
    Escalate,
    /// Give up quietly
    Abandon,
}

/// Caller-supplied reaction to an ack timeout
pub trait AckTimeoutPolicy: Send + 'static {
    fn on_timeout(&mut self, error: &AckTimeoutError) -> TimeoutDecision;
}

/// Retry up to `max_retries` times, then escalate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryThenEscalate {
    pub max_retries: u32,
}

impl Default for RetryThenEscalate {
    fn default() -> Self {
        Self { max_retries: 1 }
    }
}

impl AckTimeoutPolicy for RetryThenEscalate {
    fn on_timeout(&mut self, error: &AckTimeoutError) -> TimeoutDecision {
        if error.retry_count < self.max_retries {
            TimeoutDecision::Retry
        } else {
            TimeoutDecision::Escalate
        }
    }
}

/// Adapts a closure into a policy
pub struct OnTimeout<F>(pub F);

impl<F> AckTimeoutPolicy for OnTimeout<F>
where
    F: FnMut(&AckTimeoutError) -> TimeoutDecision + Send + 'static,
{
    fn on_timeout(&mut self, error: &AckTimeoutError) -> TimeoutDecision {
        (self.0)(error)
    }
}

/// One publish awaiting its ack
pub struct PendingAck {
    pub message_id: Uuid,
    pub link: String,
    pub message_type: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub deadline_ns: i64,
    pub retry_count: u32,
    pub policy: Box<dyn AckTimeoutPolicy>,
}

impl PendingAck {
    pub fn timeout_error(&self) -> AckTimeoutError {
        AckTimeoutError {
            message_id: self.message_id,
            link: self.link.clone(),
            message_type: self.message_type.clone(),
            retry_count: self.retry_count,
        }
    }

    /// Run this entry's policy for its expired deadline
    pub fn decide(&mut self) -> (AckTimeoutError, TimeoutDecision) {
        let error = self.timeout_error();
        let decision = self.policy.on_timeout(&error);
        (error, decision)
    }
}

impl fmt::Debug for PendingAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAck")
            .field("message_id", &self.message_id)
            .field("link", &self.link)
            .field("message_type", &self.message_type)
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("deadline_ns", &self.deadline_ns)
            .field("retry_count", &self.retry_count)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct AckTracker {
    pending: HashMap<Uuid, PendingAck>,
}

impl AckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking. A second entry for the same id replaces the first.
    pub fn track(&mut self, entry: PendingAck) {
        self.pending.insert(entry.message_id, entry);
    }

    /// Cancel the entry for `message_id`. Returns false for late or
    /// unknown acks, which are otherwise ignored.
    pub fn acknowledge(&mut self, message_id: &Uuid) -> bool {
        self.pending.remove(message_id).is_some()
    }

    /// Remove and return every entry whose deadline is at or before `now_ns`,
    /// earliest deadline first. An entry is returned at most once.
    pub fn take_expired(&mut self, now_ns: i64) -> Vec<PendingAck> {
        let expired: Vec<Uuid> = self
            .pending
            .values()
            .filter(|entry| entry.deadline_ns <= now_ns)
            .map(|entry| entry.message_id)
            .collect();
        let mut entries: Vec<PendingAck> = expired
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .collect();
        entries.sort_by_key(|entry| entry.deadline_ns);
        entries
    }

    /// Drop everything without running any policy
    pub fn discard_all(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn is_pending(&self, message_id: &Uuid) -> bool {
        self.pending.contains_key(message_id)
    }

    pub fn pending_for_link(&self, link: &str) -> usize {
        self.pending.values().filter(|entry| entry.link == link).count()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
