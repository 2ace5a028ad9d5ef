//! Pure per-link connectivity state machine
//!
//! Nothing in here performs I/O. [`LinkStateMachine::apply`] takes an event
//! and a timestamp and returns the [`CommEvent`] describing the transition,
//! or `None` when the event does not apply in the current state.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    NotStarted,
    Connecting,
    Subscribing,
    Active,
    Suspended,
    Faulted,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::NotStarted => "not_started",
            LinkState::Connecting => "connecting",
            LinkState::Subscribing => "subscribing",
            LinkState::Active => "active",
            LinkState::Suspended => "suspended",
            LinkState::Faulted => "faulted",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that drive link transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Start,
    Connected,
    SubscriptionsAcked,
    ConnectFailed(String),
    SubscribeFailed(String),
    Disconnected(String),
    ProbeMissed,
    ProbeAnswered,
    ProbeTimeout,
    BackoffElapsed,
}

impl LinkEvent {
    /// Human-readable cause recorded on the resulting [`CommEvent`]
    pub fn cause(&self) -> String {
        match self {
            LinkEvent::Start => "start".to_string(),
            LinkEvent::Connected => "connected".to_string(),
            LinkEvent::SubscriptionsAcked => "subscriptions acknowledged".to_string(),
            LinkEvent::ConnectFailed(reason) => format!("connect failed: {reason}"),
            LinkEvent::SubscribeFailed(reason) => format!("subscribe failed: {reason}"),
            LinkEvent::Disconnected(reason) => reason.clone(),
            LinkEvent::ProbeMissed => "liveness probe missed".to_string(),
            LinkEvent::ProbeAnswered => "liveness probe answered".to_string(),
            LinkEvent::ProbeTimeout => "liveness probe timed out".to_string(),
            LinkEvent::BackoffElapsed => "backoff elapsed".to_string(),
        }
    }

    fn is_failure(&self) -> bool {
        matches!(
            self,
            LinkEvent::ConnectFailed(_) | LinkEvent::SubscribeFailed(_) | LinkEvent::Disconnected(_)
        )
    }
}

/// Audit record of one link transition. Never mutated once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommEvent {
    pub link: String,
    pub from: LinkState,
    pub to: LinkState,
    pub cause: String,
    pub timestamp_ns: i64,
}

/// Transition table (pure function)
pub fn next_state(state: LinkState, event: &LinkEvent) -> Option<LinkState> {
    use LinkState::*;

    if event.is_failure() {
        return match state {
            Connecting | Subscribing | Active | Suspended => Some(Faulted),
            NotStarted | Faulted => None,
        };
    }

    match (state, event) {
        (NotStarted, LinkEvent::Start) => Some(Connecting),
        (Connecting, LinkEvent::Connected) => Some(Subscribing),
        (Subscribing, LinkEvent::SubscriptionsAcked) => Some(Active),
        (Active, LinkEvent::ProbeMissed) => Some(Suspended),
        (Suspended, LinkEvent::ProbeAnswered) => Some(Active),
        (Suspended, LinkEvent::ProbeTimeout) => Some(Faulted),
        (Faulted, LinkEvent::BackoffElapsed) => Some(Connecting),
        _ => None,
    }
}

/// Current state of one link plus the name stamped on its events
#[derive(Debug, Clone)]
pub struct LinkStateMachine {
    link: String,
    state: LinkState,
}

impl LinkStateMachine {
    pub fn new<S: Into<String>>(link: S) -> Self {
        Self {
            link: link.into(),
            state: LinkState::NotStarted,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn apply(&mut self, event: LinkEvent, now_ns: i64) -> Option<CommEvent> {
        let to = next_state(self.state, &event)?;
        let from = self.state;
        self.state = to;
        Some(CommEvent {
            link: self.link.clone(),
            from,
            to,
            cause: event.cause(),
            timestamp_ns: now_ns,
        })
    }
}

/// Reconnection backoff. The core never gives up on a link; the delay
/// settles at `sustained_delay` once the pattern is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay after the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![250, 500, 1000, 2500],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay in milliseconds for the 1-based `attempt`
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}
