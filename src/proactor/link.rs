//! One broker link: subscriptions, publish policy, reconnect and liveness
//!
//! A [`Link`] is owned by the dispatch loop and mutated only there. It wraps
//! the pure [`LinkStateMachine`] and performs the side effects each
//! transition implies on its [`LinkTransport`].

use super::ack::AckTimeoutPolicy;
use super::link_state::{CommEvent, LinkEvent, LinkState, LinkStateMachine, ReconnectConfig};
use crate::config::{LinkSection, LivenessSection};
use crate::transport::{EventQueue, LinkEventSink, LinkTransport};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Qos {
    AtMostOnce,
    #[default]
    AtLeastOnce,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub topic: String,
    pub qos: Qos,
}

impl Subscription {
    pub fn new<S: Into<String>>(topic: S, qos: Qos) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

/// What to do with a publish issued while the link is not Active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPolicy {
    FailFast,
    #[default]
    QueueUntilActive,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Link {link}: connect failed: {reason}")]
    ConnectFailed { link: String, reason: String },
    #[error("Link {link}: subscribe failed: {reason}")]
    SubscribeFailed { link: String, reason: String },
    #[error("Link {link}: liveness probe timed out")]
    ProbeTimeout { link: String },
    #[error("Link {link} is {state}, not active")]
    NotActive { link: String, state: LinkState },
    #[error("Link {link}: outbox full ({capacity} queued)")]
    OutboxFull { link: String, capacity: usize },
    #[error("Link {link}: transport error: {reason}")]
    Transport { link: String, reason: String },
}

/// An encoded publish on its way to the transport
pub struct Outbound {
    pub message_id: Uuid,
    pub message_type: String,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
    pub retry_count: u32,
    /// Present when the publish requires an application-level ack
    pub ack: Option<Box<dyn AckTimeoutPolicy>>,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("message_id", &self.message_id)
            .field("message_type", &self.message_type)
            .field("topic", &self.topic)
            .field("qos", &self.qos)
            .field("retry_count", &self.retry_count)
            .field("ack_required", &self.ack.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum PublishOutcome {
    /// Handed to the transport; returned so the caller can track its ack
    Sent(Outbound),
    /// Held in the outbox until the link is Active
    Queued,
}

/// Liveness probing thresholds in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Liveness {
    pub interval_ns: i64,
    pub probe_timeout_ns: i64,
}

impl Liveness {
    pub fn from_config(section: &LivenessSection) -> Option<Self> {
        section.enabled.then(|| Self {
            interval_ns: millis_to_ns(section.interval_ms),
            probe_timeout_ns: millis_to_ns(section.probe_timeout_ms),
        })
    }
}

fn millis_to_ns(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX / 1_000_000).saturating_mul(1_000_000)
}

/// Result of one maintenance tick
#[derive(Debug, Default)]
pub struct LinkTick {
    pub events: Vec<CommEvent>,
    /// A liveness ping should be published now
    pub send_probe: bool,
}

pub struct Link {
    name: String,
    transport: Box<dyn LinkTransport>,
    queue: Arc<dyn EventQueue>,
    subscriptions: Vec<Subscription>,
    machine: LinkStateMachine,
    policy: PublishPolicy,
    outbox: VecDeque<Outbound>,
    outbox_capacity: usize,
    reconnect: ReconnectConfig,
    generation: u64,
    attempt: u32,
    retry_at_ns: Option<i64>,
    awaiting_subacks: HashSet<String>,
    subscribe_timeout_ns: i64,
    subscribe_deadline_ns: Option<i64>,
    last_receipt_ns: i64,
    probe_sent_ns: Option<i64>,
    peer: String,
}

impl Link {
    pub fn new(
        section: &LinkSection,
        transport: Box<dyn LinkTransport>,
        queue: Arc<dyn EventQueue>,
    ) -> Self {
        Self {
            name: section.name.clone(),
            transport,
            queue,
            subscriptions: section.subscriptions(),
            machine: LinkStateMachine::new(section.name.clone()),
            policy: section.publish_policy,
            outbox: VecDeque::new(),
            outbox_capacity: section.outbox_capacity,
            reconnect: section.reconnect_config(),
            generation: 0,
            attempt: 0,
            retry_at_ns: None,
            awaiting_subacks: HashSet::new(),
            subscribe_timeout_ns: millis_to_ns(section.subscribe_timeout_ms),
            subscribe_deadline_ns: None,
            last_receipt_ns: 0,
            probe_sent_ns: None,
            peer: section.peer.clone().unwrap_or_else(|| section.name.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LinkState {
        self.machine.state()
    }

    /// Alias of the node at the other end, used as `Dst` of probes
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn start(&mut self, now_ns: i64) -> Vec<CommEvent> {
        let mut events = Vec::new();
        self.transition(LinkEvent::Start, now_ns, &mut events);
        events
    }

    pub fn on_connected(&mut self, now_ns: i64) -> Vec<CommEvent> {
        let mut events = Vec::new();
        self.transition(LinkEvent::Connected, now_ns, &mut events);
        events
    }

    pub fn on_connect_failed(&mut self, reason: String, now_ns: i64) -> Vec<CommEvent> {
        let mut events = Vec::new();
        self.transition(LinkEvent::ConnectFailed(reason), now_ns, &mut events);
        events
    }

    pub fn on_disconnected(&mut self, reason: String, now_ns: i64) -> Vec<CommEvent> {
        let mut events = Vec::new();
        self.transition(LinkEvent::Disconnected(reason), now_ns, &mut events);
        events
    }

    pub fn on_suback(&mut self, topic: &str, success: bool, now_ns: i64) -> Vec<CommEvent> {
        let mut events = Vec::new();
        if self.state() != LinkState::Subscribing {
            return events;
        }
        if !success {
            self.transition(
                LinkEvent::SubscribeFailed(format!("broker rejected {topic}")),
                now_ns,
                &mut events,
            );
            return events;
        }
        self.awaiting_subacks.remove(topic);
        if self.awaiting_subacks.is_empty() {
            self.transition(LinkEvent::SubscriptionsAcked, now_ns, &mut events);
        }
        events
    }

    /// Any inbound traffic proves the peer is alive
    pub fn on_receipt(&mut self, now_ns: i64) -> Vec<CommEvent> {
        let mut events = Vec::new();
        self.last_receipt_ns = now_ns;
        self.probe_sent_ns = None;
        if self.state() == LinkState::Suspended {
            self.transition(LinkEvent::ProbeAnswered, now_ns, &mut events);
        }
        events
    }

    /// Drive reconnect backoff and liveness probing
    pub fn tick(&mut self, now_ns: i64, liveness: Option<Liveness>) -> LinkTick {
        let mut tick = LinkTick::default();
        match self.state() {
            LinkState::Faulted => {
                if self.retry_at_ns.is_some_and(|at| now_ns >= at) {
                    self.retry_at_ns = None;
                    self.transition(LinkEvent::BackoffElapsed, now_ns, &mut tick.events);
                }
            }
            LinkState::Active => {
                let Some(liveness) = liveness else {
                    return tick;
                };
                match self.probe_sent_ns {
                    None if now_ns - self.last_receipt_ns >= liveness.interval_ns => {
                        self.probe_sent_ns = Some(now_ns);
                        tick.send_probe = true;
                    }
                    Some(sent) if now_ns - sent >= liveness.probe_timeout_ns => {
                        self.transition(LinkEvent::ProbeMissed, now_ns, &mut tick.events);
                        self.probe_sent_ns = Some(now_ns);
                        tick.send_probe = true;
                    }
                    _ => {}
                }
            }
            LinkState::Suspended => {
                if let (Some(liveness), Some(sent)) = (liveness, self.probe_sent_ns) {
                    if now_ns - sent >= liveness.probe_timeout_ns {
                        self.transition(LinkEvent::ProbeTimeout, now_ns, &mut tick.events);
                    }
                }
            }
            LinkState::Subscribing => {
                if self.subscribe_deadline_ns.is_some_and(|at| now_ns >= at) {
                    self.subscribe_deadline_ns = None;
                    self.transition(
                        LinkEvent::SubscribeFailed("suback timeout".to_string()),
                        now_ns,
                        &mut tick.events,
                    );
                }
            }
            LinkState::NotStarted | LinkState::Connecting => {}
        }
        tick
    }

    /// Publish under this link's policy
    pub fn publish(&mut self, outbound: Outbound) -> Result<PublishOutcome, LinkError> {
        if self.state() == LinkState::Active {
            return self.send(outbound).map(PublishOutcome::Sent);
        }
        match self.policy {
            PublishPolicy::FailFast => Err(LinkError::NotActive {
                link: self.name.clone(),
                state: self.state(),
            }),
            PublishPolicy::QueueUntilActive => {
                if self.outbox.len() >= self.outbox_capacity {
                    return Err(LinkError::OutboxFull {
                        link: self.name.clone(),
                        capacity: self.outbox_capacity,
                    });
                }
                debug!(link = %self.name, message_type = %outbound.message_type, "Queued publish until link is active");
                self.outbox.push_back(outbound);
                Ok(PublishOutcome::Queued)
            }
        }
    }

    /// Send queued publishes in order. Returns what reached the transport.
    pub fn flush_outbox(&mut self) -> Vec<Outbound> {
        let mut sent = Vec::new();
        while self.state() == LinkState::Active {
            let Some(outbound) = self.outbox.pop_front() else {
                break;
            };
            if let Err(e) = self
                .transport
                .publish(&outbound.topic, outbound.payload.clone(), outbound.qos)
            {
                warn!(link = %self.name, error = %e, "Outbox flush interrupted");
                self.outbox.push_front(outbound);
                break;
            }
            sent.push(outbound);
        }
        sent
    }

    /// Publish link-control traffic (acks, probes), bypassing the outbox.
    /// Allowed while Active or Suspended.
    pub fn send_control(&mut self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), LinkError> {
        match self.state() {
            LinkState::Active | LinkState::Suspended => self
                .transport
                .publish(topic, payload, qos)
                .map_err(|e| LinkError::Transport {
                    link: self.name.clone(),
                    reason: e.to_string(),
                }),
            state => Err(LinkError::NotActive {
                link: self.name.clone(),
                state,
            }),
        }
    }

    /// Drive the link to Faulted from outside the transport (ack escalation)
    pub fn force_fault(&mut self, cause: &str, now_ns: i64) -> Vec<CommEvent> {
        let mut events = Vec::new();
        self.transition(LinkEvent::Disconnected(cause.to_string()), now_ns, &mut events);
        events
    }

    /// Close for shutdown. Queued publishes are dropped; returns how many.
    pub fn close(&mut self) -> usize {
        self.transport.disconnect();
        self.generation += 1;
        self.retry_at_ns = None;
        let dropped = self.outbox.len();
        self.outbox.clear();
        dropped
    }

    fn send(&mut self, outbound: Outbound) -> Result<Outbound, LinkError> {
        self.transport
            .publish(&outbound.topic, outbound.payload.clone(), outbound.qos)
            .map_err(|e| LinkError::Transport {
                link: self.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(outbound)
    }

    fn transition(&mut self, event: LinkEvent, now_ns: i64, events: &mut Vec<CommEvent>) {
        let failure = self.failure_for(&event);
        let Some(comm) = self.machine.apply(event, now_ns) else {
            return;
        };
        if let Some(error) = failure {
            warn!(link = %self.name, error = %error, "Link failure");
        }
        let to = comm.to;
        events.push(comm);

        match to {
            LinkState::Connecting => self.open_connection(now_ns, events),
            LinkState::Subscribing => self.request_subscriptions(now_ns, events),
            LinkState::Active => {
                self.attempt = 0;
                self.retry_at_ns = None;
                self.subscribe_deadline_ns = None;
                self.last_receipt_ns = now_ns;
                self.probe_sent_ns = None;
            }
            LinkState::Faulted => {
                self.transport.disconnect();
                self.generation += 1;
                self.attempt = self.attempt.saturating_add(1);
                self.awaiting_subacks.clear();
                self.subscribe_deadline_ns = None;
                self.probe_sent_ns = None;
                let delay_ms = self.reconnect.calculate_backoff_delay(self.attempt);
                self.retry_at_ns = Some(now_ns.saturating_add(millis_to_ns(delay_ms)));
                debug!(link = %self.name, attempt = self.attempt, delay_ms, "Scheduled reconnect");
            }
            LinkState::NotStarted | LinkState::Suspended => {}
        }
    }

    fn open_connection(&mut self, now_ns: i64, events: &mut Vec<CommEvent>) {
        self.generation += 1;
        let sink = LinkEventSink::new(self.name.clone(), self.generation, Arc::clone(&self.queue));
        if let Err(e) = self.transport.connect(sink) {
            self.transition(LinkEvent::ConnectFailed(e.to_string()), now_ns, events);
        }
    }

    fn request_subscriptions(&mut self, now_ns: i64, events: &mut Vec<CommEvent>) {
        if self.subscriptions.is_empty() {
            self.transition(LinkEvent::SubscriptionsAcked, now_ns, events);
            return;
        }
        self.awaiting_subacks = self
            .subscriptions
            .iter()
            .map(|s| s.topic.clone())
            .collect();
        self.subscribe_deadline_ns = Some(now_ns.saturating_add(self.subscribe_timeout_ns));
        if let Err(e) = self.transport.subscribe(&self.subscriptions) {
            self.transition(LinkEvent::SubscribeFailed(e.to_string()), now_ns, events);
        }
    }

    fn failure_for(&self, event: &LinkEvent) -> Option<LinkError> {
        let link = self.name.clone();
        match event {
            LinkEvent::ConnectFailed(reason) => Some(LinkError::ConnectFailed {
                link,
                reason: reason.clone(),
            }),
            LinkEvent::SubscribeFailed(reason) => Some(LinkError::SubscribeFailed {
                link,
                reason: reason.clone(),
            }),
            LinkEvent::ProbeTimeout => Some(LinkError::ProbeTimeout { link }),
            _ => None,
        }
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("generation", &self.generation)
            .field("policy", &self.policy)
            .field("outbox", &self.outbox.len())
            .finish_non_exhaustive()
    }
}
