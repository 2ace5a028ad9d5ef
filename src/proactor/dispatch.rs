//! The dispatch loop
//!
//! One dedicated thread owns every [`Link`], the [`AckTracker`] and the
//! derived actor. Other threads only ever enqueue: commands through a
//! [`ProactorHandle`], link I/O through a [`crate::transport::LinkEventSink`].
//! Items are processed strictly one at a time in arrival order.

use super::ack::{AckTracker, PendingAck, RetryThenEscalate, TimeoutDecision};
use super::actor::{Actor, ProactorContext, PublishOptions, Receipt};
use super::frame::{decode_receipt, encode_bare, encode_frame, Inbound, TopicBuilder};
use super::link::{Link, Liveness, Outbound, PublishOutcome, Qos};
use super::link_state::{CommEvent, LinkState};
use super::message::{now_ns, Header, LoopPayload, Message};
use super::stats::{StatsAggregator, StatsSnapshot};
use crate::codec::{TypeRegistry, WirePayload, WireType};
use crate::config::ProactorConfig;
use crate::error::{ProactorResult, UsageError};
use crate::messages::{Ack, Ping};
use crate::transport::{EventQueue, LinkTransport, TransportEvent};
use crate::{actor_span, dispatch_span, link_span};
use bytes::Bytes;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound on rounds of comm-event delivery per processed item, in case
/// actor hooks keep provoking further transitions
const MAX_COMM_EVENT_ROUNDS: usize = 16;

/// Time transport tasks get to flush their disconnects before the runtime drops
const SHUTDOWN_LINGER: Duration = Duration::from_millis(50);

type LoopItem<C> = Message<LoopPayload<C>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("Inbound queue is full")]
    QueueFull,
    #[error("Proactor has stopped")]
    Stopped,
}

impl<T> From<TrySendError<T>> for SubmitError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => SubmitError::QueueFull,
            TrySendError::Closed(_) => SubmitError::Stopped,
        }
    }
}

/// The loop's inbound queue as seen by link transports
struct LoopQueue<C> {
    node_name: Arc<str>,
    tx: mpsc::Sender<LoopItem<C>>,
}

impl<C: Send + 'static> EventQueue for LoopQueue<C> {
    fn push(&self, link: &str, generation: u64, event: TransportEvent) -> Result<(), SubmitError> {
        let src = link.to_string();
        let link = link.to_string();
        let payload = match event {
            TransportEvent::Connected => LoopPayload::MqttConnected { link, generation },
            TransportEvent::ConnectFailed(reason) => LoopPayload::MqttConnectFailed {
                link,
                generation,
                reason,
            },
            TransportEvent::Disconnected(reason) => LoopPayload::MqttDisconnected {
                link,
                generation,
                reason,
            },
            TransportEvent::SubscribeResult { topic, success } => LoopPayload::MqttSubAck {
                link,
                generation,
                topic,
                success,
            },
            TransportEvent::Receipt { topic, payload } => LoopPayload::MqttReceipt {
                link,
                generation,
                topic,
                payload,
            },
        };
        let message = Message::new(src, self.node_name.as_ref(), payload.tag(), payload);
        self.tx.try_send(message).map_err(SubmitError::from)
    }
}

/// Cloneable, thread-safe handle to a proactor
pub struct ProactorHandle<C> {
    node_name: Arc<str>,
    tx: mpsc::Sender<LoopItem<C>>,
    control: mpsc::UnboundedSender<LoopItem<C>>,
    stats: Arc<StatsAggregator>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
    loop_thread: Arc<OnceLock<ThreadId>>,
}

impl<C> Clone for ProactorHandle<C> {
    fn clone(&self) -> Self {
        Self {
            node_name: Arc::clone(&self.node_name),
            tx: self.tx.clone(),
            control: self.control.clone(),
            stats: Arc::clone(&self.stats),
            thread: Arc::clone(&self.thread),
            loop_thread: Arc::clone(&self.loop_thread),
        }
    }
}

impl<C: Send + 'static> ProactorHandle<C> {
    /// Enqueue a command for the actor. Never blocks.
    pub fn submit(&self, message: Message<C>) -> Result<(), SubmitError> {
        self.tx
            .try_send(message.map(LoopPayload::App))
            .map_err(SubmitError::from)
    }

    /// Wrap `command` in a message from this node to itself and submit it
    pub fn send(&self, message_type: &str, command: C) -> Result<Uuid, SubmitError> {
        let message = Message::new(
            self.node_name.as_ref(),
            self.node_name.as_ref(),
            message_type,
            command,
        );
        let id = message.message_id();
        self.submit(message)?;
        Ok(id)
    }

    /// Stop the loop and wait for its thread to exit. Items queued before the
    /// call are still processed; later ones are refused. Idempotent. Called
    /// from the loop thread itself, it only requests the stop.
    pub fn stop(&self) {
        let shutdown = Message::new(
            self.node_name.as_ref(),
            self.node_name.as_ref(),
            "shutdown",
            LoopPayload::Shutdown,
        );
        let _ = self.control.send(shutdown);

        if self.loop_thread.get() == Some(&thread::current().id()) {
            return;
        }
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(node = %self.node_name, "Dispatch loop thread panicked");
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// True once the loop has shut down and stopped accepting items
    pub fn is_stopped(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Everything `start` moves onto the loop thread
struct Pending<A: Actor> {
    actor: A,
    registry: TypeRegistry<A::Payload>,
    links: Vec<Link>,
    rx: mpsc::Receiver<LoopItem<A::Command>>,
    control_rx: mpsc::UnboundedReceiver<LoopItem<A::Command>>,
}

pub struct Proactor<A: Actor> {
    config: ProactorConfig,
    handle: ProactorHandle<A::Command>,
    queue: Arc<dyn EventQueue>,
    pending: Option<Pending<A>>,
}

impl<A: Actor> Proactor<A> {
    pub fn new(config: ProactorConfig, registry: TypeRegistry<A::Payload>, actor: A) -> Self {
        let node_name: Arc<str> = Arc::from(config.node.name.as_str());
        let (tx, rx) = mpsc::channel(config.node.queue_capacity.max(1));
        let (control, control_rx) = mpsc::unbounded_channel();
        let queue: Arc<dyn EventQueue> = Arc::new(LoopQueue {
            node_name: Arc::clone(&node_name),
            tx: tx.clone(),
        });

        Self {
            handle: ProactorHandle {
                node_name,
                tx,
                control,
                stats: Arc::new(StatsAggregator::new()),
                thread: Arc::new(Mutex::new(None)),
                loop_thread: Arc::new(OnceLock::new()),
            },
            config,
            queue,
            pending: Some(Pending {
                actor,
                registry,
                links: Vec::new(),
                rx,
                control_rx,
            }),
        }
    }

    /// Attach a transport to the link of that name in the configuration
    pub fn add_link<T: LinkTransport>(&mut self, name: &str, transport: T) -> ProactorResult<()> {
        let pending = self.pending.as_mut().ok_or(UsageError::LinksFrozen)?;
        let section = self
            .config
            .link(name)
            .ok_or_else(|| UsageError::UnknownLink(name.to_string()))?;
        if pending.links.iter().any(|link| link.name() == name) {
            return Err(UsageError::DuplicateLink(name.to_string()).into());
        }
        pending
            .links
            .push(Link::new(section, Box::new(transport), Arc::clone(&self.queue)));
        self.handle.stats.add_link(name);
        Ok(())
    }

    pub fn handle(&self) -> ProactorHandle<A::Command> {
        self.handle.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.handle.stats()
    }

    pub fn is_started(&self) -> bool {
        self.pending.is_none()
    }

    /// Spawn the loop thread. A second call is a usage error.
    pub fn start(&mut self) -> ProactorResult<()> {
        if self.pending.is_none() {
            error!(node = %self.handle.node_name, "start() called twice");
            return Err(UsageError::AlreadyStarted.into());
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let Some(pending) = self.pending.take() else {
            return Err(UsageError::AlreadyStarted.into());
        };

        let core = DispatchCore {
            actor: pending.actor,
            state: LoopState::new(&self.config, pending.registry, pending.links, Arc::clone(&self.handle.stats)),
            rx: pending.rx,
            control_rx: pending.control_rx,
            scan_interval: self.config.ack.scan_interval(),
            tick_interval: Duration::from_millis(self.config.liveness.tick_ms.max(1)),
        };

        let loop_thread = Arc::clone(&self.handle.loop_thread);
        let join = thread::Builder::new()
            .name(format!("proactor-{}", self.handle.node_name))
            .spawn(move || {
                let _ = loop_thread.set(thread::current().id());
                runtime.block_on(core.run());
            })?;
        *self
            .handle
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(join);

        info!(node = %self.handle.node_name, "Proactor started");
        Ok(())
    }

    /// Same as [`ProactorHandle::stop`]
    pub fn stop(&self) {
        self.handle.stop();
    }
}

/// Loop-owned state reachable from actor hooks through [`ProactorContext`]
pub(crate) struct LoopState<P: WirePayload> {
    node_name: String,
    topics: TopicBuilder,
    links: Vec<Link>,
    acks: AckTracker,
    registry: TypeRegistry<P>,
    stats: Arc<StatsAggregator>,
    ack_timeout_ns: i64,
    max_retries: u32,
    liveness: Option<Liveness>,
    stop_requested: bool,
    undelivered: Vec<CommEvent>,
}

impl<P: WirePayload> LoopState<P> {
    fn new(
        config: &ProactorConfig,
        registry: TypeRegistry<P>,
        links: Vec<Link>,
        stats: Arc<StatsAggregator>,
    ) -> Self {
        Self {
            node_name: config.node.name.clone(),
            topics: TopicBuilder::new(config.node.name.clone()),
            links,
            acks: AckTracker::new(),
            registry,
            stats,
            ack_timeout_ns: i64::try_from(config.ack.timeout().as_nanos()).unwrap_or(i64::MAX),
            max_retries: config.ack.max_retries,
            liveness: Liveness::from_config(&config.liveness),
            stop_requested: false,
            undelivered: Vec::new(),
        }
    }

    pub(crate) fn node_name(&self) -> &str {
        &self.node_name
    }

    pub(crate) fn registry(&self) -> &TypeRegistry<P> {
        &self.registry
    }

    pub(crate) fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub(crate) fn pending_acks(&self) -> usize {
        self.acks.len()
    }

    pub(crate) fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub(crate) fn link_state(&self, name: &str) -> Option<LinkState> {
        self.links.iter().find(|l| l.name() == name).map(Link::state)
    }

    fn link_index(&self, name: &str) -> Option<usize> {
        self.links.iter().position(|l| l.name() == name)
    }

    /// Encode `payload` and publish it on `link` under the link's policy
    pub(crate) fn publish(
        &mut self,
        link: &str,
        payload: &P,
        options: PublishOptions,
        now_ns: i64,
    ) -> ProactorResult<Uuid> {
        let index = self
            .link_index(link)
            .ok_or_else(|| UsageError::UnknownLink(link.to_string()))?;
        if options.bare && options.ack_required {
            return Err(UsageError::AckRequiresFrame.into());
        }
        let wire = self.registry.encode(payload)?;
        let type_alias = payload.type_alias();
        let dst = options
            .dst
            .unwrap_or_else(|| self.links[index].peer().to_string());
        let header = Header::new(self.node_name.clone(), dst, type_alias)
            .with_ack_required(options.ack_required);

        let (topic, bytes) = if options.bare {
            (self.topics.typed(type_alias), encode_bare(wire)?)
        } else {
            (self.topics.frame(), encode_frame(&header, wire)?)
        };
        let ack = options.ack_required.then(|| {
            options.ack_policy.unwrap_or_else(|| {
                Box::new(RetryThenEscalate {
                    max_retries: self.max_retries,
                })
            })
        });
        let outbound = Outbound {
            message_id: header.message_id,
            message_type: type_alias.to_string(),
            topic,
            payload: bytes,
            qos: options.qos,
            retry_count: 0,
            ack,
        };

        match self.links[index].publish(outbound)? {
            PublishOutcome::Sent(outbound) => self.after_send(index, outbound, now_ns),
            PublishOutcome::Queued => {}
        }
        Ok(header.message_id)
    }

    /// Bookkeeping once an outbound reached the transport
    fn after_send(&mut self, index: usize, outbound: Outbound, now_ns: i64) {
        let link = self.links[index].name().to_string();
        self.stats.message_published(&link);
        if let Some(policy) = outbound.ack {
            self.acks.track(PendingAck {
                message_id: outbound.message_id,
                link,
                message_type: outbound.message_type,
                topic: outbound.topic,
                payload: outbound.payload,
                qos: outbound.qos,
                deadline_ns: now_ns.saturating_add(self.ack_timeout_ns),
                retry_count: outbound.retry_count,
                policy,
            });
        }
    }

    /// Publish a built-in frame (ack, ping) outside the publish policy
    fn send_builtin<T: WireType>(&mut self, index: usize, dst: &str, value: &T) {
        let link = self.links[index].name().to_string();
        let topic = self.topics.frame();
        let header = Header::new(self.node_name.clone(), dst, T::TYPE_ALIAS);
        let bytes = match value.encode().and_then(|wire| encode_frame(&header, wire)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(link = %link, message_type = T::TYPE_ALIAS, error = %e, "Failed to encode built-in message");
                return;
            }
        };
        match self.links[index].send_control(&topic, bytes, Qos::AtLeastOnce) {
            Ok(()) => self.stats.message_published(&link),
            Err(e) => warn!(link = %link, message_type = T::TYPE_ALIAS, error = %e, "Failed to send built-in message"),
        }
    }

    fn send_ack(&mut self, index: usize, dst: &str, message_id: Uuid) {
        let ack = Ack {
            ack_message_id: message_id.to_string(),
        };
        self.send_builtin(index, dst, &ack);
    }

    /// Log, count and flush on Active; queue for the actor's hook
    fn record(&mut self, events: Vec<CommEvent>, now_ns: i64) {
        for event in events {
            info!(
                link = %event.link,
                from = %event.from,
                to = %event.to,
                cause = %event.cause,
                "Link state changed"
            );
            self.stats.comm_event(&event);
            if event.to == LinkState::Active {
                if let Some(index) = self.link_index(&event.link) {
                    let flushed = self.links[index].flush_outbox();
                    for outbound in flushed {
                        self.after_send(index, outbound, now_ns);
                    }
                }
            }
            self.undelivered.push(event);
        }
    }

    fn start_links(&mut self, now_ns: i64) {
        for index in 0..self.links.len() {
            let events = self.links[index].start(now_ns);
            self.record(events, now_ns);
        }
    }

    /// Reconnect backoff and liveness for every link
    fn maintain_links(&mut self, now_ns: i64) {
        for index in 0..self.links.len() {
            let tick = self.links[index].tick(now_ns, self.liveness);
            self.record(tick.events, now_ns);
            if tick.send_probe {
                let peer = self.links[index].peer().to_string();
                debug!(link = %self.links[index].name(), "Sending liveness probe");
                self.send_builtin(index, &peer, &Ping {});
            }
        }
    }

    /// Run the timeout policy of every expired pending ack
    fn scan_acks(&mut self, now_ns: i64) {
        for mut entry in self.acks.take_expired(now_ns) {
            let (timeout, decision) = entry.decide();
            warn!(
                link = %timeout.link,
                message_id = %timeout.message_id,
                message_type = %timeout.message_type,
                retry_count = timeout.retry_count,
                decision = ?decision,
                "Ack timed out"
            );
            self.stats.ack_timed_out(&entry.link);
            let Some(index) = self.link_index(&entry.link) else {
                continue;
            };

            let mut escalate = decision == TimeoutDecision::Escalate;
            match decision {
                TimeoutDecision::Retry => {
                    let outbound = Outbound {
                        message_id: entry.message_id,
                        message_type: entry.message_type,
                        topic: entry.topic,
                        payload: entry.payload,
                        qos: entry.qos,
                        retry_count: entry.retry_count.saturating_add(1),
                        ack: Some(entry.policy),
                    };
                    match self.links[index].publish(outbound) {
                        Ok(PublishOutcome::Sent(outbound)) => self.after_send(index, outbound, now_ns),
                        Ok(PublishOutcome::Queued) => {}
                        Err(e) => {
                            warn!(error = %e, message_id = %entry.message_id, "Retry not published; escalating");
                            escalate = true;
                        }
                    }
                }
                TimeoutDecision::Escalate => {}
                TimeoutDecision::Abandon => {
                    debug!(message_id = %entry.message_id, "Pending ack abandoned");
                }
            }
            if escalate {
                let events = self.links[index].force_fault("ack timeout", now_ns);
                self.record(events, now_ns);
            }
        }
    }

    /// Close links and drop pending acks without running any policy
    fn shutdown(&mut self) {
        for link in &mut self.links {
            let dropped = link.close();
            if dropped > 0 {
                info!(link = %link.name(), dropped, "Dropped queued publishes on shutdown");
            }
        }
        let discarded = self.acks.discard_all();
        if discarded > 0 {
            info!(discarded, "Discarded pending acks on shutdown");
        }
    }
}

struct DispatchCore<A: Actor> {
    actor: A,
    state: LoopState<A::Payload>,
    rx: mpsc::Receiver<LoopItem<A::Command>>,
    control_rx: mpsc::UnboundedReceiver<LoopItem<A::Command>>,
    scan_interval: Duration,
    tick_interval: Duration,
}

impl<A: Actor> DispatchCore<A> {
    async fn run(mut self) {
        self.state.start_links(now_ns());
        self.deliver_comm_events(now_ns());

        let mut ack_scan = tokio::time::interval(self.scan_interval);
        ack_scan.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut link_tick = tokio::time::interval(self.tick_interval);
        link_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.state.stop_requested {
            tokio::select! {
                biased;
                control = self.control_rx.recv() => match control {
                    Some(item) => {
                        self.process_queued();
                        self.process(item);
                    }
                    None => break,
                },
                item = self.rx.recv() => match item {
                    Some(item) => self.process(item),
                    None => break,
                },
                _ = ack_scan.tick() => {
                    let now = now_ns();
                    self.state.scan_acks(now);
                    self.deliver_comm_events(now);
                }
                _ = link_tick.tick() => {
                    let now = now_ns();
                    self.state.maintain_links(now);
                    self.deliver_comm_events(now);
                }
            }
        }

        self.finish().await;
    }

    async fn finish(&mut self) {
        self.rx.close();
        self.control_rx.close();
        self.state.shutdown();
        tokio::time::sleep(SHUTDOWN_LINGER).await;
        let mut drained = 0usize;
        while self.rx.try_recv().is_ok() {
            drained += 1;
        }
        info!(node = %self.state.node_name, drained, "Proactor stopped");
    }

    /// Run the items already queued when a stop request arrives, so a stop
    /// never overtakes work submitted before it
    fn process_queued(&mut self) {
        let queued = self.rx.len();
        for _ in 0..queued {
            if self.state.stop_requested {
                return;
            }
            match self.rx.try_recv() {
                Ok(item) => self.process(item),
                Err(_) => return,
            }
        }
    }

    fn process(&mut self, item: LoopItem<A::Command>) {
        let span = dispatch_span!(
            message_type = %item.header.message_type,
            message_id = %item.header.message_id
        );
        let _guard = span.enter();
        let now = now_ns();
        let Message { header, payload } = item;

        match payload {
            LoopPayload::Shutdown => self.state.request_stop(),
            LoopPayload::App(command) => {
                let message_type = header.message_type.clone();
                let result = {
                    let _actor = actor_span!(hook = "process_message").entered();
                    let mut ctx = ProactorContext::new(&mut self.state, now);
                    self.actor
                        .process_message(Message::from_parts(header, command), &mut ctx)
                };
                match result {
                    Err(e) if e.is_usage() => {
                        error!(message_type = %message_type, error = %e, "Usage error while processing command")
                    }
                    Err(e) => warn!(message_type = %message_type, error = %e, "Actor failed to process command"),
                    Ok(()) => {}
                }
                self.state.stats.message_processed(&message_type);
            }
            LoopPayload::MqttConnected { link, generation } => {
                self.on_link(&link, generation, now, |l, now| l.on_connected(now));
            }
            LoopPayload::MqttConnectFailed {
                link,
                generation,
                reason,
            } => {
                self.on_link(&link, generation, now, |l, now| l.on_connect_failed(reason, now));
            }
            LoopPayload::MqttDisconnected {
                link,
                generation,
                reason,
            } => {
                self.on_link(&link, generation, now, |l, now| l.on_disconnected(reason, now));
            }
            LoopPayload::MqttSubAck {
                link,
                generation,
                topic,
                success,
            } => {
                self.on_link(&link, generation, now, |l, now| l.on_suback(&topic, success, now));
            }
            LoopPayload::MqttReceipt {
                link,
                generation,
                topic,
                payload,
            } => self.on_receipt(&link, generation, &topic, payload, now),
        }

        self.deliver_comm_events(now);
    }

    /// Apply a link event if it belongs to the current connection
    fn on_link<F>(&mut self, link: &str, generation: u64, now: i64, apply: F)
    where
        F: FnOnce(&mut Link, i64) -> Vec<CommEvent>,
    {
        let Some(index) = self.state.link_index(link) else {
            warn!(link = %link, "Event for unknown link");
            return;
        };
        if !self.state.links[index].is_current(generation) {
            debug!(link = %link, generation, "Ignoring event from stale connection");
            return;
        }
        let events = apply(&mut self.state.links[index], now);
        self.state.record(events, now);
    }

    fn on_receipt(&mut self, link: &str, generation: u64, topic: &str, payload: Bytes, now: i64) {
        let span = link_span!(link = %link, topic = %topic);
        let _guard = span.enter();

        let Some(index) = self.state.link_index(link) else {
            warn!("Receipt for unknown link");
            return;
        };
        if !self.state.links[index].is_current(generation) {
            debug!(generation, "Ignoring receipt from stale connection");
            return;
        }
        let events = self.state.links[index].on_receipt(now);
        self.state.record(events, now);

        match decode_receipt(topic, &payload, &self.state.node_name) {
            Ok(inbound) if inbound.type_alias == Ack::TYPE_ALIAS => self.on_ack(link, &inbound),
            Ok(inbound) if inbound.type_alias == Ping::TYPE_ALIAS => {
                self.state.stats.message_received(link, Ping::TYPE_ALIAS);
                self.state
                    .send_ack(index, &inbound.header.src, inbound.header.message_id);
            }
            inbound => {
                let receipt = Receipt {
                    topic,
                    bytes: &payload,
                    inbound,
                };
                self.on_app_receipt(index, link, receipt, now);
            }
        }
    }

    fn on_ack(&mut self, link: &str, inbound: &Inbound) {
        let ack = match Ack::decode(&inbound.payload) {
            Ok(ack) => ack,
            Err(e) => {
                warn!(error = %e, "Dropping malformed ack");
                self.state.stats.decode_failed(link);
                return;
            }
        };
        self.state.stats.message_received(link, Ack::TYPE_ALIAS);
        let matched = Uuid::parse_str(&ack.ack_message_id)
            .map(|id| self.state.acks.acknowledge(&id))
            .unwrap_or(false);
        if !matched {
            debug!(ack_message_id = %ack.ack_message_id, "Ack for no pending message");
        }
    }

    fn on_app_receipt(&mut self, index: usize, link: &str, receipt: Receipt<'_>, now: i64) {
        let decoded = {
            let _actor = actor_span!(hook = "decode_mqtt_message").entered();
            self.actor
                .decode_mqtt_message(link, receipt, &self.state.registry)
        };
        let Message { header, payload } = match decoded {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping receipt that failed to decode");
                self.state.stats.decode_failed(link);
                return;
            }
        };
        let type_alias = payload.type_alias().to_string();
        self.state.stats.message_received(link, &type_alias);

        let src = header.src.clone();
        let message_id = header.message_id;
        let ack_required = header.ack_required;
        let result = {
            let _actor = actor_span!(hook = "process_mqtt_message", type_alias = %type_alias).entered();
            let mut ctx = ProactorContext::new(&mut self.state, now);
            self.actor
                .process_mqtt_message(link, Message::from_parts(header, payload), &mut ctx)
        };
        self.state.stats.message_processed(&type_alias);

        match result {
            Ok(()) if ack_required => self.state.send_ack(index, &src, message_id),
            Ok(()) => {}
            Err(e) if e.is_usage() => {
                error!(type_alias = %type_alias, error = %e, "Usage error while processing message")
            }
            Err(e) => warn!(type_alias = %type_alias, error = %e, "Actor failed to process message"),
        }
    }

    fn deliver_comm_events(&mut self, now: i64) {
        for _ in 0..MAX_COMM_EVENT_ROUNDS {
            let events = std::mem::take(&mut self.state.undelivered);
            if events.is_empty() {
                return;
            }
            for event in &events {
                let _actor = actor_span!(hook = "on_comm_event", link = %event.link).entered();
                let mut ctx = ProactorContext::new(&mut self.state, now);
                self.actor.on_comm_event(event, &mut ctx);
            }
        }
        if !self.state.undelivered.is_empty() {
            warn!(
                pending = self.state.undelivered.len(),
                "Comm events still pending after delivery rounds; deferring"
            );
        }
    }
}
