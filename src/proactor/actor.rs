//! The hook contract for derived actors
//!
//! An actor is plain business logic. It never owns a link or a thread; the
//! dispatch loop calls its hooks, one at a time, on the loop thread, and
//! hands it a [`ProactorContext`] for publishing and introspection.

use super::ack::AckTimeoutPolicy;
use super::dispatch::LoopState;
use super::frame::Inbound;
use super::link::Qos;
use super::link_state::{CommEvent, LinkState};
use super::message::Message;
use super::stats::StatsSnapshot;
use crate::codec::{CodecError, TypeRegistry, WirePayload};
use crate::error::ProactorResult;
use std::fmt::Debug;
use uuid::Uuid;

pub trait Actor: Send + 'static {
    /// Wire types this actor receives and publishes
    type Payload: WirePayload;
    /// Application commands submitted through a [`super::ProactorHandle`]
    type Command: Send + Debug + 'static;

    /// Handle a command submitted from outside the loop
    fn process_message(
        &mut self,
        message: Message<Self::Command>,
        ctx: &mut ProactorContext<'_, Self::Payload>,
    ) -> ProactorResult<()>;

    /// Handle a decoded message received on `link`. If the sender asked for
    /// an ack, it is sent only when this returns `Ok`.
    fn process_mqtt_message(
        &mut self,
        link: &str,
        message: Message<Self::Payload>,
        ctx: &mut ProactorContext<'_, Self::Payload>,
    ) -> ProactorResult<()>;

    /// Turn a link receipt into a typed message before it is routed to
    /// [`Actor::process_mqtt_message`]. Sees every receipt that is not an ack
    /// or ping, including ones the envelope layer could not split. An `Err`
    /// drops the receipt and counts a decode failure.
    fn decode_mqtt_message(
        &mut self,
        _link: &str,
        receipt: Receipt<'_>,
        registry: &TypeRegistry<Self::Payload>,
    ) -> Result<Message<Self::Payload>, CodecError> {
        registry_decode(receipt, registry)
    }

    fn on_comm_event(&mut self, _event: &CommEvent, _ctx: &mut ProactorContext<'_, Self::Payload>) {}
}

/// A raw receipt as handed to [`Actor::decode_mqtt_message`]
#[derive(Debug)]
pub struct Receipt<'a> {
    pub topic: &'a str,
    pub bytes: &'a [u8],
    /// Header and untyped payload, or why the bytes are not a valid envelope
    pub inbound: Result<Inbound, CodecError>,
}

/// Decode a receipt's payload through `registry`
pub fn registry_decode<P: WirePayload>(
    receipt: Receipt<'_>,
    registry: &TypeRegistry<P>,
) -> Result<Message<P>, CodecError> {
    let inbound = receipt.inbound?;
    let payload = registry.decode(&inbound.type_alias, &inbound.payload)?;
    Ok(Message::from_parts(inbound.header, payload))
}

/// How to publish one payload
pub struct PublishOptions {
    /// Header `Dst`; defaults to the link's peer
    pub dst: Option<String>,
    pub qos: Qos,
    /// Publish the bare payload on `{node}/{alias}` instead of a frame on `{node}/gw`
    pub bare: bool,
    pub ack_required: bool,
    /// Timeout policy for an acked publish; the configured default if `None`
    pub ack_policy: Option<Box<dyn AckTimeoutPolicy>>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            dst: None,
            qos: Qos::AtLeastOnce,
            bare: false,
            ack_required: false,
            ack_policy: None,
        }
    }
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to<S: Into<String>>(mut self, dst: S) -> Self {
        self.dst = Some(dst.into());
        self
    }

    pub fn qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn bare(mut self) -> Self {
        self.bare = true;
        self
    }

    pub fn with_ack(mut self) -> Self {
        self.ack_required = true;
        self
    }

    pub fn with_ack_policy<T: AckTimeoutPolicy>(mut self, policy: T) -> Self {
        self.ack_required = true;
        self.ack_policy = Some(Box::new(policy));
        self
    }
}

impl std::fmt::Debug for PublishOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishOptions")
            .field("dst", &self.dst)
            .field("qos", &self.qos)
            .field("bare", &self.bare)
            .field("ack_required", &self.ack_required)
            .field("custom_ack_policy", &self.ack_policy.is_some())
            .finish()
    }
}

/// What a hook may do while it runs on the loop thread
pub struct ProactorContext<'a, P: WirePayload> {
    state: &'a mut LoopState<P>,
    now_ns: i64,
}

impl<'a, P: WirePayload> ProactorContext<'a, P> {
    pub(crate) fn new(state: &'a mut LoopState<P>, now_ns: i64) -> Self {
        Self { state, now_ns }
    }

    /// Encode and publish on `link`. Returns the message id, which is what
    /// the peer's ack will name.
    pub fn publish(&mut self, link: &str, payload: P, options: PublishOptions) -> ProactorResult<Uuid> {
        self.state.publish(link, &payload, options, self.now_ns)
    }

    pub fn node_name(&self) -> &str {
        self.state.node_name()
    }

    pub fn link_state(&self, link: &str) -> Option<LinkState> {
        self.state.link_state(link)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.state.stats().snapshot()
    }

    pub fn registry(&self) -> &TypeRegistry<P> {
        self.state.registry()
    }

    pub fn pending_acks(&self) -> usize {
        self.state.pending_acks()
    }

    pub fn now_ns(&self) -> i64 {
        self.now_ns
    }

    /// Ask the loop to shut down after the current item
    pub fn stop(&mut self) {
        self.state.request_stop();
    }
}
