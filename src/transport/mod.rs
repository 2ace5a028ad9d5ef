//! Transport layer for broker links
//!
//! [`LinkTransport`] is the only seam between the dispatch loop and network
//! I/O. Every method is non-blocking; whatever the implementation does on its
//! own threads or tasks is reported back exclusively through the
//! [`LinkEventSink`] handed to [`LinkTransport::connect`].

use crate::proactor::link::{Qos, Subscription};
use crate::proactor::SubmitError;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Transport configuration error: {0}")]
    InvalidConfig(String),
    #[error("Transport client error: {0}")]
    Client(String),
}

/// What a transport can report about its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    ConnectFailed(String),
    Disconnected(String),
    SubscribeResult { topic: String, success: bool },
    Receipt { topic: String, payload: Bytes },
}

/// Broker I/O for one link. Owned and driven by the dispatch loop thread.
pub trait LinkTransport: Send + 'static {
    /// Begin connecting. Completion is reported through `sink`.
    fn connect(&mut self, sink: LinkEventSink) -> Result<(), TransportError>;

    /// Request subscriptions; one [`TransportEvent::SubscribeResult`] per topic
    fn subscribe(&mut self, subscriptions: &[Subscription]) -> Result<(), TransportError>;

    fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), TransportError>;

    /// Tear down the current connection, if any. Later events from it are stale.
    fn disconnect(&mut self);
}

/// Where sinks put events. Implemented by the dispatch loop's inbound queue.
pub trait EventQueue: Send + Sync {
    fn push(&self, link: &str, generation: u64, event: TransportEvent) -> Result<(), SubmitError>;
}

/// Handle a transport uses to report events for one connection attempt.
///
/// Tagged with the link's connection generation; the loop ignores events
/// whose generation is no longer current.
#[derive(Clone)]
pub struct LinkEventSink {
    link: String,
    generation: u64,
    queue: Arc<dyn EventQueue>,
}

impl LinkEventSink {
    pub fn new<S: Into<String>>(link: S, generation: u64, queue: Arc<dyn EventQueue>) -> Self {
        Self {
            link: link.into(),
            generation,
            queue,
        }
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Enqueue without blocking
    pub fn deliver(&self, event: TransportEvent) -> Result<(), SubmitError> {
        self.queue.push(&self.link, self.generation, event)
    }

    /// Enqueue, waiting for room while the queue is full
    pub async fn deliver_when_ready(&self, event: TransportEvent) -> Result<(), SubmitError> {
        loop {
            match self.queue.push(&self.link, self.generation, event.clone()) {
                Err(SubmitError::QueueFull) => tokio::time::sleep(Duration::from_millis(5)).await,
                other => return other,
            }
        }
    }
}

impl std::fmt::Debug for LinkEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkEventSink")
            .field("link", &self.link)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
