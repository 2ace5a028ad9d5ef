//! Mock implementations for testing
//!
//! [`MockTransport`] stands in for a broker link: it records what the link
//! asked of it and lets a test play the broker's side through the sink it
//! was last connected with. Clones share state, so a test keeps one clone
//! while the link owns another.

use crate::proactor::link::{Qos, Subscription};
use crate::proactor::SubmitError;
use crate::transport::{EventQueue, LinkEventSink, LinkTransport, TransportError, TransportEvent};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One publish handed to a [`MockTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: Qos,
}

impl PublishedMessage {
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Default)]
struct MockState {
    sink: Option<LinkEventSink>,
    connect_count: usize,
    disconnect_count: usize,
    subscriptions: Vec<Subscription>,
    published: Vec<PublishedMessage>,
    reject_publishes: bool,
}

/// Mock link transport
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    fail_connect: bool,
    fail_publish: bool,
    auto_connect: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `connect` call returns an error
    pub fn with_failure() -> Self {
        Self {
            fail_connect: true,
            ..Default::default()
        }
    }

    /// Every `publish` call returns an error
    pub fn with_publish_failure() -> Self {
        Self {
            fail_publish: true,
            ..Default::default()
        }
    }

    /// Acknowledge connects and subscriptions as soon as they are requested
    pub fn auto_connecting() -> Self {
        Self {
            auto_connect: true,
            ..Default::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> Option<LinkEventSink> {
        self.lock().sink.clone()
    }

    /// Report an event on the current connection. Returns false if never connected.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.sink() {
            Some(sink) => sink.deliver(event).is_ok(),
            None => false,
        }
    }

    pub fn connected(&self) -> bool {
        self.emit(TransportEvent::Connected)
    }

    pub fn connect_failed(&self, reason: &str) -> bool {
        self.emit(TransportEvent::ConnectFailed(reason.to_string()))
    }

    pub fn disconnected(&self, reason: &str) -> bool {
        self.emit(TransportEvent::Disconnected(reason.to_string()))
    }

    pub fn suback(&self, topic: &str, success: bool) -> bool {
        self.emit(TransportEvent::SubscribeResult {
            topic: topic.to_string(),
            success,
        })
    }

    /// Play an inbound publish from the broker
    pub fn receive(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        self.emit(TransportEvent::Receipt {
            topic: topic.to_string(),
            payload: payload.into(),
        })
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnect_count
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear_published(&self) {
        self.lock().published.clear();
    }

    /// Make every clone's publishes fail (or succeed again) from now on
    pub fn set_publish_failure(&self, fail: bool) {
        self.lock().reject_publishes = fail;
    }
}

impl LinkTransport for MockTransport {
    fn connect(&mut self, sink: LinkEventSink) -> Result<(), TransportError> {
        {
            let mut state = self.lock();
            state.connect_count += 1;
            if self.fail_connect {
                state.sink = None;
                return Err(TransportError::Client("mock connect failure".to_string()));
            }
            state.sink = Some(sink.clone());
        }
        if self.auto_connect {
            let _ = sink.deliver(TransportEvent::Connected);
        }
        Ok(())
    }

    fn subscribe(&mut self, subscriptions: &[Subscription]) -> Result<(), TransportError> {
        let sink = {
            let mut state = self.lock();
            state.subscriptions.extend_from_slice(subscriptions);
            state.sink.clone()
        };
        if self.auto_connect {
            if let Some(sink) = sink {
                for subscription in subscriptions {
                    let _ = sink.deliver(TransportEvent::SubscribeResult {
                        topic: subscription.topic.clone(),
                        success: true,
                    });
                }
            }
        }
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), TransportError> {
        let mut state = self.lock();
        if self.fail_publish || state.reject_publishes {
            return Err(TransportError::Client("mock publish failure".to_string()));
        }
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.lock();
        state.disconnect_count += 1;
        state.sink = None;
    }
}

/// Event queue that records everything pushed to it
#[derive(Debug, Default)]
pub struct RecordingQueue {
    events: Mutex<Vec<(String, u64, TransportEvent)>>,
}

impl RecordingQueue {
    pub fn events(&self) -> Vec<(String, u64, TransportEvent)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventQueue for RecordingQueue {
    fn push(&self, link: &str, generation: u64, event: TransportEvent) -> Result<(), SubmitError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((link.to_string(), generation, event));
        Ok(())
    }
}
