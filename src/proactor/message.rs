//! Message envelope shared by every item that passes through the loop

use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

/// Wall-clock time in nanoseconds since the epoch
pub fn now_ns() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub message_id: Uuid,
    pub src: String,
    pub dst: String,
    pub message_type: String,
    pub created_at_ns: i64,
    pub ack_required: bool,
}

impl Header {
    /// Fresh header with a new id and the current time
    pub fn new<S, D, T>(src: S, dst: D, message_type: T) -> Self
    where
        S: Into<String>,
        D: Into<String>,
        T: Into<String>,
    {
        Self {
            message_id: Uuid::new_v4(),
            src: src.into(),
            dst: dst.into(),
            message_type: message_type.into(),
            created_at_ns: now_ns(),
            ack_required: false,
        }
    }

    pub fn with_ack_required(mut self, ack_required: bool) -> Self {
        self.ack_required = ack_required;
        self
    }
}

/// Header plus payload. Immutable after creation; moved, never shared.
#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    pub header: Header,
    pub payload: T,
}

impl<T> Message<T> {
    pub fn new<S, D, M>(src: S, dst: D, message_type: M, payload: T) -> Self
    where
        S: Into<String>,
        D: Into<String>,
        M: Into<String>,
    {
        Self {
            header: Header::new(src, dst, message_type),
            payload,
        }
    }

    pub fn from_parts(header: Header, payload: T) -> Self {
        Self { header, payload }
    }

    pub fn message_id(&self) -> Uuid {
        self.header.message_id
    }

    pub fn message_type(&self) -> &str {
        &self.header.message_type
    }

    /// Re-wrap the payload, keeping the header (and so the id) intact
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Message<U> {
        Message {
            header: self.header,
            payload: f(self.payload),
        }
    }
}

/// Everything the dispatch loop can dequeue.
///
/// The `Mqtt*` variants are produced by link I/O through a
/// [`crate::transport::LinkEventSink`] and carry the connection generation
/// they belong to. `App` carries the derived actor's own commands.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopPayload<C> {
    MqttReceipt {
        link: String,
        generation: u64,
        topic: String,
        payload: Bytes,
    },
    MqttConnected {
        link: String,
        generation: u64,
    },
    MqttConnectFailed {
        link: String,
        generation: u64,
        reason: String,
    },
    MqttDisconnected {
        link: String,
        generation: u64,
        reason: String,
    },
    MqttSubAck {
        link: String,
        generation: u64,
        topic: String,
        success: bool,
    },
    Shutdown,
    App(C),
}

impl<C> LoopPayload<C> {
    /// Tag used as the message type of built-in loop items
    pub fn tag(&self) -> &'static str {
        match self {
            LoopPayload::MqttReceipt { .. } => "mqtt.receipt",
            LoopPayload::MqttConnected { .. } => "mqtt.connected",
            LoopPayload::MqttConnectFailed { .. } => "mqtt.connect.failed",
            LoopPayload::MqttDisconnected { .. } => "mqtt.disconnected",
            LoopPayload::MqttSubAck { .. } => "mqtt.suback",
            LoopPayload::Shutdown => "shutdown",
            LoopPayload::App(_) => "app",
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, LoopPayload::App(_))
    }
}
