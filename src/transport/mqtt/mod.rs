//! MQTT link transport over rumqttc
//!
//! Split the same way as the rest of the transport layer: pure pieces are
//! unit tested without a broker, I/O lives in [`client`].
//!
//! - [`connection`] - broker URL parsing and `MqttOptions` construction
//! - [`message_handler`] - routing of rumqttc events
//! - [`client`] - the [`MqttTransport`] tasks
//!
//! # Usage
//!
//! ```rust,no_run
//! use spaceheat_proactor::config::LinkSection;
//! use spaceheat_proactor::testing::RecordingQueue;
//! use spaceheat_proactor::transport::mqtt::MqttTransport;
//! use spaceheat_proactor::transport::{LinkEventSink, LinkTransport};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let link = LinkSection::new("gridworks", "mqtt://localhost:1883");
//! let mut transport = MqttTransport::new("hw1.isone.me.versant.keene.beech", link);
//! let queue = Arc::new(RecordingQueue::default());
//! transport.connect(LinkEventSink::new("gridworks", 1, queue.clone()))?;
//! // Connected, Receipt and SubscribeResult events now arrive on the queue
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttTransport;
pub use connection::{configure_mqtt_options, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
