//! Spaceheat Proactor
//!
//! A reliable actor messaging runtime for a distributed home-heating control
//! system. Nodes exchange typed messages over MQTT brokers; this crate
//! provides the pieces every node shares.
//!
//! # Overview
//!
//! - [`codec`]: schema-driven type registry turning wire JSON into typed values
//! - [`messages`]: the heating domain's wire types
//! - [`proactor`]: links, acks, stats and the single-threaded dispatch loop
//! - [`transport`]: the broker seam and its rumqttc implementation
//! - [`actors`]: derived actors, currently the ATN
//!
//! # Quick Start
//!
//! ```rust
//! use spaceheat_proactor::codec::WireType;
//! use spaceheat_proactor::messages::GsPwr;
//! use serde_json::json;
//!
//! let pwr = GsPwr::decode(&json!({"TypeAlias": "gs.pwr.100", "Power": 4100})).unwrap();
//! assert_eq!(pwr.power, 4100);
//! assert_eq!(pwr.encode().unwrap()["TypeAlias"], "gs.pwr.100");
//! ```

pub mod actors;
pub mod codec;
pub mod config;
pub mod error;
pub mod messages;
pub mod observability;
pub mod proactor;
pub mod testing;
pub mod transport;

pub use config::ProactorConfig;
pub use error::{ProactorError, ProactorResult, UsageError};
pub use proactor::{Actor, Proactor, ProactorContext, ProactorHandle, PublishOptions};
pub use transport::mqtt::MqttTransport;
