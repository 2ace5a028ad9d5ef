//! The proactor core: envelope, links, acks, stats and the dispatch loop
//!
//! # Usage
//!
//! ```rust,no_run
//! use spaceheat_proactor::actors::atn::{Atn, AtnPayload, AtnSettings};
//! use spaceheat_proactor::config::ProactorConfig;
//! use spaceheat_proactor::proactor::Proactor;
//! use spaceheat_proactor::transport::mqtt::MqttTransport;
//! use std::path::Path;
//!
//! let mut config = ProactorConfig::load_from_file(Path::new("atn.toml"))?;
//! let settings = AtnSettings::from_config(&config)?;
//! settings.configure_link(&mut config);
//! let link = config.link(&settings.link).cloned().ok_or("no link")?;
//!
//! let mut proactor = Proactor::new(config.clone(), AtnPayload::registry()?, Atn::new(settings));
//! proactor.add_link(&link.name, MqttTransport::new(&config.node.name, link.clone()))?;
//! proactor.start()?;
//! proactor.stop();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ack;
pub mod actor;
pub mod dispatch;
pub mod frame;
pub mod link;
pub mod link_state;
pub mod message;
pub mod stats;

pub use ack::{
    AckTimeoutError, AckTimeoutPolicy, AckTracker, OnTimeout, PendingAck, RetryThenEscalate,
    TimeoutDecision,
};
pub use actor::{registry_decode, Actor, ProactorContext, PublishOptions, Receipt};
pub use dispatch::{Proactor, ProactorHandle, SubmitError};
pub use frame::{Topic, TopicBuilder};
pub use link::{Link, LinkError, PublishPolicy, Qos, Subscription};
pub use link_state::{CommEvent, LinkEvent, LinkState, LinkStateMachine, ReconnectConfig};
pub use message::{now_ns, Header, LoopPayload, Message};
pub use stats::{LinkStats, StatsAggregator, StatsSnapshot};
