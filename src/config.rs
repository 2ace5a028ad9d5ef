//! Configuration for a proactor node
//!
//! Loaded from TOML. Broker credentials are never stored in the file; a link
//! names the environment variables that hold them.

use crate::codec::format::is_left_right_dot;
use crate::proactor::link::{PublishPolicy, Qos, Subscription};
use crate::proactor::link_state::ReconnectConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProactorConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub ack: AckSection,
    #[serde(default)]
    pub liveness: LivenessSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub links: Vec<LinkSection>,
    /// Settings for the ATN actor shipped with the `atn` binary
    pub atn: Option<AtnSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// This node's alias; used as `Src` and as the prefix of published topics
    pub name: String,
    /// Capacity of the dispatch loop's inbound queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    1024
}

/// Application-level acknowledgement settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckSection {
    #[serde(default = "default_ack_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_ack_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Retries before a timed-out publish escalates
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

fn default_ack_scan_interval_ms() -> u64 {
    100
}

fn default_max_retries() -> u32 {
    1
}

impl Default for AckSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_ack_timeout_ms(),
            scan_interval_ms: default_ack_scan_interval_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl AckSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

/// Link liveness probing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LivenessSection {
    #[serde(default)]
    pub enabled: bool,
    /// Silence on an Active link before a probe is sent
    #[serde(default = "default_liveness_interval_ms")]
    pub interval_ms: u64,
    /// How long a probe may go unanswered before the link degrades
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Period of the link maintenance tick (backoff and liveness)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_liveness_interval_ms() -> u64 {
    60_000
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_tick_ms() -> u64 {
    100
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: default_liveness_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            tick_ms: default_tick_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_event_dir")]
    pub event_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_event_dir() -> PathBuf {
    PathBuf::from("data/event")
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            event_dir: default_event_dir(),
        }
    }
}

/// One broker link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    pub name: String,
    /// MQTT broker URL with protocol and port
    pub broker_url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Alias of the node on the other end; defaults to the link name
    pub peer: Option<String>,
    #[serde(default)]
    pub publish_policy: PublishPolicy,
    /// Bound on publishes held while the link is not Active
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// How long to wait for every SubAck before faulting the link
    #[serde(default = "default_subscribe_timeout_ms")]
    pub subscribe_timeout_ms: u64,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionSection>,
    #[serde(default)]
    pub backoff: BackoffSection,
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_subscribe_timeout_ms() -> u64 {
    10_000
}

impl LinkSection {
    /// A link to `broker_url` with default settings and no subscriptions
    pub fn new<N: Into<String>, U: Into<String>>(name: N, broker_url: U) -> Self {
        Self {
            name: name.into(),
            broker_url: broker_url.into(),
            username_env: None,
            password_env: None,
            keep_alive_secs: default_keep_alive_secs(),
            peer: None,
            publish_policy: PublishPolicy::default(),
            outbox_capacity: default_outbox_capacity(),
            subscribe_timeout_ms: default_subscribe_timeout_ms(),
            subscriptions: Vec::new(),
            backoff: BackoffSection::default(),
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .map(|s| Subscription::new(s.topic.clone(), s.qos))
            .collect()
    }

    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            backoff_pattern: self.backoff.pattern_ms.clone(),
            sustained_delay: self.backoff.sustained_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionSection {
    pub topic: String,
    #[serde(default)]
    pub qos: Qos,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_pattern")]
    pub pattern_ms: Vec<u64>,
    #[serde(default = "default_sustained_ms")]
    pub sustained_ms: u64,
}

fn default_backoff_pattern() -> Vec<u64> {
    vec![250, 500, 1000, 2500]
}

fn default_sustained_ms() -> u64 {
    5000
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            pattern_ms: default_backoff_pattern(),
            sustained_ms: default_sustained_ms(),
        }
    }
}

/// Settings for the ATN actor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AtnSection {
    /// Alias of the SCADA this ATN supervises
    pub scada_alias: String,
    /// This ATN's g-node instance id
    pub g_node_id: String,
    /// Link to the SCADA
    #[serde(default = "default_atn_link")]
    pub link: String,
    /// Relay node aliases whose state is tracked from snapshots
    #[serde(default)]
    pub relays: Vec<String>,
}

fn default_atn_link() -> String {
    "gridworks".to_string()
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid node name format: {0}")]
    InvalidNodeName(String),
    #[error("Invalid broker URL for link {link}: {url}")]
    InvalidBrokerUrl { link: String, url: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProactorConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ProactorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Minimal configuration for a node with no links
    pub fn for_node<S: Into<String>>(name: S) -> Self {
        Self {
            node: NodeSection {
                name: name.into(),
                queue_capacity: default_queue_capacity(),
            },
            ack: AckSection::default(),
            liveness: LivenessSection::default(),
            paths: PathsSection::default(),
            links: Vec::new(),
            atn: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_node_name(&self.node.name)?;

        if self.node.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "node.queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.ack.timeout_ms == 0 || self.ack.scan_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "ack.timeout_ms and ack.scan_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.liveness.tick_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "liveness.tick_ms must be greater than 0".to_string(),
            ));
        }
        if self.liveness.enabled
            && (self.liveness.interval_ms == 0 || self.liveness.probe_timeout_ms == 0)
        {
            return Err(ConfigError::InvalidConfig(
                "liveness.interval_ms and liveness.probe_timeout_ms must be greater than 0"
                    .to_string(),
            ));
        }

        let mut names = HashSet::new();
        for link in &self.links {
            if !names.insert(link.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate link name: {}",
                    link.name
                )));
            }
            if link.subscribe_timeout_ms == 0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "links.subscribe_timeout_ms of {} must be greater than 0",
                    link.name
                )));
            }
            validate_broker_url(link)?;
        }

        if let Some(atn) = &self.atn {
            if !names.contains(atn.link.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "atn.link '{}' does not name a configured link",
                    atn.link
                )));
            }
            validate_node_name(&atn.scada_alias)?;
        }
        Ok(())
    }

    pub fn link(&self, name: &str) -> Option<&LinkSection> {
        self.links.iter().find(|l| l.name == name)
    }
}

/// Node aliases are lowercase dot-separated words
fn validate_node_name(name: &str) -> Result<(), ConfigError> {
    if is_left_right_dot(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidNodeName(name.to_string()))
    }
}

fn validate_broker_url(link: &LinkSection) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidBrokerUrl {
        link: link.name.clone(),
        url: link.broker_url.clone(),
    };
    let url = Url::parse(&link.broker_url).map_err(|_| invalid())?;
    match url.scheme() {
        "mqtt" | "mqtts" if url.host_str().is_some() => Ok(()),
        _ => Err(invalid()),
    }
}

/// Read a credential from the environment variable named in the config
pub fn resolve_env(var_name: &str) -> Result<String, ConfigError> {
    std::env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))
}
