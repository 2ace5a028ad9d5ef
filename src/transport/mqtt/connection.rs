//! Pure MQTT option construction for a configured link

use crate::config::LinkSection;
use crate::proactor::Qos;
use crate::transport::TransportError;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

/// Largest packet accepted from the broker; snapshots can be sizeable
const MAX_PACKET_SIZE: u32 = 256 * 1024;

#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("No tokio runtime to drive the MQTT event loop")]
    NoRuntime,
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<MqttError> for TransportError {
    fn from(err: MqttError) -> Self {
        match err {
            MqttError::InvalidBrokerUrl(url) => {
                TransportError::InvalidConfig(format!("invalid broker URL: {url}"))
            }
            other => TransportError::Client(other.to_string()),
        }
    }
}

pub fn to_mqtt_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Unique per connection attempt so a reconnect never collides with the
/// broker's view of the previous session
pub fn client_id(node_name: &str, link: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{node_name}-{link}-{}", &suffix[..8])
}

/// Build rumqttc options from a link section
pub fn configure_mqtt_options(node_name: &str, config: &LinkSection) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let tls = match url.scheme() {
        "mqtt" => false,
        "mqtts" => true,
        _ => return Err(MqttError::InvalidBrokerUrl(config.broker_url.clone())),
    };
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    let mut options = MqttOptions::new(client_id(node_name, &config.name), host, port);
    if tls {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|name| std::env::var(name).ok())
                .unwrap_or_default();
            options.set_credentials(username, password);
        }
    }

    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));
    options.set_max_packet_size(Some(MAX_PACKET_SIZE));
    Ok(options)
}
