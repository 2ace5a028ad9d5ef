//! Pure routing of rumqttc events into link-level decisions

use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet, SubscribeReasonCode};
use rumqttc::v5::Event;
use bytes::Bytes;

/// What the polling task should do with one rumqttc event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRoute {
    ConnectionAcknowledged,
    ConnectionRefused(String),
    MessageReceived {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    Disconnected(String),
    /// Per-filter outcome, in the order the filters were requested
    SubscriptionResults(Vec<bool>),
    InfrastructureEvent(String),
    OutgoingEvent,
}

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => {
                    if connack.code == ConnectReturnCode::Success {
                        EventRoute::ConnectionAcknowledged
                    } else {
                        EventRoute::ConnectionRefused(format!("{:?}", connack.code))
                    }
                }
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                },
                Packet::Disconnect(disconnect) => {
                    EventRoute::Disconnected(format!("broker sent disconnect: {:?}", disconnect.reason_code))
                }
                Packet::SubAck(suback) => EventRoute::SubscriptionResults(
                    suback
                        .return_codes
                        .iter()
                        .map(|code| matches!(code, SubscribeReasonCode::Success(_)))
                        .collect(),
                ),
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Pair subscription results with the topics of the batch they answer.
    /// Topics the broker did not answer count as failed.
    pub fn pair_subscription_results(topics: Vec<String>, results: &[bool]) -> Vec<(String, bool)> {
        topics
            .into_iter()
            .enumerate()
            .map(|(i, topic)| (topic, results.get(i).copied().unwrap_or(false)))
            .collect()
    }
}
