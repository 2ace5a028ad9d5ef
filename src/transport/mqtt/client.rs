//! Impure I/O for one MQTT link
//!
//! Each [`LinkTransport::connect`] builds a fresh rumqttc client and spawns two
//! tasks on the caller's tokio runtime: one polls the event loop and reports
//! through the sink, the other feeds publish and subscribe requests to the
//! client. A connection attempt never retries on its own; the link's state
//! machine decides when to call `connect` again.

use super::connection::{configure_mqtt_options, to_mqtt_qos, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::LinkSection;
use crate::proactor::link::{Qos, Subscription};
use crate::proactor::SubmitError;
use crate::transport::{LinkEventSink, LinkTransport, TransportError, TransportEvent};
use rumqttc::v5::mqttbytes::v5::Filter;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Requests capacity inside rumqttc
const CLIENT_CAPACITY: usize = 64;

#[derive(Debug)]
enum Command {
    Subscribe(Vec<Subscription>),
    Publish { topic: String, payload: Vec<u8>, qos: Qos },
    Disconnect,
}

/// Topics of outstanding subscribe requests, oldest first
type PendingSubscribes = Arc<Mutex<VecDeque<Vec<String>>>>;

struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    poller: JoinHandle<()>,
}

/// [`LinkTransport`] over rumqttc (MQTT v5)
pub struct MqttTransport {
    node_name: String,
    config: LinkSection,
    connection: Option<Connection>,
}

impl MqttTransport {
    pub fn new<S: Into<String>>(node_name: S, config: LinkSection) -> Self {
        Self {
            node_name: node_name.into(),
            config,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn send(&self, command: Command) -> Result<(), TransportError> {
        let connection = self.connection.as_ref().ok_or(TransportError::NotConnected)?;
        connection
            .commands
            .send(command)
            .map_err(|_| TransportError::NotConnected)
    }
}

impl LinkTransport for MqttTransport {
    fn connect(&mut self, sink: LinkEventSink) -> Result<(), TransportError> {
        self.disconnect();

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MqttError::NoRuntime)?;
        let options = configure_mqtt_options(&self.node_name, &self.config)?;
        let (client, event_loop) = AsyncClient::new(options, CLIENT_CAPACITY);
        let pending: PendingSubscribes = Arc::default();
        let (commands, command_rx) = mpsc::unbounded_channel();

        info!(
            link = %self.config.name,
            broker = %self.config.broker_url,
            generation = sink.generation(),
            "Connecting to MQTT broker"
        );

        let poller = runtime.spawn(poll_events(event_loop, sink.clone(), pending.clone()));
        runtime.spawn(run_commands(client, command_rx, pending, sink.link().to_string()));

        self.connection = Some(Connection { commands, poller });
        Ok(())
    }

    fn subscribe(&mut self, subscriptions: &[Subscription]) -> Result<(), TransportError> {
        self.send(Command::Subscribe(subscriptions.to_vec()))
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: Qos) -> Result<(), TransportError> {
        self.send(Command::Publish {
            topic: topic.to_string(),
            payload,
            qos,
        })
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(link = %self.config.name, "Disconnecting from MQTT broker");
            if connection.commands.send(Command::Disconnect).is_err() {
                connection.poller.abort();
            }
        }
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.poller.abort();
        }
    }
}

/// Drive the rumqttc event loop until the connection ends
async fn poll_events(mut event_loop: EventLoop, sink: LinkEventSink, pending: PendingSubscribes) {
    let mut acknowledged = false;

    loop {
        let event = match event_loop.poll().await {
            Ok(event) => event,
            Err(e) => {
                let report = if acknowledged {
                    TransportEvent::Disconnected(e.to_string())
                } else {
                    TransportEvent::ConnectFailed(e.to_string())
                };
                let _ = sink.deliver_when_ready(report).await;
                break;
            }
        };

        let delivered = match MessageHandler::route_mqtt_event(&event) {
            EventRoute::ConnectionAcknowledged => {
                acknowledged = true;
                sink.deliver_when_ready(TransportEvent::Connected).await
            }
            EventRoute::ConnectionRefused(reason) => {
                let _ = sink.deliver_when_ready(TransportEvent::ConnectFailed(reason)).await;
                break;
            }
            EventRoute::MessageReceived { topic, payload, retain } => {
                trace!(link = %sink.link(), %topic, retain, "Received publish");
                sink.deliver_when_ready(TransportEvent::Receipt { topic, payload }).await
            }
            EventRoute::Disconnected(reason) => {
                let _ = sink.deliver_when_ready(TransportEvent::Disconnected(reason)).await;
                break;
            }
            EventRoute::SubscriptionResults(results) => {
                let topics = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front()
                    .unwrap_or_default();
                let mut outcome = Ok(());
                for (topic, success) in MessageHandler::pair_subscription_results(topics, &results) {
                    outcome = sink
                        .deliver_when_ready(TransportEvent::SubscribeResult { topic, success })
                        .await;
                    if outcome.is_err() {
                        break;
                    }
                }
                outcome
            }
            EventRoute::InfrastructureEvent(description) => {
                trace!(link = %sink.link(), event = %description, "MQTT infrastructure event");
                Ok(())
            }
            EventRoute::OutgoingEvent => Ok(()),
        };

        if let Err(SubmitError::Stopped) = delivered {
            debug!(link = %sink.link(), "Dispatch loop stopped; ending MQTT poll task");
            break;
        }
    }
}

/// Feed requests from the link to the rumqttc client
async fn run_commands(
    client: AsyncClient,
    mut commands: mpsc::UnboundedReceiver<Command>,
    pending: PendingSubscribes,
    link: String,
) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Subscribe(subscriptions) => {
                let topics = subscriptions.iter().map(|s| s.topic.clone()).collect();
                let filters: Vec<Filter> = subscriptions
                    .iter()
                    .map(|s| Filter::new(s.topic.clone(), to_mqtt_qos(s.qos)))
                    .collect();
                pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push_back(topics);
                if let Err(e) = client.subscribe_many(filters).await {
                    warn!(link = %link, error = %e, "Failed to request subscriptions");
                }
            }
            Command::Publish { topic, payload, qos } => {
                if let Err(e) = client.publish(topic.as_str(), to_mqtt_qos(qos), false, payload).await {
                    warn!(link = %link, %topic, error = %e, "Failed to hand publish to MQTT client");
                }
            }
            Command::Disconnect => {
                if let Err(e) = client.disconnect().await {
                    debug!(link = %link, error = %e, "Disconnect request not delivered");
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operations_require_connection() {
        let mut transport = MqttTransport::new("a.s", LinkSection::new("gridworks", "mqtt://localhost:1883"));
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.publish("a.s/gw", b"{}".to_vec(), Qos::AtLeastOnce),
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            transport.subscribe(&[Subscription::new("x/gw", Qos::AtLeastOnce)]),
            Err(TransportError::NotConnected)
        ));
        transport.disconnect();
    }

    #[test]
    fn test_connect_outside_runtime_fails() {
        use crate::testing::mocks::RecordingQueue;

        let mut transport = MqttTransport::new("a.s", LinkSection::new("gridworks", "mqtt://localhost:1883"));
        let sink = LinkEventSink::new("gridworks", 1, Arc::new(RecordingQueue::default()));
        assert!(matches!(transport.connect(sink), Err(TransportError::Client(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_connect_failed() {
        use crate::testing::mocks::RecordingQueue;
        use std::time::Duration;

        // Arrange: nothing listens on port 1 of localhost
        let queue = Arc::new(RecordingQueue::default());
        let mut transport = MqttTransport::new("a.s", LinkSection::new("gridworks", "mqtt://127.0.0.1:1"));
        let sink = LinkEventSink::new("gridworks", 4, queue.clone());

        // Act
        transport.connect(sink).unwrap();
        let mut events = Vec::new();
        for _ in 0..200 {
            events = queue.events();
            if !events.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Assert
        assert!(matches!(
            events.first(),
            Some((link, 4, TransportEvent::ConnectFailed(_))) if link == "gridworks"
        ));
    }
}
