use crate::subscription::{TopicTransport, TransportError};
use rumqttc::{AsyncClient, ClientError, EventLoop, MqttOptions, QoS};
use serde::Deserialize;
use std::time::Duration;
use tracing::info;

/// MQTT broker configuration
#[derive(Clone, Debug, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive_seconds")]
    pub keep_alive_seconds: u64,
    /// Request queue between the client handle and the event loop
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "meterdash".to_string()
}

fn default_keep_alive_seconds() -> u64 {
    15
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            client_id: default_client_id(),
            keep_alive_seconds: default_keep_alive_seconds(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Subscription transport backed by an rumqttc client.
///
/// Requests are queued without waiting; a full or closed request queue is
/// reported as a failure so the registry retries on the next reconcile.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    qos: QoS,
}

impl MqttTransport {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            qos: QoS::AtLeastOnce,
        }
    }

    pub fn client(&self) -> &AsyncClient {
        &self.client
    }
}

impl TopicTransport for MqttTransport {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_subscribe(topic, self.qos)
            .map_err(|e| transport_error(topic, e))
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.client
            .try_unsubscribe(topic)
            .map_err(|e| transport_error(topic, e))
    }
}

fn transport_error(topic: &str, error: ClientError) -> TransportError {
    TransportError::Rejected {
        topic: topic.to_string(),
        reason: error.to_string(),
    }
}

/// Build the client and its event loop.
///
/// Nothing touches the network until the event loop is polled.
pub fn connect(config: &MqttConfig) -> (MqttTransport, EventLoop) {
    info!(
        host = %config.host,
        port = config.port,
        client_id = %config.client_id,
        "Configuring MQTT client"
    );

    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_seconds));

    let (client, event_loop) = AsyncClient::new(options, config.channel_capacity);
    (MqttTransport::new(client), event_loop)
}
