//! MQTT publisher for device control notifications
//!
//! Every applied actuation is announced on `yolohome/devices/<id>/control`
//! so that gateways and dashboards subscribed to the broker follow along.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use std::time::Duration;
use tokio_rustls::rustls::ClientConfig;

use super::{ControlChannel, ControlError, ControlMessage};
use crate::config::MqttSettings;

/// Delay before polling again after the event loop reports an error
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Configuration for MQTT connection
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: format!("yolohome-automation-{}", uuid::Uuid::new_v4()),
            username: None,
            password: None,
            use_tls: false,
            keep_alive_secs: 30,
        }
    }
}

impl From<&MqttSettings> for MqttConfig {
    fn from(settings: &MqttSettings) -> Self {
        Self {
            broker_host: settings.host.clone(),
            broker_port: settings.port,
            username: settings.username.clone(),
            password: settings.password.clone(),
            use_tls: settings.use_tls,
            ..Self::default()
        }
    }
}

/// Error types for MQTT operations
#[derive(Debug, Clone)]
pub enum MqttError {
    ConnectionFailed(String),
    PublishFailed(String),
}

impl std::fmt::Display for MqttError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MqttError::ConnectionFailed(msg) => write!(f, "MQTT connection failed: {}", msg),
            MqttError::PublishFailed(msg) => write!(f, "MQTT publish failed: {}", msg),
        }
    }
}

impl std::error::Error for MqttError {}

/// A managed, publish-only MQTT connection
pub struct MqttPublisher {
    client: AsyncClient,
    _event_handle: tokio::task::JoinHandle<()>,
}

impl MqttPublisher {
    /// Create a new MQTT connection
    pub fn connect(config: MqttConfig) -> Result<Self, MqttError> {
        let mut mqtt_options = MqttOptions::new(
            &config.client_id,
            &config.broker_host,
            config.broker_port,
        );

        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        if config.use_tls {
            // Load native root certificates from the operating system
            let mut root_cert_store = tokio_rustls::rustls::RootCertStore::empty();

            let cert_result = rustls_native_certs::load_native_certs();

            for err in &cert_result.errors {
                warn!("Error loading native cert: {}", err);
            }

            let (added, _ignored) = root_cert_store.add_parsable_certificates(cert_result.certs);
            if added == 0 {
                return Err(MqttError::ConnectionFailed(
                    "no native root certificates available for TLS".to_string(),
                ));
            }
            debug!("Loaded {} native root certificates for TLS", added);

            let client_config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            mqtt_options.set_transport(Transport::tls_with_config(client_config.into()));
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        let event_handle = tokio::spawn(async move {
            Self::run_event_loop(eventloop).await;
        });

        info!(
            "MQTT control publisher started for {}:{}",
            config.broker_host, config.broker_port
        );

        Ok(Self {
            client,
            _event_handle: event_handle,
        })
    }

    /// Drive the connection; rumqttc reconnects on the next poll after an error
    async fn run_event_loop(mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("MQTT connection acknowledged");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT event loop error: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    /// Publish a message
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(e.to_string()))
    }
}

/// Serialized payload for a control message
fn encode_control(message: &ControlMessage) -> Result<Vec<u8>, ControlError> {
    serde_json::to_vec(message).map_err(|e| ControlError::Serialize(e.to_string()))
}

#[async_trait]
impl ControlChannel for MqttPublisher {
    async fn publish_control(&self, message: &ControlMessage) -> Result<(), ControlError> {
        let payload = encode_control(message)?;
        self.publish(&message.topic(), &payload)
            .await
            .map_err(|e| ControlError::Publish(e.to_string()))
    }
}
