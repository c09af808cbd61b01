use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod adafruit;
#[cfg(test)]
pub(crate) mod fake;
pub mod mqtt;

// Re-export implementations
pub use adafruit::AdafruitClient;
pub use mqtt::MqttPublisher;

/// One sample of a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedValue {
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl FeedValue {
    pub fn new(value: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            created_at,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    }

    /// Actuation feeds carry `1` for ON and `0` for OFF
    pub fn as_switch(&self) -> Option<bool> {
        self.as_f64().map(|v| v != 0.0)
    }
}

/// Error types for feed operations
#[derive(Debug, Clone, PartialEq)]
pub enum FeedError {
    Http(String),
    Status(u16),
    InvalidPayload(String),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Http(msg) => write!(f, "Feed request failed: {}", msg),
            FeedError::Status(code) => write!(f, "Feed service returned HTTP {}", code),
            FeedError::InvalidPayload(msg) => write!(f, "Invalid feed payload: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {}

/// Remote key-value time-series store addressed by feed name.
///
/// A disabled implementation must answer every call with "no data"
/// (`Ok(None)`, `Ok(vec![])`, `Ok(())`) instead of an error.
#[async_trait]
pub trait FeedService: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Most recent sample of a feed
    async fn latest(&self, feed: &str) -> Result<Option<FeedValue>, FeedError>;

    /// Samples created in `[start, end]`, at most `limit`
    async fn range(
        &self,
        feed: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FeedValue>, FeedError>;

    /// Append a value to a feed
    async fn send(&self, feed: &str, value: &str) -> Result<(), FeedError>;
}

/// JSON message announcing a device status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub device_id: i32,
    pub action: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl ControlMessage {
    pub fn topic(&self) -> String {
        format!("yolohome/devices/{}/control", self.device_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlError {
    Publish(String),
    Serialize(String),
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlError::Publish(msg) => write!(f, "Control publish failed: {}", msg),
            ControlError::Serialize(msg) => write!(f, "Control message serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for ControlError {}

/// Side channel that broadcasts device control messages
#[async_trait]
pub trait ControlChannel: Send + Sync {
    async fn publish_control(&self, message: &ControlMessage) -> Result<(), ControlError>;
}
