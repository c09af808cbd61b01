//! Single write path for device actuation.
//!
//! Every loop switches devices through [`DeviceActuator::switch`], which
//! writes the device feed, updates the stored status, appends a control log
//! entry and announces the change on the control channel.

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;

use crate::{
    integrations::{ControlChannel, ControlMessage, FeedError, FeedService},
    models::{ControlSource, Device, DeviceStatus, NewControlLog},
    store::{Store, StoreError},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ActuationOutcome {
    Applied(Device),
    /// A higher-priority source wrote this device inside the override window
    Suppressed { by: ControlSource },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActuationError {
    Feed(FeedError),
    Store(StoreError),
    UnknownDeviceType(String),
}

impl std::fmt::Display for ActuationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActuationError::Feed(e) => write!(f, "{}", e),
            ActuationError::Store(e) => write!(f, "{}", e),
            ActuationError::UnknownDeviceType(t) => write!(f, "Unknown device type: {}", t),
        }
    }
}

impl std::error::Error for ActuationError {}

impl From<FeedError> for ActuationError {
    fn from(e: FeedError) -> Self {
        ActuationError::Feed(e)
    }
}

impl From<StoreError> for ActuationError {
    fn from(e: StoreError) -> Self {
        ActuationError::Store(e)
    }
}

pub struct DeviceActuator {
    store: Arc<dyn Store>,
    feed: Arc<dyn FeedService>,
    control: Option<Arc<dyn ControlChannel>>,
    override_window: chrono::Duration,
}

impl DeviceActuator {
    pub fn new(
        store: Arc<dyn Store>,
        feed: Arc<dyn FeedService>,
        control: Option<Arc<dyn ControlChannel>>,
        override_window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            feed,
            control,
            override_window,
        }
    }

    /// Switch a device ON or OFF on behalf of `source`.
    ///
    /// The feed write and the status update must both succeed for the
    /// actuation to count; the control log and the MQTT notification are
    /// best-effort.
    pub async fn switch(
        &self,
        device_id: i32,
        on: bool,
        source: ControlSource,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ActuationOutcome, ActuationError> {
        let device = self
            .store
            .get_device(device_id)?
            .ok_or_else(|| StoreError::NotFound(format!("device {}", device_id)))?;

        let kind = device
            .kind()
            .ok_or_else(|| ActuationError::UnknownDeviceType(device.device_type.clone()))?;

        if let Some(by) = self.overriding_source(&device, source, now) {
            warn!(
                "Skipping {} of {} (device {}): {} wrote it at {} and outranks {}",
                on_off(on),
                device.name,
                device.id,
                by.as_str(),
                device.last_updated,
                source.as_str()
            );
            return Ok(ActuationOutcome::Suppressed { by });
        }

        self.feed
            .send(kind.feed_key(), if on { "1" } else { "0" })
            .await?;

        let status = DeviceStatus::from_on(on);
        let updated = self
            .store
            .set_device_status(device.id, status, source, now)?;

        info!(
            "Device {} ({}) switched {} by {}: {}",
            updated.id,
            updated.name,
            on_off(on),
            source.as_str(),
            reason
        );

        let log_entry = NewControlLog {
            device_id: updated.id,
            action: on_off(on).to_string(),
            source: source.as_str().to_string(),
            description: reason.to_string(),
        };
        if let Err(e) = self.store.log_control(&log_entry) {
            error!("Failed to log control action for device {}: {}", updated.id, e);
        }

        if let Some(control) = &self.control {
            let message = ControlMessage {
                device_id: updated.id,
                action: on_off(on).to_string(),
                status: status.as_str().to_string(),
                timestamp: now,
                source: source.as_str().to_string(),
            };
            if let Err(e) = control.publish_control(&message).await {
                warn!("Failed to publish control message for device {}: {}", updated.id, e);
            }
        }

        Ok(ActuationOutcome::Applied(updated))
    }

    /// The stored writer, if it outranks `source` and wrote inside the window
    fn overriding_source(
        &self,
        device: &Device,
        source: ControlSource,
        now: DateTime<Utc>,
    ) -> Option<ControlSource> {
        if self.override_window <= chrono::Duration::zero() {
            return None;
        }
        let last = device.source()?;
        let recent = now - device.last_updated < self.override_window;
        (recent && last.priority() > source.priority()).then_some(last)
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}
