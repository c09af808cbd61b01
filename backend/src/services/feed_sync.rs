use log::{info, warn};
use std::sync::Arc;

use crate::{
    integrations::FeedService,
    models::{ControlSource, DeviceKind, DeviceStatus, NewControlLog},
    store::Store,
};

/// Device whose stored status was corrected from its feed
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedDevice {
    pub device_id: i32,
    pub status: DeviceStatus,
}

/// Mirrors device feed values written outside the engine (dashboard,
/// physical switch) into the store.
pub struct FeedSync {
    store: Arc<dyn Store>,
    feed: Arc<dyn FeedService>,
}

impl FeedSync {
    pub fn new(store: Arc<dyn Store>, feed: Arc<dyn FeedService>) -> Self {
        Self { store, feed }
    }

    pub async fn run(&self) -> Vec<SyncedDevice> {
        let mut synced = Vec::new();
        if !self.feed.is_enabled() {
            return synced;
        }

        for kind in DeviceKind::ALL {
            let sample = match self.feed.latest(kind.feed_key()).await {
                Ok(Some(sample)) => sample,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to read {} feed: {}", kind.as_str(), e);
                    continue;
                }
            };
            let Some(on) = sample.as_switch() else {
                warn!("Ignoring non-numeric {} feed value {:?}", kind.as_str(), sample.value);
                continue;
            };

            let devices = match self.store.devices_by_kind(kind) {
                Ok(devices) => devices,
                Err(e) => {
                    warn!("Failed to load {} devices: {}", kind.as_str(), e);
                    continue;
                }
            };

            // Only samples newer than the stored write can override it
            for device in devices
                .into_iter()
                .filter(|d| sample.created_at > d.last_updated && d.is_active() != on)
            {
                let status = DeviceStatus::from_on(on);
                if let Err(e) = self.store.set_device_status(
                    device.id,
                    status,
                    ControlSource::Manual,
                    sample.created_at,
                ) {
                    warn!("Failed to sync device {} from feed: {}", device.id, e);
                    continue;
                }

                info!(
                    "Device {} ({}) set to {} from its feed",
                    device.id,
                    device.name,
                    status.as_str()
                );
                let entry = NewControlLog {
                    device_id: device.id,
                    action: if on { "ON" } else { "OFF" }.to_string(),
                    source: ControlSource::Manual.as_str().to_string(),
                    description: "feed value changed outside automation".to_string(),
                };
                if let Err(e) = self.store.log_control(&entry) {
                    warn!("Failed to log feed sync for device {}: {}", device.id, e);
                }

                synced.push(SyncedDevice {
                    device_id: device.id,
                    status,
                });
            }
        }

        synced
    }
}
