//! Sensor threshold alerts.
//!
//! Each pass averages the trailing window of every monitored sensor feed and
//! compares the mean against the owner's alert config. An alert is only
//! inserted when no pending alert with the same type, message and sensor
//! exists yet.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::{
    integrations::{FeedService, FeedValue},
    models::{Alert, AlertConfig, AlertStatus, NewAlert, SensorKind},
    services::sensor_cache::SensorCache,
    store::Store,
};

/// Upper bound on samples fetched per window
const WINDOW_SAMPLE_LIMIT: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub alert_type: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlertCheck {
    NoData,
    ConfigInitialized,
    Inactive,
    WithinBounds { average: f64 },
    SensorMissing,
    Raised { created: Vec<Alert>, duplicates: usize },
    Failed(String),
}

/// Mean of the numeric samples; unparsable values are ignored
pub fn window_average(samples: &[FeedValue]) -> Option<f64> {
    let values: Vec<f64> = samples.iter().filter_map(FeedValue::as_f64).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Bounds violated by `average` under `config`
pub fn violations(
    kind: SensorKind,
    average: f64,
    config: &AlertConfig,
    window: chrono::Duration,
) -> Vec<Violation> {
    let mut found = Vec::new();
    let describe = |direction: &str, bound: f64| {
        format!(
            "Average {} ({:.1}{}) is {} the alert threshold ({}{}) over the last {}s",
            kind.label().to_lowercase(),
            average,
            kind.unit(),
            direction,
            bound,
            kind.unit(),
            window.num_seconds()
        )
    };

    if average < config.min_value {
        found.push(Violation {
            alert_type: format!("Low {}", kind.label()),
            message: describe("below", config.min_value),
        });
    }
    if average > config.max_value {
        found.push(Violation {
            alert_type: format!("High {}", kind.label()),
            message: describe("above", config.max_value),
        });
    }
    found
}

pub struct AlertMonitor {
    store: Arc<dyn Store>,
    feed: Arc<dyn FeedService>,
    cache: SensorCache,
    owner_id: i32,
    window: chrono::Duration,
}

impl AlertMonitor {
    pub fn new(
        store: Arc<dyn Store>,
        feed: Arc<dyn FeedService>,
        cache: SensorCache,
        owner_id: i32,
        window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            feed,
            cache,
            owner_id,
            window,
        }
    }

    pub async fn run(&self) -> Vec<(SensorKind, AlertCheck)> {
        self.run_at(Utc::now()).await
    }

    /// Check every monitored sensor kind. A failure on one kind does not
    /// stop the others.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Vec<(SensorKind, AlertCheck)> {
        let mut results = Vec::new();
        for kind in SensorKind::ALL {
            let check = match self.check_kind(kind, now).await {
                Ok(check) => check,
                Err(e) => {
                    error!("Alert check for {} failed: {}", kind.as_str(), e);
                    AlertCheck::Failed(e)
                }
            };
            results.push((kind, check));
        }
        results
    }

    async fn check_kind(&self, kind: SensorKind, now: DateTime<Utc>) -> Result<AlertCheck, String> {
        let samples = self
            .feed
            .range(kind.feed_key(), now - self.window, now, WINDOW_SAMPLE_LIMIT)
            .await
            .map_err(|e| e.to_string())?;

        let Some(average) = window_average(&samples) else {
            debug!("No {} samples in the last {}s", kind.as_str(), self.window.num_seconds());
            return Ok(AlertCheck::NoData);
        };

        if let Some(latest) = samples
            .into_iter()
            .filter(|s| s.as_f64().is_some())
            .max_by_key(|s| s.created_at)
        {
            self.cache.update(kind, latest).await;
        }

        let config = match self
            .store
            .alert_config(self.owner_id, kind)
            .map_err(|e| e.to_string())?
        {
            Some(config) => config,
            None => {
                let created = self
                    .store
                    .create_default_alert_config(self.owner_id, kind)
                    .map_err(|e| e.to_string())?;
                info!(
                    "Created default {} alert config for owner {}: min={}, max={}",
                    kind.as_str(),
                    self.owner_id,
                    created.min_value,
                    created.max_value
                );
                return Ok(AlertCheck::ConfigInitialized);
            }
        };

        if !config.is_active {
            debug!("{} alert config {} is inactive", kind.as_str(), config.id);
            return Ok(AlertCheck::Inactive);
        }

        info!(
            "Average {}: {:.2}{}, thresholds: min={}, max={}",
            kind.as_str(),
            average,
            kind.unit(),
            config.min_value,
            config.max_value
        );

        let found = violations(kind, average, &config, self.window);
        if found.is_empty() {
            return Ok(AlertCheck::WithinBounds { average });
        }

        let Some(sensor) = self.store.sensor_for(kind).map_err(|e| e.to_string())? else {
            warn!("No {} sensor registered, cannot raise alert", kind.as_str());
            return Ok(AlertCheck::SensorMissing);
        };

        let mut created = Vec::new();
        let mut duplicates = 0;
        for violation in found {
            let existing = self
                .store
                .pending_alerts_matching(&violation.alert_type, &violation.message, sensor.id)
                .map_err(|e| e.to_string())?;
            if !existing.is_empty() {
                debug!(
                    "Pending '{}' alert already exists for sensor {}",
                    violation.alert_type, sensor.id
                );
                duplicates += 1;
                continue;
            }

            let alert = self
                .store
                .insert_alert(&NewAlert {
                    device_id: sensor.device_id,
                    sensor_id: sensor.id,
                    alert_type: violation.alert_type,
                    message: violation.message,
                    status: AlertStatus::Pending.as_str().to_string(),
                })
                .map_err(|e| e.to_string())?;
            info!("Created {} alert {}: {}", alert.alert_type, alert.id, alert.message);
            created.push(alert);
        }

        Ok(AlertCheck::Raised { created, duplicates })
    }
}
