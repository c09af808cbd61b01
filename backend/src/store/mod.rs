//! Narrow persistence interface used by the automation loops.
//!
//! The loops never touch diesel directly; they go through [`Store`] so the
//! same logic runs against Postgres in production and an in-memory store in
//! tests.

use chrono::{DateTime, Utc};

use crate::models::{
    Alert, AlertConfig, ControlSource, Device, DeviceKind, DeviceSchedule, DeviceStatus,
    NewAlert, NewControlLog, SchedulePhase, Sensor, SensorKind,
};

#[cfg(test)]
pub(crate) mod memory;
pub mod postgres;

pub use postgres::PgStore;

/// Error types for store operations
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Connection(String),
    Query(String),
    NotFound(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Connection(msg) => write!(f, "Database connection error: {}", msg),
            StoreError::Query(msg) => write!(f, "Database query failed: {}", msg),
            StoreError::NotFound(what) => write!(f, "Not found: {}", what),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::NotFound => StoreError::NotFound("record".to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

pub trait Store: Send + Sync {
    /// All devices of one kind, lowest id first
    fn devices_by_kind(&self, kind: DeviceKind) -> Result<Vec<Device>, StoreError>;

    fn get_device(&self, device_id: i32) -> Result<Option<Device>, StoreError>;

    /// Set the device status and remember which source wrote it
    fn set_device_status(
        &self,
        device_id: i32,
        status: DeviceStatus,
        source: ControlSource,
        at: DateTime<Utc>,
    ) -> Result<Device, StoreError>;

    /// Un-executed schedules whose `start_time <= now + horizon`, with their
    /// device, ordered by start time
    fn pending_schedules(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> Result<Vec<(DeviceSchedule, Device)>, StoreError>;

    /// Range schedule finished its ON phase; `executed` stays false
    fn mark_schedule_started(&self, schedule_id: i32) -> Result<(), StoreError>;

    /// Terminal transition: `executed = true` with the final phase
    fn mark_schedule_executed(
        &self,
        schedule_id: i32,
        phase: SchedulePhase,
    ) -> Result<(), StoreError>;

    /// Bump the failure counter and return the new value
    fn record_schedule_failure(&self, schedule_id: i32) -> Result<i32, StoreError>;

    fn sensor_for(&self, kind: SensorKind) -> Result<Option<Sensor>, StoreError>;

    /// The owner's config for a sensor kind, preferring an active row
    fn alert_config(
        &self,
        owner_id: i32,
        kind: SensorKind,
    ) -> Result<Option<AlertConfig>, StoreError>;

    fn create_default_alert_config(
        &self,
        owner_id: i32,
        kind: SensorKind,
    ) -> Result<AlertConfig, StoreError>;

    fn pending_alerts_matching(
        &self,
        alert_type: &str,
        message: &str,
        sensor_id: i32,
    ) -> Result<Vec<Alert>, StoreError>;

    fn insert_alert(&self, alert: &NewAlert) -> Result<Alert, StoreError>;

    fn log_control(&self, entry: &NewControlLog) -> Result<(), StoreError>;

    /// Persisted AI-mode switch, `None` when never set
    fn ai_mode_setting(&self) -> Result<Option<bool>, StoreError>;
}
