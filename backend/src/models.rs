use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Domain enums (stored as TEXT columns)
// ============================================================================

/// Actuated device kinds. Each kind owns one feed that doubles as its actuation sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Fan,
    Light,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::Fan, DeviceKind::Light];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Fan => "fan",
            DeviceKind::Light => "light",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fan" => Some(DeviceKind::Fan),
            "light" => Some(DeviceKind::Light),
            _ => None,
        }
    }

    /// Feed written with `1`/`0` to switch this kind of device.
    pub fn feed_key(&self) -> &'static str {
        self.as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Active,
    Inactive,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DeviceStatus::Active),
            "inactive" => Some(DeviceStatus::Inactive),
            _ => None,
        }
    }

    pub fn from_on(on: bool) -> Self {
        if on {
            DeviceStatus::Active
        } else {
            DeviceStatus::Inactive
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, DeviceStatus::Active)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Once,
    Range,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Once => "once",
            ScheduleType::Range => "range",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "once" => Some(ScheduleType::Once),
            "range" => Some(ScheduleType::Range),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleAction {
    On,
    Off,
}

impl ScheduleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleAction::On => "on",
            ScheduleAction::Off => "off",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "on" => Some(ScheduleAction::On),
            "off" => Some(ScheduleAction::Off),
            _ => None,
        }
    }

    pub fn turns_on(&self) -> bool {
        matches!(self, ScheduleAction::On)
    }
}

/// Progress of a schedule. `once` schedules jump straight from `Pending` to
/// `Completed`; `range` schedules pass through `Started` after the ON phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulePhase {
    Pending,
    Started,
    Completed,
    Failed,
}

impl SchedulePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulePhase::Pending => "pending",
            SchedulePhase::Started => "started",
            SchedulePhase::Completed => "completed",
            SchedulePhase::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SchedulePhase::Pending),
            "started" => Some(SchedulePhase::Started),
            "completed" => Some(SchedulePhase::Completed),
            "failed" => Some(SchedulePhase::Failed),
            _ => None,
        }
    }
}

/// Monitored sensor kinds and their feed / alert presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Humidity,
}

impl SensorKind {
    pub const ALL: [SensorKind; 2] = [SensorKind::Temperature, SensorKind::Humidity];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "temperature",
            SensorKind::Humidity => "humidity",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "temperature" => Some(SensorKind::Temperature),
            "humidity" => Some(SensorKind::Humidity),
            _ => None,
        }
    }

    pub fn feed_key(&self) -> &'static str {
        self.as_str()
    }

    pub fn label(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::Humidity => "Humidity",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
        }
    }

    /// `(min_value, max_value)` used when an owner has no config for this kind yet.
    pub fn default_bounds(&self) -> (f64, f64) {
        match self {
            SensorKind::Temperature => (15.0, 35.0),
            SensorKind::Humidity => (30.0, 80.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// Who asked for a device status change. Higher priority wins inside the
/// override window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSource {
    Manual,
    Schedule,
    AiMode,
}

impl ControlSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSource::Manual => "manual",
            ControlSource::Schedule => "schedule",
            ControlSource::AiMode => "ai_mode",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(ControlSource::Manual),
            "schedule" => Some(ControlSource::Schedule),
            "ai_mode" => Some(ControlSource::AiMode),
            _ => None,
        }
    }

    pub fn priority(&self) -> u8 {
        match self {
            ControlSource::Manual => 3,
            ControlSource::Schedule => 2,
            ControlSource::AiMode => 1,
        }
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::devices)]
pub struct Device {
    pub id: i32,
    pub device_type: String,
    pub name: String,
    pub location: Option<String>,
    pub status: String,
    pub last_source: String,
    pub last_updated: DateTime<Utc>,
}

impl Device {
    pub fn kind(&self) -> Option<DeviceKind> {
        DeviceKind::from_str(&self.device_type)
    }

    pub fn is_active(&self) -> bool {
        DeviceStatus::from_str(&self.status).is_some_and(|s| s.is_on())
    }

    pub fn source(&self) -> Option<ControlSource> {
        ControlSource::from_str(&self.last_source)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::device_schedules)]
pub struct DeviceSchedule {
    pub id: i32,
    pub device_id: i32,
    pub schedule_type: String,
    pub action: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub executed: bool,
    pub phase: String,
    pub retry_count: i32,
    pub created_by: i32,
}

impl DeviceSchedule {
    pub fn schedule_type(&self) -> Option<ScheduleType> {
        ScheduleType::from_str(&self.schedule_type)
    }

    pub fn action(&self) -> Option<ScheduleAction> {
        self.action.as_deref().and_then(ScheduleAction::from_str)
    }

    pub fn phase(&self) -> SchedulePhase {
        SchedulePhase::from_str(&self.phase).unwrap_or(SchedulePhase::Pending)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::sensors)]
pub struct Sensor {
    pub id: i32,
    pub device_id: i32,
    pub sensor_type: String,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::alert_configs)]
pub struct AlertConfig {
    pub id: i32,
    pub owner_id: i32,
    pub sensor_type: String,
    pub min_value: f64,
    pub max_value: f64,
    pub is_active: bool,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::alert_configs)]
pub struct NewAlertConfig {
    pub owner_id: i32,
    pub sensor_type: String,
    pub min_value: f64,
    pub max_value: f64,
    pub is_active: bool,
}

impl NewAlertConfig {
    pub fn defaults_for(owner_id: i32, kind: SensorKind) -> Self {
        let (min_value, max_value) = kind.default_bounds();
        Self {
            owner_id,
            sensor_type: kind.as_str().to_string(),
            min_value,
            max_value,
            is_active: true,
        }
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::alerts)]
pub struct Alert {
    pub id: i32,
    pub device_id: i32,
    pub sensor_id: i32,
    pub alert_type: String,
    pub message: String,
    pub status: String,
    pub created_time: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::alerts)]
pub struct NewAlert {
    pub device_id: i32,
    pub sensor_id: i32,
    pub alert_type: String,
    pub message: String,
    pub status: String,
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::control_logs)]
pub struct ControlLog {
    pub id: i32,
    pub device_id: i32,
    pub action: String,
    pub source: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::control_logs)]
pub struct NewControlLog {
    pub device_id: i32,
    pub action: String,
    pub source: String,
    pub description: String,
}
