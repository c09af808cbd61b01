//! In-memory [`Store`] used by the service tests.

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{Store, StoreError};
use crate::models::{
    Alert, AlertConfig, AlertStatus, ControlLog, ControlSource, Device, DeviceKind,
    DeviceSchedule, DeviceStatus, NewAlert, NewAlertConfig, NewControlLog, ScheduleAction,
    SchedulePhase, ScheduleType, Sensor, SensorKind,
};

#[derive(Default)]
struct State {
    next_id: i32,
    devices: Vec<Device>,
    schedules: Vec<DeviceSchedule>,
    sensors: Vec<Sensor>,
    alert_configs: Vec<AlertConfig>,
    alerts: Vec<Alert>,
    control_logs: Vec<ControlLog>,
    ai_mode: Option<bool>,
    failing_devices: HashSet<i32>,
}

impl State {
    fn id(&mut self) -> i32 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_device(&self, kind: DeviceKind, status: DeviceStatus) -> Device {
        let mut state = self.state.lock().unwrap();
        let id = state.id();
        let device = Device {
            id,
            device_type: kind.as_str().to_string(),
            name: format!("{} {}", kind.as_str(), id),
            location: Some("living room".to_string()),
            status: status.as_str().to_string(),
            last_source: ControlSource::Manual.as_str().to_string(),
            last_updated: DateTime::<Utc>::UNIX_EPOCH,
        };
        state.devices.push(device.clone());
        device
    }

    pub fn add_once_schedule(
        &self,
        device_id: i32,
        action: ScheduleAction,
        start_time: DateTime<Utc>,
    ) -> DeviceSchedule {
        self.push_schedule(device_id, ScheduleType::Once, Some(action), start_time, None)
    }

    pub fn add_range_schedule(
        &self,
        device_id: i32,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> DeviceSchedule {
        self.push_schedule(device_id, ScheduleType::Range, None, start_time, Some(end_time))
    }

    fn push_schedule(
        &self,
        device_id: i32,
        schedule_type: ScheduleType,
        action: Option<ScheduleAction>,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> DeviceSchedule {
        let mut state = self.state.lock().unwrap();
        let schedule = DeviceSchedule {
            id: state.id(),
            device_id,
            schedule_type: schedule_type.as_str().to_string(),
            action: action.map(|a| a.as_str().to_string()),
            start_time,
            end_time,
            executed: false,
            phase: SchedulePhase::Pending.as_str().to_string(),
            retry_count: 0,
            created_by: 1,
        };
        state.schedules.push(schedule.clone());
        schedule
    }

    pub fn add_sensor(&self, device_id: i32, kind: SensorKind) -> Sensor {
        let mut state = self.state.lock().unwrap();
        let sensor = Sensor {
            id: state.id(),
            device_id,
            sensor_type: kind.as_str().to_string(),
        };
        state.sensors.push(sensor.clone());
        sensor
    }

    pub fn add_alert_config(&self, owner_id: i32, kind: SensorKind, min: f64, max: f64, active: bool) {
        let mut state = self.state.lock().unwrap();
        let config = AlertConfig {
            id: state.id(),
            owner_id,
            sensor_type: kind.as_str().to_string(),
            min_value: min,
            max_value: max,
            is_active: active,
        };
        state.alert_configs.push(config);
    }

    pub fn set_ai_mode(&self, enabled: bool) {
        self.state.lock().unwrap().ai_mode = Some(enabled);
    }

    /// Make every status write for this device fail
    pub fn fail_device(&self, device_id: i32) {
        self.state.lock().unwrap().failing_devices.insert(device_id);
    }

    pub fn device(&self, device_id: i32) -> Device {
        let state = self.state.lock().unwrap();
        state
            .devices
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
            .expect("device exists")
    }

    pub fn schedule(&self, schedule_id: i32) -> DeviceSchedule {
        let state = self.state.lock().unwrap();
        state
            .schedules
            .iter()
            .find(|s| s.id == schedule_id)
            .cloned()
            .expect("schedule exists")
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.state.lock().unwrap().alerts.clone()
    }

    pub fn alert_configs(&self) -> Vec<AlertConfig> {
        self.state.lock().unwrap().alert_configs.clone()
    }

    pub fn control_logs(&self) -> Vec<ControlLog> {
        self.state.lock().unwrap().control_logs.clone()
    }
}

impl Store for MemoryStore {
    fn devices_by_kind(&self, kind: DeviceKind) -> Result<Vec<Device>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .devices
            .iter()
            .filter(|d| d.device_type == kind.as_str())
            .cloned()
            .collect())
    }

    fn get_device(&self, device_id: i32) -> Result<Option<Device>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.devices.iter().find(|d| d.id == device_id).cloned())
    }

    fn set_device_status(
        &self,
        device_id: i32,
        status: DeviceStatus,
        source: ControlSource,
        at: DateTime<Utc>,
    ) -> Result<Device, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_devices.contains(&device_id) {
            return Err(StoreError::Connection("injected failure".to_string()));
        }
        let device = state
            .devices
            .iter_mut()
            .find(|d| d.id == device_id)
            .ok_or_else(|| StoreError::NotFound(format!("device {}", device_id)))?;
        device.status = status.as_str().to_string();
        device.last_source = source.as_str().to_string();
        device.last_updated = at;
        Ok(device.clone())
    }

    fn pending_schedules(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> Result<Vec<(DeviceSchedule, Device)>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut rows: Vec<_> = state
            .schedules
            .iter()
            .filter(|s| !s.executed && s.start_time <= now + horizon)
            .filter_map(|s| {
                state
                    .devices
                    .iter()
                    .find(|d| d.id == s.device_id)
                    .map(|d| (s.clone(), d.clone()))
            })
            .collect();
        rows.sort_by_key(|(s, _)| s.start_time);
        Ok(rows)
    }

    fn mark_schedule_started(&self, schedule_id: i32) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(s) = state
            .schedules
            .iter_mut()
            .find(|s| s.id == schedule_id && !s.executed)
        {
            s.phase = SchedulePhase::Started.as_str().to_string();
        }
        Ok(())
    }

    fn mark_schedule_executed(
        &self,
        schedule_id: i32,
        phase: SchedulePhase,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let schedule = state
            .schedules
            .iter_mut()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", schedule_id)))?;
        schedule.executed = true;
        schedule.phase = phase.as_str().to_string();
        Ok(())
    }

    fn record_schedule_failure(&self, schedule_id: i32) -> Result<i32, StoreError> {
        let mut state = self.state.lock().unwrap();
        let schedule = state
            .schedules
            .iter_mut()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| StoreError::NotFound(format!("schedule {}", schedule_id)))?;
        schedule.retry_count += 1;
        Ok(schedule.retry_count)
    }

    fn sensor_for(&self, kind: SensorKind) -> Result<Option<Sensor>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sensors
            .iter()
            .find(|s| s.sensor_type == kind.as_str())
            .cloned())
    }

    fn alert_config(
        &self,
        owner_id: i32,
        kind: SensorKind,
    ) -> Result<Option<AlertConfig>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut matching: Vec<_> = state
            .alert_configs
            .iter()
            .filter(|c| c.owner_id == owner_id && c.sensor_type == kind.as_str())
            .cloned()
            .collect();
        matching.sort_by_key(|c| (!c.is_active, c.id));
        Ok(matching.into_iter().next())
    }

    fn create_default_alert_config(
        &self,
        owner_id: i32,
        kind: SensorKind,
    ) -> Result<AlertConfig, StoreError> {
        let mut state = self.state.lock().unwrap();
        let new = NewAlertConfig::defaults_for(owner_id, kind);
        let config = AlertConfig {
            id: state.id(),
            owner_id: new.owner_id,
            sensor_type: new.sensor_type,
            min_value: new.min_value,
            max_value: new.max_value,
            is_active: new.is_active,
        };
        state.alert_configs.push(config.clone());
        Ok(config)
    }

    fn pending_alerts_matching(
        &self,
        alert_type: &str,
        message: &str,
        sensor_id: i32,
    ) -> Result<Vec<Alert>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .alerts
            .iter()
            .filter(|a| {
                a.status == AlertStatus::Pending.as_str()
                    && a.alert_type == alert_type
                    && a.message == message
                    && a.sensor_id == sensor_id
            })
            .cloned()
            .collect())
    }

    fn insert_alert(&self, alert: &NewAlert) -> Result<Alert, StoreError> {
        let mut state = self.state.lock().unwrap();
        let row = Alert {
            id: state.id(),
            device_id: alert.device_id,
            sensor_id: alert.sensor_id,
            alert_type: alert.alert_type.clone(),
            message: alert.message.clone(),
            status: alert.status.clone(),
            created_time: Utc::now(),
        };
        state.alerts.push(row.clone());
        Ok(row)
    }

    fn log_control(&self, entry: &NewControlLog) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let row = ControlLog {
            id: state.id(),
            device_id: entry.device_id,
            action: entry.action.clone(),
            source: entry.source.clone(),
            description: entry.description.clone(),
            created_at: Utc::now(),
        };
        state.control_logs.push(row);
        Ok(())
    }

    fn ai_mode_setting(&self) -> Result<Option<bool>, StoreError> {
        Ok(self.state.lock().unwrap().ai_mode)
    }
}
