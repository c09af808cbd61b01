use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};

use super::{Store, StoreError};
use crate::{
    db::DbPool,
    models::{
        Alert, AlertConfig, AlertStatus, ControlSource, Device, DeviceKind, DeviceSchedule,
        DeviceStatus, NewAlert, NewAlertConfig, NewControlLog, SchedulePhase, Sensor, SensorKind,
    },
    schema::{ai_mode, alert_configs, alerts, control_logs, device_schedules, devices, sensors},
};

/// Postgres-backed store on top of the r2d2 pool
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

impl Store for PgStore {
    fn devices_by_kind(&self, kind: DeviceKind) -> Result<Vec<Device>, StoreError> {
        let mut conn = self.conn()?;

        let rows = devices::table
            .filter(devices::device_type.eq(kind.as_str()))
            .order(devices::id.asc())
            .select(Device::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn get_device(&self, device_id: i32) -> Result<Option<Device>, StoreError> {
        let mut conn = self.conn()?;

        let device = devices::table
            .find(device_id)
            .select(Device::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(device)
    }

    fn set_device_status(
        &self,
        device_id: i32,
        status: DeviceStatus,
        source: ControlSource,
        at: DateTime<Utc>,
    ) -> Result<Device, StoreError> {
        let mut conn = self.conn()?;

        diesel::update(devices::table.find(device_id))
            .set((
                devices::status.eq(status.as_str()),
                devices::last_source.eq(source.as_str()),
                devices::last_updated.eq(at),
            ))
            .returning(Device::as_returning())
            .get_result(&mut conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => {
                    StoreError::NotFound(format!("device {}", device_id))
                }
                other => StoreError::from(other),
            })
    }

    fn pending_schedules(
        &self,
        now: DateTime<Utc>,
        horizon: chrono::Duration,
    ) -> Result<Vec<(DeviceSchedule, Device)>, StoreError> {
        let mut conn = self.conn()?;

        let rows = device_schedules::table
            .inner_join(devices::table)
            .filter(device_schedules::executed.eq(false))
            .filter(device_schedules::start_time.le(now + horizon))
            .order(device_schedules::start_time.asc())
            .select((DeviceSchedule::as_select(), Device::as_select()))
            .load(&mut conn)?;
        Ok(rows)
    }

    fn mark_schedule_started(&self, schedule_id: i32) -> Result<(), StoreError> {
        let mut conn = self.conn()?;

        diesel::update(
            device_schedules::table
                .filter(device_schedules::id.eq(schedule_id))
                .filter(device_schedules::executed.eq(false)),
        )
        .set(device_schedules::phase.eq(SchedulePhase::Started.as_str()))
        .execute(&mut conn)?;
        Ok(())
    }

    fn mark_schedule_executed(
        &self,
        schedule_id: i32,
        phase: SchedulePhase,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;

        let updated = diesel::update(device_schedules::table.find(schedule_id))
            .set((
                device_schedules::executed.eq(true),
                device_schedules::phase.eq(phase.as_str()),
            ))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(StoreError::NotFound(format!("schedule {}", schedule_id)));
        }
        Ok(())
    }

    fn record_schedule_failure(&self, schedule_id: i32) -> Result<i32, StoreError> {
        let mut conn = self.conn()?;

        let retry_count = diesel::update(device_schedules::table.find(schedule_id))
            .set(device_schedules::retry_count.eq(device_schedules::retry_count + 1))
            .returning(device_schedules::retry_count)
            .get_result::<i32>(&mut conn)?;
        Ok(retry_count)
    }

    fn sensor_for(&self, kind: SensorKind) -> Result<Option<Sensor>, StoreError> {
        let mut conn = self.conn()?;

        let sensor = sensors::table
            .filter(sensors::sensor_type.eq(kind.as_str()))
            .order(sensors::id.asc())
            .select(Sensor::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(sensor)
    }

    fn alert_config(
        &self,
        owner_id: i32,
        kind: SensorKind,
    ) -> Result<Option<AlertConfig>, StoreError> {
        let mut conn = self.conn()?;

        let config = alert_configs::table
            .filter(alert_configs::owner_id.eq(owner_id))
            .filter(alert_configs::sensor_type.eq(kind.as_str()))
            .order((alert_configs::is_active.desc(), alert_configs::id.asc()))
            .select(AlertConfig::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(config)
    }

    fn create_default_alert_config(
        &self,
        owner_id: i32,
        kind: SensorKind,
    ) -> Result<AlertConfig, StoreError> {
        let mut conn = self.conn()?;

        let config = diesel::insert_into(alert_configs::table)
            .values(&NewAlertConfig::defaults_for(owner_id, kind))
            .returning(AlertConfig::as_returning())
            .get_result(&mut conn)?;
        Ok(config)
    }

    fn pending_alerts_matching(
        &self,
        alert_type: &str,
        message: &str,
        sensor_id: i32,
    ) -> Result<Vec<Alert>, StoreError> {
        let mut conn = self.conn()?;

        let rows = alerts::table
            .filter(alerts::status.eq(AlertStatus::Pending.as_str()))
            .filter(alerts::alert_type.eq(alert_type))
            .filter(alerts::message.eq(message))
            .filter(alerts::sensor_id.eq(sensor_id))
            .select(Alert::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    fn insert_alert(&self, alert: &NewAlert) -> Result<Alert, StoreError> {
        let mut conn = self.conn()?;

        let row = diesel::insert_into(alerts::table)
            .values(alert)
            .returning(Alert::as_returning())
            .get_result(&mut conn)?;
        Ok(row)
    }

    fn log_control(&self, entry: &NewControlLog) -> Result<(), StoreError> {
        let mut conn = self.conn()?;

        diesel::insert_into(control_logs::table)
            .values(entry)
            .execute(&mut conn)?;
        Ok(())
    }

    fn ai_mode_setting(&self) -> Result<Option<bool>, StoreError> {
        let mut conn = self.conn()?;

        let enabled = ai_mode::table
            .order(ai_mode::id.asc())
            .select(ai_mode::enabled)
            .first::<bool>(&mut conn)
            .optional()?;
        Ok(enabled)
    }
}
