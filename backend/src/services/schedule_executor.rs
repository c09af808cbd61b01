use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::sync::Arc;

use crate::{
    models::{ControlSource, Device, DeviceSchedule, SchedulePhase, ScheduleType},
    services::actuator::{ActuationOutcome, DeviceActuator},
    store::Store,
};

/// What a due schedule needs on this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleStep {
    /// Switch the device; `completes` marks the schedule executed afterwards
    Actuate { on: bool, completes: bool },
    /// Range start reached but the device is already on
    MarkStarted,
    /// The whole range passed while the schedule was still pending
    MarkMissed,
    Invalid(&'static str),
    Wait,
}

/// Decide the next step of one un-executed schedule at `now`.
///
/// Range schedules advance `pending -> started -> completed` through their
/// stored phase, so a restart between the ON and OFF transitions resumes
/// with the OFF transition.
pub fn plan_step(
    schedule: &DeviceSchedule,
    device_active: bool,
    now: DateTime<Utc>,
    tolerance: chrono::Duration,
) -> ScheduleStep {
    match schedule.schedule_type() {
        Some(ScheduleType::Once) => {
            let Some(action) = schedule.action() else {
                return ScheduleStep::Invalid("once schedule has no action");
            };
            if schedule.start_time <= now {
                ScheduleStep::Actuate {
                    on: action.turns_on(),
                    completes: true,
                }
            } else {
                ScheduleStep::Wait
            }
        }
        Some(ScheduleType::Range) => {
            let Some(end_time) = schedule.end_time else {
                return ScheduleStep::Invalid("range schedule has no end time");
            };
            if end_time <= schedule.start_time {
                return ScheduleStep::Invalid("range schedule ends before it starts");
            }

            let end_due = now >= end_time - tolerance;
            // The start window wins over the end window, so short ranges still get their ON
            let in_start_window = now <= schedule.start_time + tolerance;
            match schedule.phase() {
                SchedulePhase::Pending if now < schedule.start_time - tolerance => ScheduleStep::Wait,
                SchedulePhase::Pending if in_start_window || !end_due => {
                    if device_active {
                        ScheduleStep::MarkStarted
                    } else {
                        ScheduleStep::Actuate {
                            on: true,
                            completes: false,
                        }
                    }
                }
                SchedulePhase::Pending if now > end_time + tolerance => ScheduleStep::MarkMissed,
                SchedulePhase::Pending => ScheduleStep::Actuate {
                    on: false,
                    completes: true,
                },
                SchedulePhase::Started if end_due => ScheduleStep::Actuate {
                    on: false,
                    completes: true,
                },
                SchedulePhase::Started => ScheduleStep::Wait,
                SchedulePhase::Completed | SchedulePhase::Failed => {
                    ScheduleStep::Invalid("schedule phase is terminal but not executed")
                }
            }
        }
        None => ScheduleStep::Invalid("unknown schedule type"),
    }
}

/// What happened to one schedule during a pass
#[derive(Debug, Clone, PartialEq)]
pub enum ScheduleResult {
    Actuated { on: bool, completed: bool },
    AlreadyActive,
    Missed,
    Suppressed { by: ControlSource },
    Failed { error: String, abandoned: bool },
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOutcome {
    pub schedule_id: i32,
    pub device_id: i32,
    pub result: ScheduleResult,
}

impl ScheduleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self.result,
            ScheduleResult::Failed { .. } | ScheduleResult::Invalid(_)
        )
    }
}

pub struct ScheduleExecutor {
    store: Arc<dyn Store>,
    actuator: Arc<DeviceActuator>,
    tolerance: chrono::Duration,
    max_attempts: i32,
}

impl ScheduleExecutor {
    pub fn new(
        store: Arc<dyn Store>,
        actuator: Arc<DeviceActuator>,
        tolerance: chrono::Duration,
        max_attempts: i32,
    ) -> Self {
        Self {
            store,
            actuator,
            tolerance,
            max_attempts,
        }
    }

    pub async fn run(&self) -> Vec<ScheduleOutcome> {
        self.run_at(Utc::now()).await
    }

    /// Process every due schedule once. A failing schedule is recorded and
    /// the pass moves on to the next one.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Vec<ScheduleOutcome> {
        let mut results = Vec::new();

        let due = match self.store.pending_schedules(now, self.tolerance) {
            Ok(rows) => rows,
            Err(e) => {
                error!("Failed to load pending schedules: {}", e);
                return results;
            }
        };

        for (schedule, device) in due {
            if let Some(result) = self.process(&schedule, &device, now).await {
                results.push(ScheduleOutcome {
                    schedule_id: schedule.id,
                    device_id: device.id,
                    result,
                });
            }
        }

        results
    }

    async fn process(
        &self,
        schedule: &DeviceSchedule,
        device: &Device,
        now: DateTime<Utc>,
    ) -> Option<ScheduleResult> {
        match plan_step(schedule, device.is_active(), now, self.tolerance) {
            ScheduleStep::Wait => None,
            ScheduleStep::Invalid(reason) => {
                warn!("Schedule {} is invalid ({}), marking failed", schedule.id, reason);
                if let Err(e) = self.store.mark_schedule_executed(schedule.id, SchedulePhase::Failed) {
                    error!("Failed to mark schedule {} as failed: {}", schedule.id, e);
                }
                Some(ScheduleResult::Invalid(reason.to_string()))
            }
            ScheduleStep::MarkMissed => {
                warn!(
                    "Range schedule {} for device {} was missed entirely ({} - {:?})",
                    schedule.id, device.id, schedule.start_time, schedule.end_time
                );
                match self
                    .store
                    .mark_schedule_executed(schedule.id, SchedulePhase::Completed)
                {
                    Ok(()) => Some(ScheduleResult::Missed),
                    Err(e) => Some(self.record_failure(schedule, e.to_string())),
                }
            }
            ScheduleStep::MarkStarted => {
                info!(
                    "Range schedule {}: device {} already active, skipping ON",
                    schedule.id, device.id
                );
                match self.store.mark_schedule_started(schedule.id) {
                    Ok(()) => Some(ScheduleResult::AlreadyActive),
                    Err(e) => Some(self.record_failure(schedule, e.to_string())),
                }
            }
            ScheduleStep::Actuate { on, completes } => {
                let reason = format!("{} schedule {}", schedule.schedule_type, schedule.id);
                match self
                    .actuator
                    .switch(device.id, on, ControlSource::Schedule, &reason, now)
                    .await
                {
                    Ok(ActuationOutcome::Applied(_)) => {
                        let advanced = if completes {
                            self.store
                                .mark_schedule_executed(schedule.id, SchedulePhase::Completed)
                        } else {
                            self.store.mark_schedule_started(schedule.id)
                        };
                        match advanced {
                            Ok(()) => Some(ScheduleResult::Actuated {
                                on,
                                completed: completes,
                            }),
                            Err(e) => Some(self.record_failure(schedule, e.to_string())),
                        }
                    }
                    Ok(ActuationOutcome::Suppressed { by }) => {
                        Some(ScheduleResult::Suppressed { by })
                    }
                    Err(e) => Some(self.record_failure(schedule, e.to_string())),
                }
            }
        }
    }

    /// Leave the schedule un-executed for the next tick, or abandon it once
    /// it has used up its attempts.
    fn record_failure(&self, schedule: &DeviceSchedule, error_message: String) -> ScheduleResult {
        error!("Schedule {} failed: {}", schedule.id, error_message);

        let attempts = match self.store.record_schedule_failure(schedule.id) {
            Ok(attempts) => attempts,
            Err(e) => {
                error!("Failed to record failure of schedule {}: {}", schedule.id, e);
                return ScheduleResult::Failed {
                    error: error_message,
                    abandoned: false,
                };
            }
        };

        let abandoned = attempts >= self.max_attempts;
        if abandoned {
            warn!(
                "Schedule {} abandoned after {} failed attempts",
                schedule.id, attempts
            );
            if let Err(e) = self.store.mark_schedule_executed(schedule.id, SchedulePhase::Failed) {
                error!("Failed to mark schedule {} as failed: {}", schedule.id, e);
            }
        } else {
            info!(
                "Schedule {} will be retried next tick (attempt {}/{})",
                schedule.id, attempts, self.max_attempts
            );
        }

        ScheduleResult::Failed {
            error: error_message,
            abandoned,
        }
    }
}
