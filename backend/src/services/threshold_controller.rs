//! Temperature-threshold fan control ("AI mode").
//!
//! The controller remembers its last acted-upon decision and only switches
//! the fan when a fresh decision differs from it, so readings hovering near
//! the threshold do not produce a write on every tick.

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::{
    integrations::{FeedService, FeedValue},
    models::{ControlSource, DeviceKind, SensorKind},
    services::{
        actuator::{ActuationOutcome, DeviceActuator},
        sensor_cache::SensorCache,
    },
    store::Store,
};

#[derive(Debug, Clone, PartialEq)]
pub struct AutomationState {
    pub ai_mode_enabled: bool,
    pub temperature_threshold: f64,
    /// `Some(true)` when the last applied decision was "below threshold, fan off"
    pub last_control_state: Option<bool>,
}

impl AutomationState {
    /// AI mode starts off; turning it on goes through `enable` so the fan
    /// bootstrap always runs.
    pub fn new(temperature_threshold: f64) -> Self {
        Self {
            ai_mode_enabled: false,
            temperature_threshold,
            last_control_state: None,
        }
    }
}

/// Whether the fan should be off at `temperature`.
///
/// With a zero deadband this is a plain `temperature < threshold`. Otherwise
/// readings inside `threshold ± deadband` keep the previous decision.
pub fn should_be_off(
    temperature: f64,
    threshold: f64,
    deadband: f64,
    last_control_state: Option<bool>,
) -> bool {
    let plain = temperature < threshold;
    if deadband <= 0.0 {
        return plain;
    }
    if temperature < threshold - deadband {
        true
    } else if temperature > threshold + deadband {
        false
    } else {
        last_control_state.unwrap_or(plain)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlDecision {
    Disabled,
    NoReading,
    NoDevice,
    Unchanged { should_be_off: bool },
    Actuated { should_be_off: bool, temperature: f64 },
    Suppressed { by: ControlSource },
    Failed(String),
}

pub struct ThresholdController {
    store: Arc<dyn Store>,
    feed: Arc<dyn FeedService>,
    cache: SensorCache,
    actuator: Arc<DeviceActuator>,
    deadband: f64,
    cache_max_age: chrono::Duration,
    state: Mutex<AutomationState>,
}

impl ThresholdController {
    pub fn new(
        store: Arc<dyn Store>,
        feed: Arc<dyn FeedService>,
        cache: SensorCache,
        actuator: Arc<DeviceActuator>,
        temperature_threshold: f64,
        deadband: f64,
        cache_max_age: chrono::Duration,
    ) -> Self {
        Self {
            store,
            feed,
            cache,
            actuator,
            deadband,
            cache_max_age,
            state: Mutex::new(AutomationState::new(temperature_threshold)),
        }
    }

    pub async fn state(&self) -> AutomationState {
        self.state.lock().await.clone()
    }

    /// Turn AI mode on: switch the fan on right away, then run a threshold check.
    pub async fn enable(&self, now: DateTime<Utc>) -> ControlDecision {
        {
            let mut state = self.state.lock().await;
            state.ai_mode_enabled = true;
            state.last_control_state = None;
        }
        info!("AI mode enabled");

        match self.first_fan() {
            Ok(Some(fan_id)) => match self
                .actuator
                .switch(fan_id, true, ControlSource::AiMode, "AI mode enabled", now)
                .await
            {
                Ok(ActuationOutcome::Applied(_)) => {}
                Ok(ActuationOutcome::Suppressed { by }) => {
                    info!(
                        "AI mode: fan {} left as is on enable, {} control has priority",
                        fan_id,
                        by.as_str()
                    );
                }
                Err(e) => {
                    error!("Failed to turn on fan {} when enabling AI mode: {}", fan_id, e);
                }
            },
            Ok(None) => warn!("AI mode enabled but no fan device is registered"),
            Err(e) => error!("Failed to look up fan device: {}", e),
        }

        self.check(now).await
    }

    pub async fn disable(&self) {
        let mut state = self.state.lock().await;
        state.ai_mode_enabled = false;
        state.last_control_state = None;
        info!("AI mode disabled");
    }

    /// Follow the persisted AI-mode switch. Returns the decision of the
    /// check that enabling runs, if AI mode was just turned on.
    pub async fn sync_mode(&self, now: DateTime<Utc>) -> Option<ControlDecision> {
        let persisted = match self.store.ai_mode_setting() {
            Ok(Some(enabled)) => enabled,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read AI mode setting: {}", e);
                return None;
            }
        };

        let current = self.state.lock().await.ai_mode_enabled;
        match (current, persisted) {
            (false, true) => Some(self.enable(now).await),
            (true, false) => {
                self.disable().await;
                None
            }
            _ => None,
        }
    }

    /// First pass after process start. `ai_mode_enabled` is the configured
    /// default; a persisted "off" overrides it.
    pub async fn start(&self, ai_mode_enabled: bool, now: DateTime<Utc>) -> ControlDecision {
        let persisted_off = matches!(self.store.ai_mode_setting(), Ok(Some(false)));
        if ai_mode_enabled && !persisted_off {
            return self.enable(now).await;
        }
        self.tick_at(now).await
    }

    pub async fn tick(&self) -> ControlDecision {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> ControlDecision {
        if let Some(decision) = self.sync_mode(now).await {
            return decision;
        }
        self.check(now).await
    }

    /// One threshold check. `last_control_state` only moves after the fan
    /// was actually switched, so failed attempts are retried next tick.
    pub async fn check(&self, now: DateTime<Utc>) -> ControlDecision {
        let mut state = self.state.lock().await;
        if !state.ai_mode_enabled {
            return ControlDecision::Disabled;
        }

        let Some(temperature) = self.current_temperature(now).await else {
            warn!("AI mode: no temperature reading available, skipping check");
            return ControlDecision::NoReading;
        };

        let threshold = state.temperature_threshold;
        let off = should_be_off(temperature, threshold, self.deadband, state.last_control_state);
        if state.last_control_state == Some(off) {
            debug!(
                "AI mode: {:.1}°C, fan already {}",
                temperature,
                if off { "off" } else { "on" }
            );
            return ControlDecision::Unchanged { should_be_off: off };
        }

        let fan_id = match self.first_fan() {
            Ok(Some(id)) => id,
            Ok(None) => {
                warn!("AI mode: no fan device registered");
                return ControlDecision::NoDevice;
            }
            Err(e) => {
                error!("AI mode: failed to look up fan device: {}", e);
                return ControlDecision::Failed(e.to_string());
            }
        };

        let reason = format!(
            "temperature {:.1}°C {} threshold {:.1}°C",
            temperature,
            if off { "below" } else { "at or above" },
            threshold
        );
        match self
            .actuator
            .switch(fan_id, !off, ControlSource::AiMode, &reason, now)
            .await
        {
            Ok(ActuationOutcome::Applied(_)) => {
                state.last_control_state = Some(off);
                ControlDecision::Actuated {
                    should_be_off: off,
                    temperature,
                }
            }
            Ok(ActuationOutcome::Suppressed { by }) => {
                info!(
                    "AI mode: fan {} left as is, {} control has priority",
                    fan_id,
                    by.as_str()
                );
                ControlDecision::Suppressed { by }
            }
            Err(e) => {
                error!("AI mode: failed to switch fan {}: {}", fan_id, e);
                ControlDecision::Failed(e.to_string())
            }
        }
    }

    fn first_fan(&self) -> Result<Option<i32>, crate::store::StoreError> {
        Ok(self
            .store
            .devices_by_kind(DeviceKind::Fan)?
            .first()
            .map(|d| d.id))
    }

    /// Fresher of the feed's latest sample and the cached one
    async fn current_temperature(&self, now: DateTime<Utc>) -> Option<f64> {
        let kind = SensorKind::Temperature;
        let from_feed = match self.feed.latest(kind.feed_key()).await {
            Ok(sample) => sample.filter(|s| s.as_f64().is_some()),
            Err(e) => {
                warn!("Failed to read latest temperature: {}", e);
                None
            }
        };
        if let Some(sample) = &from_feed {
            self.cache.update(kind, sample.clone()).await;
        }

        let cached = self.cache.fresh(kind, now, self.cache_max_age).await;
        let best: Option<FeedValue> = match (from_feed, cached) {
            (Some(f), Some(c)) if c.created_at > f.created_at => Some(c),
            (Some(f), _) => Some(f),
            (None, c) => c,
        };
        best.and_then(|s| s.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::fake::FakeFeed;
    use crate::models::DeviceStatus;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 14, 13, 0, 0).unwrap()
    }

    fn secs(s: i64) -> chrono::Duration {
        chrono::Duration::seconds(s)
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        feed: Arc<FakeFeed>,
        cache: SensorCache,
        controller: ThresholdController,
    }

    fn fixture(enabled: bool, deadband: f64) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(FakeFeed::new());
        let cache = SensorCache::new();
        let actuator = Arc::new(DeviceActuator::new(
            store.clone(),
            feed.clone(),
            None,
            chrono::Duration::zero(),
        ));
        let mut controller = ThresholdController::new(
            store.clone(),
            feed.clone(),
            cache.clone(),
            actuator,
            30.0,
            deadband,
            secs(60),
        );
        // Skips the enable bootstrap so tests see only threshold actuations
        controller.state.get_mut().ai_mode_enabled = enabled;
        Fixture {
            store,
            feed,
            cache,
            controller,
        }
    }

    #[test]
    fn test_should_be_off_without_deadband() {
        assert!(should_be_off(29.9, 30.0, 0.0, None));
        assert!(!should_be_off(30.0, 30.0, 0.0, None));
        assert!(!should_be_off(30.1, 30.0, 0.0, Some(true)));
    }

    #[test]
    fn test_should_be_off_with_deadband() {
        assert!(should_be_off(28.9, 30.0, 1.0, Some(false)));
        assert!(!should_be_off(31.1, 30.0, 1.0, Some(true)));
        // Inside the band the previous decision holds
        assert!(!should_be_off(29.5, 30.0, 1.0, Some(false)));
        assert!(should_be_off(30.5, 30.0, 1.0, Some(true)));
        assert!(should_be_off(29.5, 30.0, 1.0, None));
    }

    #[tokio::test]
    async fn test_actuates_only_on_decision_change() {
        let f = fixture(true, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);

        let readings = ["29.9", "29.8", "30.1", "30.2", "29.9", "29.9"];
        for (i, value) in readings.iter().enumerate() {
            f.feed.push_latest("temperature", value, t0() + secs(30 * i as i64));
        }

        let mut actuations = 0;
        for i in 0..readings.len() {
            let decision = f.controller.tick_at(t0() + secs(30 * i as i64 + 1)).await;
            if matches!(decision, ControlDecision::Actuated { .. }) {
                actuations += 1;
            }
        }

        assert_eq!(actuations, 3);
        assert_eq!(
            f.feed.sent_to("fan"),
            vec!["0".to_string(), "1".to_string(), "0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_oscillation_at_threshold_switches_once_per_crossing() {
        let f = fixture(true, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);

        let readings = ["29.9", "30.1", "29.9", "30.1"];
        for (i, value) in readings.iter().enumerate() {
            f.feed.push_latest("temperature", value, t0() + secs(30 * i as i64));
        }
        for i in 0..readings.len() {
            f.controller.tick_at(t0() + secs(30 * i as i64 + 1)).await;
        }

        assert_eq!(f.feed.sent_to("fan").len(), readings.len());
    }

    #[tokio::test]
    async fn test_deadband_suppresses_chatter() {
        let f = fixture(true, 0.5);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);

        let readings = ["29.0", "29.9", "30.1", "29.9", "30.6"];
        for (i, value) in readings.iter().enumerate() {
            f.feed.push_latest("temperature", value, t0() + secs(30 * i as i64));
        }
        for i in 0..readings.len() {
            f.controller.tick_at(t0() + secs(30 * i as i64 + 1)).await;
        }

        assert_eq!(f.feed.sent_to("fan"), vec!["0".to_string(), "1".to_string()]);
    }

    #[tokio::test]
    async fn test_disabled_controller_does_nothing() {
        let f = fixture(false, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "35", t0());

        assert_eq!(f.controller.tick_at(t0()).await, ControlDecision::Disabled);
        assert!(f.feed.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_reading_is_skipped() {
        let f = fixture(true, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.fail_reads("temperature");

        assert_eq!(f.controller.tick_at(t0()).await, ControlDecision::NoReading);
        assert_eq!(f.controller.state().await.last_control_state, None);
    }

    #[tokio::test]
    async fn test_no_fan_registered() {
        let f = fixture(true, 0.0);
        f.feed.push_latest("temperature", "35", t0());

        assert_eq!(f.controller.tick_at(t0()).await, ControlDecision::NoDevice);
    }

    #[tokio::test]
    async fn test_failed_actuation_is_retried() {
        let f = fixture(true, 0.0);
        let fan = f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "32", t0());
        f.feed.fail_next_sends(1);

        let first = f.controller.tick_at(t0()).await;
        assert!(matches!(first, ControlDecision::Failed(_)));
        assert_eq!(f.controller.state().await.last_control_state, None);

        let second = f.controller.tick_at(t0() + secs(30)).await;
        assert_eq!(
            second,
            ControlDecision::Actuated {
                should_be_off: false,
                temperature: 32.0
            }
        );
        assert!(f.store.device(fan.id).is_active());
        assert_eq!(f.controller.state().await.last_control_state, Some(false));
    }

    #[tokio::test]
    async fn test_enabling_turns_fan_on_before_first_check() {
        let f = fixture(false, 0.0);
        let fan = f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "25", t0());
        f.store.set_ai_mode(true);

        let decision = f.controller.tick_at(t0()).await;

        assert!(matches!(
            decision,
            ControlDecision::Actuated { should_be_off: true, .. }
        ));
        assert_eq!(f.feed.sent_to("fan"), vec!["1".to_string(), "0".to_string()]);
        assert!(!f.store.device(fan.id).is_active());
        assert!(f.controller.state().await.ai_mode_enabled);
    }

    #[tokio::test]
    async fn test_start_enabled_bootstraps_fan_on() {
        let f = fixture(false, 0.0);
        let fan = f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "25", t0());

        let decision = f.controller.start(true, t0()).await;

        assert!(matches!(
            decision,
            ControlDecision::Actuated { should_be_off: true, .. }
        ));
        assert_eq!(f.feed.sent_to("fan"), vec!["1".to_string(), "0".to_string()]);
        assert!(!f.store.device(fan.id).is_active());
        assert!(f.controller.state().await.ai_mode_enabled);
    }

    #[tokio::test]
    async fn test_start_respects_persisted_off() {
        let f = fixture(false, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "25", t0());
        f.store.set_ai_mode(false);

        assert_eq!(f.controller.start(true, t0()).await, ControlDecision::Disabled);
        assert!(f.feed.sent().is_empty());
    }

    #[tokio::test]
    async fn test_new_controller_starts_disabled() {
        let f = fixture(false, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "35", t0());

        assert_eq!(f.controller.start(false, t0()).await, ControlDecision::Disabled);
        assert!(!f.controller.state().await.ai_mode_enabled);
    }

    #[tokio::test]
    async fn test_enable_bootstrap_suppressed_by_recent_manual_write() {
        let store = Arc::new(MemoryStore::new());
        let feed = Arc::new(FakeFeed::new());
        let fan = store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        store
            .set_device_status(fan.id, DeviceStatus::Inactive, ControlSource::Manual, t0())
            .unwrap();
        feed.push_latest("temperature", "33", t0());
        let actuator = Arc::new(DeviceActuator::new(
            store.clone(),
            feed.clone(),
            None,
            secs(120),
        ));
        let controller = ThresholdController::new(
            store.clone(),
            feed.clone(),
            SensorCache::new(),
            actuator,
            30.0,
            0.0,
            secs(60),
        );

        let decision = controller.enable(t0() + secs(10)).await;

        assert_eq!(
            decision,
            ControlDecision::Suppressed {
                by: ControlSource::Manual
            }
        );
        assert!(feed.sent().is_empty());
        assert_eq!(controller.state().await.last_control_state, None);
    }

    #[tokio::test]
    async fn test_disabling_resets_last_decision() {
        let f = fixture(true, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "25", t0());

        f.controller.tick_at(t0()).await;
        assert_eq!(f.controller.state().await.last_control_state, Some(true));

        f.store.set_ai_mode(false);
        assert_eq!(
            f.controller.tick_at(t0() + secs(30)).await,
            ControlDecision::Disabled
        );
        let state = f.controller.state().await;
        assert!(!state.ai_mode_enabled);
        assert_eq!(state.last_control_state, None);
    }

    #[tokio::test]
    async fn test_fresh_cache_is_used_when_feed_is_empty() {
        let f = fixture(true, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.cache
            .update(SensorKind::Temperature, FeedValue::new("33", t0() - secs(20)))
            .await;

        assert_eq!(
            f.controller.tick_at(t0()).await,
            ControlDecision::Actuated {
                should_be_off: false,
                temperature: 33.0
            }
        );
    }

    #[tokio::test]
    async fn test_stale_cache_is_ignored() {
        let f = fixture(true, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.cache
            .update(SensorKind::Temperature, FeedValue::new("33", t0() - secs(600)))
            .await;

        assert_eq!(f.controller.tick_at(t0()).await, ControlDecision::NoReading);
    }

    #[tokio::test]
    async fn test_newer_cached_sample_beats_feed() {
        let f = fixture(true, 0.0);
        f.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        f.feed.push_latest("temperature", "25", t0() - secs(40));
        f.cache
            .update(SensorKind::Temperature, FeedValue::new("31", t0() - secs(5)))
            .await;

        assert!(matches!(
            f.controller.tick_at(t0()).await,
            ControlDecision::Actuated { should_be_off: false, .. }
        ));
    }

    #[tokio::test]
    async fn test_independent_controllers_do_not_share_state() {
        let a = fixture(true, 0.0);
        let b = fixture(true, 0.0);
        a.store.add_device(DeviceKind::Fan, DeviceStatus::Inactive);
        a.feed.push_latest("temperature", "25", t0());

        a.controller.tick_at(t0()).await;
        assert_eq!(a.controller.state().await.last_control_state, Some(true));
        assert_eq!(b.controller.state().await.last_control_state, None);
    }
}
