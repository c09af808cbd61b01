//! Environment configuration for the automation runner.
//!
//! All settings come from environment variables (optionally loaded from `.env`
//! by `main`). Feed and MQTT credentials are optional: when absent, the
//! corresponding integration runs disabled instead of failing startup.

use std::env;
use std::time::Duration;

/// Upper bound for every interval and window setting (366 days)
const MAX_SECS: i64 = 366 * 24 * 60 * 60;

/// Credentials and addressing for the Adafruit IO feed service
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub api_key: Option<String>,
    /// Prefix applied to every feed key, e.g. `dadn` → `dadn.temperature`
    pub group: String,
    pub timeout: Duration,
}

impl FeedConfig {
    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.api_key.is_some()
    }
}

/// MQTT broker used for control notifications
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub feed: FeedConfig,
    pub mqtt: Option<MqttSettings>,

    pub schedule_interval: Duration,
    pub schedule_tolerance: chrono::Duration,
    pub schedule_max_attempts: i32,

    pub ai_mode_interval: Duration,
    pub ai_mode_enabled: bool,
    pub temperature_threshold: f64,
    pub temperature_deadband: f64,

    pub alert_interval: Duration,
    pub alert_window: chrono::Duration,
    pub alert_owner_id: i32,

    /// `None` disables the feed → store sync job
    pub feed_sync_interval: Option<Duration>,
    /// Zero keeps plain last-write-wins between control sources
    pub override_window: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let schedule_interval = vars.secs("SCHEDULE_INTERVAL_SECS", 30)?;
        let ai_mode_interval = vars.secs("AI_MODE_INTERVAL_SECS", 30)?;
        let alert_interval = vars.secs("ALERT_INTERVAL_SECS", 60)?;
        for (key, interval) in [
            ("SCHEDULE_INTERVAL_SECS", schedule_interval),
            ("AI_MODE_INTERVAL_SECS", ai_mode_interval),
            ("ALERT_INTERVAL_SECS", alert_interval),
        ] {
            if interval.is_zero() {
                return Err(format!("{} must be greater than zero", key));
            }
        }

        let feed_sync_interval = vars.secs("FEED_SYNC_INTERVAL_SECS", 5)?;

        let mqtt = match vars.get("MQTT_HOST") {
            Some(host) => Some(MqttSettings {
                host,
                port: vars.parse("MQTT_PORT", 1883)?,
                username: vars.get("MQTT_USERNAME"),
                password: vars.get("MQTT_PASSWORD"),
                use_tls: vars.parse("MQTT_TLS", false)?,
            }),
            None => None,
        };

        let schedule_max_attempts: i32 = vars.parse("SCHEDULE_MAX_ATTEMPTS", 5)?;
        if schedule_max_attempts < 1 {
            return Err("SCHEDULE_MAX_ATTEMPTS must be at least 1".to_string());
        }

        let temperature_deadband: f64 = vars.parse("TEMPERATURE_DEADBAND", 0.0)?;
        if temperature_deadband < 0.0 {
            return Err("TEMPERATURE_DEADBAND must not be negative".to_string());
        }

        Ok(Self {
            database_url: vars
                .get("DATABASE_URL")
                .ok_or("DATABASE_URL environment variable is not set")?,
            feed: FeedConfig {
                base_url: vars
                    .get("ADAFRUIT_IO_URL")
                    .unwrap_or_else(|| "https://io.adafruit.com/api/v2".to_string()),
                username: vars.get("ADA_USERNAME"),
                api_key: vars.get("ADAFRUIT_IO_KEY"),
                group: vars.get("FEED_GROUP").unwrap_or_else(|| "dadn".to_string()),
                timeout: vars.secs("FEED_TIMEOUT_SECS", 10)?,
            },
            mqtt,
            schedule_interval,
            schedule_tolerance: vars.span("SCHEDULE_TOLERANCE_SECS", 60)?,
            schedule_max_attempts,
            ai_mode_interval,
            ai_mode_enabled: vars.parse("AI_MODE_ENABLED", false)?,
            temperature_threshold: vars.parse("TEMPERATURE_THRESHOLD", 30.0)?,
            temperature_deadband,
            alert_interval,
            alert_window: vars.span("ALERT_WINDOW_SECS", 60)?,
            alert_owner_id: vars.parse("ALERT_OWNER_ID", 1)?,
            feed_sync_interval: (!feed_sync_interval.is_zero()).then_some(feed_sync_interval),
            override_window: vars.span("OVERRIDE_WINDOW_SECS", 0)?,
        })
    }

    /// Cached sensor readings stay usable for two controller ticks
    pub fn sensor_cache_max_age(&self) -> chrono::Duration {
        self.ai_mode_interval
            .checked_mul(2)
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .unwrap_or(chrono::Duration::MAX)
    }
}

struct Vars<F> {
    lookup: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, String> {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|_| format!("{} has an invalid value: {:?}", key, raw)),
            None => Ok(default),
        }
    }

    fn secs(&self, key: &str, default: u64) -> Result<Duration, String> {
        let secs: u64 = self.parse(key, default)?;
        if secs > MAX_SECS as u64 {
            return Err(format!("{} must be at most {} seconds", key, MAX_SECS));
        }
        Ok(Duration::from_secs(secs))
    }

    /// Non-negative whole seconds as a `chrono::Duration`
    fn span(&self, key: &str, default: i64) -> Result<chrono::Duration, String> {
        let secs: i64 = self.parse(key, default)?;
        if secs < 0 {
            return Err(format!("{} must not be negative", key));
        }
        if secs > MAX_SECS {
            return Err(format!("{} must be at most {} seconds", key, MAX_SECS));
        }
        chrono::Duration::try_seconds(secs).ok_or_else(|| format!("{} is out of range", key))
    }
}
