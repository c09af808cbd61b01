//! Automation Runner - periodic control loops for YoloHome
//!
//! This binary runs as a daemon with three independent loops plus an
//! optional feed sync:
//! - schedules: executes due device schedules (SCHEDULE_INTERVAL_SECS)
//! - ai-mode: temperature-threshold fan control (AI_MODE_INTERVAL_SECS)
//! - alerts: sensor threshold alerts (ALERT_INTERVAL_SECS)
//! - feed-sync: mirrors device feeds into the store (FEED_SYNC_INTERVAL_SECS)
//!
//! Every loop runs once at startup. See `config.rs` for all variables.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_cron_scheduler::JobScheduler;

use backend::config::Config;
use backend::db;
use backend::integrations::mqtt::MqttConfig;
use backend::integrations::{AdafruitClient, ControlChannel, FeedService, MqttPublisher};
use backend::services::jobs::{TickGuard, repeated_job, run_guarded, wait_until_idle};
use backend::services::{
    AlertMonitor, DeviceActuator, FeedSync, ScheduleExecutor, SensorCache,
    ThresholdController,
};
use backend::store::{PgStore, Store};

/// Longest wait for in-flight passes after a shutdown signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

struct Loops {
    schedules: Arc<ScheduleExecutor>,
    ai_mode: Arc<ThresholdController>,
    alerts: Arc<AlertMonitor>,
    feed_sync: Arc<FeedSync>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize database pool
    let pool = match db::init_pool(&config.database_url) {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    log::info!("Starting YoloHome automation runner...");

    let loops = build_loops(&config, pool);

    let schedule_guard = TickGuard::new("schedules");
    let ai_mode_guard = TickGuard::new("ai-mode");
    let alert_guard = TickGuard::new("alerts");
    let feed_sync_guard = TickGuard::new("feed-sync");

    // Run every loop once at startup
    log::info!("Running initial pass of every loop...");
    run_guarded(&schedule_guard, || run_schedules(loops.schedules.clone())).await;
    run_guarded(&ai_mode_guard, || {
        start_ai_mode(loops.ai_mode.clone(), config.ai_mode_enabled)
    })
    .await;
    run_guarded(&alert_guard, || run_alerts(loops.alerts.clone())).await;
    if config.feed_sync_interval.is_some() {
        run_guarded(&feed_sync_guard, || run_feed_sync(loops.feed_sync.clone())).await;
    }

    let mut sched = match JobScheduler::new().await {
        Ok(sched) => sched,
        Err(e) => {
            log::error!("Failed to create scheduler: {}", e);
            std::process::exit(1);
        }
    };

    let schedules = loops.schedules.clone();
    let ai_mode = loops.ai_mode.clone();
    let alerts = loops.alerts.clone();
    let mut jobs = vec![
        (
            "schedules",
            repeated_job(schedule_guard.clone(), config.schedule_interval, move || {
                run_schedules(schedules.clone())
            }),
        ),
        (
            "ai-mode",
            repeated_job(ai_mode_guard.clone(), config.ai_mode_interval, move || {
                run_ai_mode(ai_mode.clone())
            }),
        ),
        (
            "alerts",
            repeated_job(alert_guard.clone(), config.alert_interval, move || {
                run_alerts(alerts.clone())
            }),
        ),
    ];
    if let Some(interval) = config.feed_sync_interval {
        let feed_sync = loops.feed_sync.clone();
        jobs.push((
            "feed-sync",
            repeated_job(feed_sync_guard.clone(), interval, move || {
                run_feed_sync(feed_sync.clone())
            }),
        ));
    }

    for (name, job) in jobs {
        let added = match job {
            Ok(job) => sched.add(job).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = added {
            log::error!("Failed to schedule {} job: {}", name, e);
            std::process::exit(1);
        }
    }

    // Start the scheduler
    if let Err(e) = sched.start().await {
        log::error!("Failed to start scheduler: {}", e);
        std::process::exit(1);
    }

    log::info!("Automation runner running. Jobs scheduled:");
    log::info!("  - schedules: every {}s", config.schedule_interval.as_secs());
    log::info!("  - ai-mode: every {}s", config.ai_mode_interval.as_secs());
    log::info!("  - alerts: every {}s", config.alert_interval.as_secs());
    match config.feed_sync_interval {
        Some(interval) => log::info!("  - feed-sync: every {}s", interval.as_secs()),
        None => log::info!("  - feed-sync: disabled"),
    }

    shutdown_signal().await;

    if let Err(e) = sched.shutdown().await {
        log::warn!("Scheduler shutdown reported an error: {}", e);
    }

    let guards = [schedule_guard, ai_mode_guard, alert_guard, feed_sync_guard];
    if wait_until_idle(&guards, SHUTDOWN_GRACE).await {
        log::info!("All loops idle, exiting");
    } else {
        log::warn!("Exiting with passes still in flight");
    }
}

fn build_loops(config: &Config, pool: db::DbPool) -> Loops {
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let feed: Arc<dyn FeedService> = Arc::new(AdafruitClient::new(&config.feed));

    let control: Option<Arc<dyn ControlChannel>> = match &config.mqtt {
        Some(settings) => match MqttPublisher::connect(MqttConfig::from(settings)) {
            Ok(publisher) => Some(Arc::new(publisher)),
            Err(e) => {
                log::warn!("MQTT control notifications disabled: {}", e);
                None
            }
        },
        None => {
            log::info!("MQTT_HOST not set, control notifications disabled");
            None
        }
    };

    let cache = SensorCache::new();
    let actuator = Arc::new(DeviceActuator::new(
        store.clone(),
        feed.clone(),
        control,
        config.override_window,
    ));

    Loops {
        schedules: Arc::new(ScheduleExecutor::new(
            store.clone(),
            actuator.clone(),
            config.schedule_tolerance,
            config.schedule_max_attempts,
        )),
        ai_mode: Arc::new(ThresholdController::new(
            store.clone(),
            feed.clone(),
            cache.clone(),
            actuator,
            config.temperature_threshold,
            config.temperature_deadband,
            config.sensor_cache_max_age(),
        )),
        alerts: Arc::new(AlertMonitor::new(
            store.clone(),
            feed.clone(),
            cache,
            config.alert_owner_id,
            config.alert_window,
        )),
        feed_sync: Arc::new(FeedSync::new(store, feed)),
    }
}

/// Execute due device schedules
async fn run_schedules(executor: Arc<ScheduleExecutor>) {
    let results = executor.run().await;

    let failed = results.iter().filter(|r| r.is_failure()).count();
    if results.is_empty() {
        log::debug!("Schedules: nothing due");
    } else {
        log::info!(
            "Schedules processed: {} handled, {} successful, {} failed",
            results.len(),
            results.len() - failed,
            failed
        );
    }
}

/// Startup pass: enabling from config runs the fan-on bootstrap
async fn start_ai_mode(controller: Arc<ThresholdController>, enabled: bool) {
    let decision = controller.start(enabled, chrono::Utc::now()).await;
    log::info!("AI mode startup: {:?}", decision);
}

/// One threshold check of the fan controller
async fn run_ai_mode(controller: Arc<ThresholdController>) {
    let decision = controller.tick().await;
    log::debug!("AI mode: {:?}", decision);
}

/// Check sensor averages against alert configs
async fn run_alerts(monitor: Arc<AlertMonitor>) {
    for (kind, check) in monitor.run().await {
        log::debug!("Alert check {}: {:?}", kind.as_str(), check);
    }
}

async fn run_feed_sync(sync: Arc<FeedSync>) {
    let synced = sync.run().await;
    if !synced.is_empty() {
        log::info!("Feed sync updated {} device(s)", synced.len());
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received, stopping scheduler...");
}
