pub mod actuator;
pub mod alert_monitor;
pub mod feed_sync;
pub mod jobs;
pub mod schedule_executor;
pub mod sensor_cache;
pub mod threshold_controller;

pub use actuator::DeviceActuator;
pub use alert_monitor::AlertMonitor;
pub use feed_sync::FeedSync;
pub use schedule_executor::ScheduleExecutor;
pub use sensor_cache::SensorCache;
pub use threshold_controller::{AutomationState, ThresholdController};
