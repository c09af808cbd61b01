//! YoloHome Automation Backend Library
//!
//! Core of the home automation engine:
//! - Schedule execution for `once` and `range` device schedules
//! - Temperature-threshold fan control ("AI mode")
//! - Sensor threshold alerts with deduplication
//! - Adafruit IO feed and MQTT control integrations

pub mod config;
pub mod db;
pub mod integrations;
pub mod models;
pub mod schema;
pub mod services;
pub mod store;
