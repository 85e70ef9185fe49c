use anyhow::{bail, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use crate::monitor::MonitorConfig;
use crate::processor::session::SessionSettings;
use crate::trigger::TriggerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Postgres,
    Memory,
}

impl FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageKind::Postgres),
            "memory" => Ok(StorageKind::Memory),
            other => Err(format!("unknown STORAGE '{}'", other)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub kafka_bootstrap_servers: String,
    pub kafka_topic: String,
    pub kafka_alert_topic: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: String,
    pub kafka_sasl_mechanism: String,
    pub kafka_username: String,
    pub kafka_password: String,
    pub kafka_security_protocol: String,
    pub kafka_max_retries: u32,
    pub kafka_circuit_breaker_cooldown: u64,
    pub storage: StorageKind,
    pub database_url: String,
    pub device_id: String,
    pub log_level: String,
    pub arrival_radius_meters: f64,
    pub min_movement_meters: f64,
    pub stopped_alert_minutes: i64,
    pub deviation_threshold_meters: f64,
    pub fix_max_age_seconds: i64,
    pub volume_check_interval_ms: u64,
    pub double_press_window_ms: u64,
    pub long_press_duration_ms: u64,
    pub required_press_count: u32,
    pub zone_search_radius_km: f64,
    pub zone_retention_days: i64,
    pub journey_retention_days: i64,
    pub event_retention_days: i64,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parses `key`, falling back to `default` when unset or malformed.
fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let kafka_bootstrap_servers = var_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        let kafka_topic = var_or("KAFKA_TOPIC", "safe-journey-events");
        let kafka_alert_topic = var_or("KAFKA_ALERT_TOPIC", "safe-journey-alerts");
        let kafka_group_id = var_or("KAFKA_GROUP_ID", "safe-journey-session");
        let kafka_auto_offset_reset = var_or("KAFKA_AUTO_OFFSET_RESET", "latest");
        let kafka_sasl_mechanism = var_or("KAFKA_SASL_MECHANISM", "SCRAM-SHA-256");
        let kafka_username = env::var("KAFKA_USERNAME").unwrap_or_default();
        let kafka_password = env::var("KAFKA_PASSWORD").unwrap_or_default();
        let kafka_security_protocol = var_or("KAFKA_SECURITY_PROTOCOL", "SASL_PLAINTEXT");
        let kafka_max_retries = parsed_or("KAFKA_MAX_RETRIES", 5);
        let kafka_circuit_breaker_cooldown = parsed_or("KAFKA_CIRCUIT_BREAKER_COOLDOWN", 300);

        let storage = var_or("STORAGE", "postgres")
            .parse::<StorageKind>()
            .map_err(anyhow::Error::msg)?;

        let db_host = var_or("DB_HOST", "localhost");
        let db_port = var_or("DB_PORT", "5432");
        let db_name = var_or("DB_DATABASE", "safe_journey");
        let db_user = var_or("DB_USER", "safe_journey");
        let db_pwd = var_or("DB_PWD", "safe_journey");

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let device_id = match env::var("DEVICE_ID") {
            Ok(id) if !id.trim().is_empty() => id,
            _ => bail!("DEVICE_ID must be set"),
        };
        let log_level = var_or("LOG_LEVEL", "info");

        let config = Self {
            kafka_bootstrap_servers,
            kafka_topic,
            kafka_alert_topic,
            kafka_group_id,
            kafka_auto_offset_reset,
            kafka_sasl_mechanism,
            kafka_username,
            kafka_password,
            kafka_security_protocol,
            kafka_max_retries,
            kafka_circuit_breaker_cooldown,
            storage,
            database_url,
            device_id,
            log_level,
            arrival_radius_meters: parsed_or("ARRIVAL_RADIUS_METERS", 50.0),
            min_movement_meters: parsed_or("MIN_MOVEMENT_METERS", 10.0),
            stopped_alert_minutes: parsed_or("STOPPED_ALERT_MINUTES", 5),
            deviation_threshold_meters: parsed_or("DEVIATION_THRESHOLD_METERS", 500.0),
            fix_max_age_seconds: parsed_or("FIX_MAX_AGE_SECONDS", 300),
            volume_check_interval_ms: parsed_or("VOLUME_CHECK_INTERVAL_MS", 200),
            double_press_window_ms: parsed_or("DOUBLE_PRESS_WINDOW_MS", 1000),
            long_press_duration_ms: parsed_or("LONG_PRESS_DURATION_MS", 3000),
            required_press_count: parsed_or("REQUIRED_PRESS_COUNT", 2),
            zone_search_radius_km: parsed_or("ZONE_SEARCH_RADIUS_KM", 0.5),
            zone_retention_days: parsed_or("ZONE_RETENTION_DAYS", 180),
            journey_retention_days: parsed_or("JOURNEY_RETENTION_DAYS", 30),
            event_retention_days: parsed_or("EVENT_RETENTION_DAYS", 90),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the timers and detectors cannot run with.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("VOLUME_CHECK_INTERVAL_MS", self.volume_check_interval_ms as i64),
            ("DOUBLE_PRESS_WINDOW_MS", self.double_press_window_ms as i64),
            ("LONG_PRESS_DURATION_MS", self.long_press_duration_ms as i64),
            ("REQUIRED_PRESS_COUNT", self.required_press_count as i64),
            ("STOPPED_ALERT_MINUTES", self.stopped_alert_minutes),
            ("FIX_MAX_AGE_SECONDS", self.fix_max_age_seconds),
            ("ZONE_RETENTION_DAYS", self.zone_retention_days),
            ("JOURNEY_RETENTION_DAYS", self.journey_retention_days),
            ("EVENT_RETENTION_DAYS", self.event_retention_days),
        ];
        for (key, value) in durations {
            if value <= 0 {
                bail!("{} must be greater than zero, got {}", key, value);
            }
        }
        Ok(())
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            arrival_radius_meters: self.arrival_radius_meters,
            min_movement_meters: self.min_movement_meters,
            stall_window: chrono::Duration::minutes(self.stopped_alert_minutes),
            deviation_threshold_meters: self.deviation_threshold_meters,
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            fix_max_age: chrono::Duration::seconds(self.fix_max_age_seconds),
            zone_retention: chrono::Duration::days(self.zone_retention_days),
            journey_retention: chrono::Duration::days(self.journey_retention_days),
            event_retention: chrono::Duration::days(self.event_retention_days),
        }
    }

    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig {
            poll_interval: StdDuration::from_millis(self.volume_check_interval_ms),
            double_press_window: StdDuration::from_millis(self.double_press_window_ms),
            long_press_duration: StdDuration::from_millis(self.long_press_duration_ms),
            required_press_count: self.required_press_count,
        }
    }
}
