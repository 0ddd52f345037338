//! Process configuration read from `QUERYWATCH_*` environment variables

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::alerts::store::{AlertStoreConfig, DEFAULT_DUPLICATE_WINDOW, DEFAULT_MAX_ALERTS};
use crate::alerts::DEFAULT_MAX_ALERT_AGE;
use crate::engine::history::DEFAULT_RESULT_WINDOW;
use crate::engine::scheduler::{
    DEFAULT_INTERVAL, DEFAULT_MAX_CONCURRENT_QUERIES, DEFAULT_RECONNECT_GRACE,
};
use crate::engine::SchedulerConfig;

const ENV_PREFIX: &str = "QUERYWATCH_";

#[derive(Debug, Clone, Serialize)]
pub struct MonitorConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Definitions file; built-in defaults are used when unset
    pub queries_file: Option<PathBuf>,
    #[serde(with = "duration_millis")]
    pub interval: Duration,
    pub max_concurrent_queries: usize,
    pub duplicate_detection: bool,
    #[serde(with = "duration_millis")]
    pub duplicate_window: Duration,
    pub max_alerts: usize,
    #[serde(with = "duration_millis")]
    pub alert_max_age: Duration,
    pub autostart: bool,
    pub webhook_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            db_path: PathBuf::from("monitor.db"),
            queries_file: None,
            interval: DEFAULT_INTERVAL,
            max_concurrent_queries: DEFAULT_MAX_CONCURRENT_QUERIES,
            duplicate_detection: true,
            duplicate_window: DEFAULT_DUPLICATE_WINDOW,
            max_alerts: DEFAULT_MAX_ALERTS,
            alert_max_age: DEFAULT_MAX_ALERT_AGE,
            autostart: true,
            webhook_url: None,
        }
    }
}

impl MonitorConfig {
    /// Read configuration from the process environment. Unset or malformed
    /// values fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let parsed = |name: &str| var(name).and_then(|v| v.parse::<u64>().ok());

        let defaults = Self::default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            db_path: var("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            queries_file: var("QUERIES_FILE").map(PathBuf::from),
            interval: parsed("INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            max_concurrent_queries: parsed("MAX_CONCURRENT")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(defaults.max_concurrent_queries),
            duplicate_detection: var("DUPLICATE_DETECTION")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.duplicate_detection),
            duplicate_window: parsed("DUPLICATE_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.duplicate_window),
            max_alerts: parsed("MAX_ALERTS")
                .map(|n| n as usize)
                .unwrap_or(defaults.max_alerts),
            alert_max_age: parsed("ALERT_MAX_AGE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.alert_max_age),
            autostart: var("AUTOSTART")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.autostart),
            webhook_url: var("WEBHOOK_URL"),
        }
    }

    pub fn store_config(&self) -> AlertStoreConfig {
        AlertStoreConfig {
            duplicate_detection: self.duplicate_detection,
            duplicate_window: self.duplicate_window,
            max_alerts: self.max_alerts,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.interval,
            max_concurrent_queries: self.max_concurrent_queries,
            result_duplicate_window: DEFAULT_RESULT_WINDOW,
            reconnect_grace: DEFAULT_RECONNECT_GRACE,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize a `Duration` as whole milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
