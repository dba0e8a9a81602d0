//! Worker configuration loaded from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use domain::DEFAULT_MAX_ATTEMPTS;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: Postgres connection string; in-memory storage when unset
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `METRICS_ADDR`: Prometheus scrape address (default: `0.0.0.0:9000`)
/// - `RELAY_INTERVAL_MS`: event log polling period (default: `200`)
/// - `REDELIVERY_INTERVAL_MS`: consumer pass period (default: `500`)
/// - `MAX_COMMAND_ATTEMPTS`: retry bound for commands (default: `100`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_addr: SocketAddr,
    pub relay_interval: Duration,
    pub redelivery_interval: Duration,
    pub max_command_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Unparseable values fall
    /// back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            metrics_addr: lookup("METRICS_ADDR")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.metrics_addr),
            relay_interval: millis("RELAY_INTERVAL_MS", defaults.relay_interval),
            redelivery_interval: millis("REDELIVERY_INTERVAL_MS", defaults.redelivery_interval),
            max_command_attempts: lookup("MAX_COMMAND_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_command_attempts),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            relay_interval: Duration::from_millis(200),
            redelivery_interval: Duration::from_millis(500),
            max_command_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.database_url, None);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.max_command_attempts, 100);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://localhost/orgs"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("METRICS_ADDR", "127.0.0.1:9100"),
            ("RELAY_INTERVAL_MS", "50"),
            ("REDELIVERY_INTERVAL_MS", "1000"),
            ("MAX_COMMAND_ATTEMPTS", "7"),
        ]);

        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/orgs"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.metrics_addr, SocketAddr::from(([127, 0, 0, 1], 9100)));
        assert_eq!(config.relay_interval, Duration::from_millis(50));
        assert_eq!(config.redelivery_interval, Duration::from_millis(1000));
        assert_eq!(config.max_command_attempts, 7);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = config_from(&[
            ("DATABASE_URL", "  "),
            ("LOG_FORMAT", "xml"),
            ("METRICS_ADDR", "nowhere"),
            ("RELAY_INTERVAL_MS", "0"),
            ("MAX_COMMAND_ATTEMPTS", "many"),
        ]);

        assert_eq!(config, Config::default());
    }
}
