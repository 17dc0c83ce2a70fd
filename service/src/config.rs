//! Configuration management for the Seatwatch service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Numeric settings fall back to their default when unset or unparseable;
//! the tracked-performance worklist is parsed strictly because a typo there
//! would silently stop a show from being watched.

use seatwatch_core::crawling::TrackedPerformance;
use seatwatch_core::performance::{PerformanceCode, PeriodQualifier, ValueError};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Worklist used when `SEATWATCH_TRACKED_PERFORMANCES` is unset
pub const DEFAULT_TRACKED_PERFORMANCES: &str = "1011:6";

/// Errors from loading configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A worklist entry is not of the form `code:qualifier`
    #[error("Invalid tracked performance '{entry}': expected 'code:qualifier'")]
    MalformedTrackedPerformance {
        /// The offending entry
        entry: String,
    },

    /// A worklist entry has an invalid code or qualifier
    #[error("Invalid tracked performance '{entry}': {source}")]
    InvalidTrackedPerformance {
        /// The offending entry
        entry: String,
        /// The validation failure
        source: ValueError,
    },

    /// The worklist is empty
    #[error("SEATWATCH_TRACKED_PERFORMANCES lists no performance")]
    EmptyWorklist,

    /// A duration that must be positive is zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Crawl dispatch configuration
    pub dispatch: DispatchConfig,
    /// Change-stream consumer configuration
    pub consumer: ConsumerConfig,
    /// Process-level configuration
    pub server: ServerConfig,
}

/// Crawl dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Performances to enumerate on every run
    pub tracked_performances: Vec<TrackedPerformance>,
    /// Topic `AssignCrawling` events are published to
    pub assign_crawling_topic: String,
    /// Seconds between dispatch runs (default: 3600)
    pub interval_secs: u64,
}

/// Change-stream consumer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Consumer name (for logging)
    pub name: String,
    /// Seconds to wait before resubscribing (default: 5)
    pub retry_delay_secs: u64,
}

/// Process-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Whether to serve Prometheus metrics (default: true)
    pub metrics_enabled: bool,
    /// Metrics server host (for Prometheus scraping)
    pub metrics_host: String,
    /// Metrics server port
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the worklist cannot be parsed or a
    /// required duration is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Same as [`Config::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tracked_performances = parse_tracked_performances(
            &lookup("SEATWATCH_TRACKED_PERFORMANCES")
                .unwrap_or_else(|| DEFAULT_TRACKED_PERFORMANCES.to_string()),
        )?;

        let config = Self {
            dispatch: DispatchConfig {
                tracked_performances,
                assign_crawling_topic: lookup("SEATWATCH_ASSIGN_CRAWLING_TOPIC")
                    .unwrap_or_else(|| "assign-crawling".to_string()),
                interval_secs: lookup("SEATWATCH_DISPATCH_INTERVAL_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            },
            consumer: ConsumerConfig {
                name: lookup("SEATWATCH_CONSUMER_NAME")
                    .unwrap_or_else(|| "vacancy-reconciler".to_string()),
                retry_delay_secs: lookup("SEATWATCH_CONSUMER_RETRY_DELAY_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            },
            server: ServerConfig {
                log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                metrics_enabled: lookup("METRICS_ENABLED")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
                metrics_host: lookup("METRICS_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                metrics_port: lookup("METRICS_PORT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(9090),
                shutdown_timeout: lookup("SHUTDOWN_TIMEOUT")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
        };

        if config.dispatch.interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("SEATWATCH_DISPATCH_INTERVAL_SECS"));
        }
        if config.consumer.retry_delay_secs == 0 {
            return Err(ConfigError::ZeroDuration("SEATWATCH_CONSUMER_RETRY_DELAY_SECS"));
        }
        Ok(config)
    }

    /// Interval between dispatch runs
    #[must_use]
    pub const fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch.interval_secs)
    }

    /// Wait before the consumer resubscribes
    #[must_use]
    pub const fn consumer_retry_delay(&self) -> Duration {
        Duration::from_secs(self.consumer.retry_delay_secs)
    }

    /// Time allowed for the drivers to stop
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    /// `host:port` the metrics exporter binds to
    #[must_use]
    pub fn metrics_addr(&self) -> String {
        format!("{}:{}", self.server.metrics_host, self.server.metrics_port)
    }
}

/// Parse a comma-separated `code:qualifier` worklist.
///
/// Blank entries (e.g. a trailing comma) are ignored.
///
/// # Errors
///
/// Returns [`ConfigError::MalformedTrackedPerformance`] for an entry without
/// a `:`, [`ConfigError::InvalidTrackedPerformance`] for an invalid code or
/// qualifier, and [`ConfigError::EmptyWorklist`] if nothing remains.
pub fn parse_tracked_performances(raw: &str) -> Result<Vec<TrackedPerformance>, ConfigError> {
    let worklist = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (code, qualifier) =
                entry
                    .split_once(':')
                    .ok_or_else(|| ConfigError::MalformedTrackedPerformance {
                        entry: entry.to_string(),
                    })?;
            let invalid = |source| ConfigError::InvalidTrackedPerformance {
                entry: entry.to_string(),
                source,
            };
            Ok(TrackedPerformance::new(
                PerformanceCode::create(code.trim()).map_err(invalid)?,
                PeriodQualifier::create(qualifier.trim()).map_err(invalid)?,
            ))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    if worklist.is_empty() {
        return Err(ConfigError::EmptyWorklist);
    }
    Ok(worklist)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.dispatch.tracked_performances.len(), 1);
        let tracked = &config.dispatch.tracked_performances[0];
        assert_eq!(tracked.performance_code.as_str(), "1011");
        assert_eq!(tracked.period_qualifier.as_str(), "6");
        assert_eq!(config.dispatch.assign_crawling_topic, "assign-crawling");
        assert_eq!(config.dispatch_interval(), Duration::from_secs(3600));
        assert_eq!(config.consumer_retry_delay(), Duration::from_secs(5));
        assert_eq!(config.metrics_addr(), "0.0.0.0:9090");
        assert!(config.server.metrics_enabled);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SEATWATCH_TRACKED_PERFORMANCES", "1011:6, 2022:1,"),
            ("SEATWATCH_ASSIGN_CRAWLING_TOPIC", "crawl-jobs"),
            ("SEATWATCH_DISPATCH_INTERVAL_SECS", "600"),
            ("METRICS_PORT", "9191"),
            ("METRICS_ENABLED", "false"),
        ])
        .unwrap();

        let codes: Vec<&str> = config
            .dispatch
            .tracked_performances
            .iter()
            .map(|t| t.performance_code.as_str())
            .collect();
        assert_eq!(codes, vec!["1011", "2022"]);
        assert_eq!(config.dispatch.assign_crawling_topic, "crawl-jobs");
        assert_eq!(config.dispatch.interval_secs, 600);
        assert_eq!(config.server.metrics_port, 9191);
        assert!(!config.server.metrics_enabled);
    }

    #[test]
    fn test_unparseable_numbers_fall_back_to_defaults() {
        let config = load(&[("SEATWATCH_CONSUMER_RETRY_DELAY_SECS", "soon")]).unwrap();
        assert_eq!(config.consumer.retry_delay_secs, 5);
    }

    #[test]
    fn test_worklist_errors() {
        assert_eq!(
            parse_tracked_performances("1011"),
            Err(ConfigError::MalformedTrackedPerformance {
                entry: "1011".to_string()
            })
        );
        assert!(matches!(
            parse_tracked_performances("10-11:6"),
            Err(ConfigError::InvalidTrackedPerformance { .. })
        ));
        assert!(matches!(
            parse_tracked_performances("1011: "),
            Err(ConfigError::InvalidTrackedPerformance { .. })
        ));
        assert_eq!(
            parse_tracked_performances(" , "),
            Err(ConfigError::EmptyWorklist)
        );
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert_eq!(
            load(&[("SEATWATCH_DISPATCH_INTERVAL_SECS", "0")]).unwrap_err(),
            ConfigError::ZeroDuration("SEATWATCH_DISPATCH_INTERVAL_SECS")
        );
    }

    #[test]
    fn test_zero_retry_delay_rejected() {
        assert_eq!(
            load(&[("SEATWATCH_CONSUMER_RETRY_DELAY_SECS", "0")]).unwrap_err(),
            ConfigError::ZeroDuration("SEATWATCH_CONSUMER_RETRY_DELAY_SECS")
        );
    }
}
