//! Runtime configuration for the telemetry engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Event logger tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Flush as soon as this many events are pending
    pub batch_size: usize,
    /// Periodic flush interval, raised to 10ms when shorter
    pub flush_interval: Duration,
    /// Delivery attempts per batch before it is dropped
    pub max_attempts: u32,
    /// First retry delay, doubled per attempt
    pub initial_backoff: Duration,
    /// Cap on a single retry delay
    pub max_backoff: Duration,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            flush_interval: Duration::from_secs(constants::DEFAULT_FLUSH_INTERVAL),
            max_attempts: constants::DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(constants::DEFAULT_RETRY_BASE_MS),
            max_backoff: Duration::from_millis(constants::DEFAULT_RETRY_MAX_MS),
        }
    }
}

/// Command processing tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Attempts to fetch a pushed command directly before a full scan
    pub fetch_attempts: u32,
    /// Delay between direct fetch attempts
    pub fetch_retry_delay: Duration,
    /// Periodic poll interval, `None` or zero disables polling
    pub poll_interval: Option<Duration>,
    /// Prefix every command subscription id carries
    pub namespace: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            fetch_attempts: constants::DEFAULT_FETCH_RETRIES,
            fetch_retry_delay: Duration::from_millis(constants::DEFAULT_FETCH_RETRY_MS),
            poll_interval: Some(Duration::from_secs(constants::DEFAULT_COMMAND_POLL_INTERVAL)),
            namespace: constants::COMMAND_NAMESPACE.to_string(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub logger: LoggerConfig,
    pub commands: CommandConfig,
    /// Reported in every event's device info
    pub app_version: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            commands: CommandConfig::default(),
            app_version: constants::APP_VERSION.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let poll_secs = constants::get_command_poll_interval();

        Self {
            logger: LoggerConfig {
                batch_size: constants::get_batch_size(),
                flush_interval: Duration::from_secs(constants::get_flush_interval().max(1)),
                max_attempts: constants::get_max_retries(),
                initial_backoff: Duration::from_millis(constants::get_retry_base_ms()),
                max_backoff: Duration::from_millis(constants::DEFAULT_RETRY_MAX_MS),
            },
            commands: CommandConfig {
                fetch_attempts: constants::get_fetch_retries(),
                fetch_retry_delay: Duration::from_millis(constants::get_fetch_retry_ms()),
                poll_interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
                namespace: constants::COMMAND_NAMESPACE.to_string(),
            },
            app_version: constants::APP_VERSION.to_string(),
        }
    }
}
