//! Central Configuration Constants
//!
//! Single source of truth for fixed record names, settings keys and
//! configuration defaults. Environment overrides are read through the helper
//! functions at the bottom of this file.

// ============================================
// Local settings keys
// ============================================

/// Whether the user asked for telemetry
pub const KEY_TELEMETRY_REQUESTED: &str = "telemetry.requested";

/// Whether events are actually being sent
pub const KEY_TELEMETRY_SENDING_ENABLED: &str = "telemetry.sendingEnabled";

/// Client identifier assigned on first enable
pub const KEY_CLIENT_IDENTIFIER: &str = "telemetry.clientIdentifier";

/// Prefix for persisted per-scenario flags
pub const SCENARIO_KEY_PREFIX: &str = "telemetry.scenario.";

// ============================================
// Remote record names
// ============================================

/// Fixed name of the private per-install settings backup record
pub const SETTINGS_BACKUP_RECORD: &str = "TelemetrySettingsBackup";

/// Prefix carried by every command subscription id
pub const COMMAND_NAMESPACE: &str = "telemetry-commands-";

// ============================================
// Defaults
// ============================================

/// Events per delivery batch
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Periodic flush interval (seconds)
pub const DEFAULT_FLUSH_INTERVAL: u64 = 30;

/// Delivery attempts before a batch is dropped
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// First backoff delay (milliseconds), doubled per attempt
pub const DEFAULT_RETRY_BASE_MS: u64 = 500;

/// Upper bound on a single backoff delay (milliseconds)
pub const DEFAULT_RETRY_MAX_MS: u64 = 30_000;

/// Command poll interval (seconds), 0 disables polling
pub const DEFAULT_COMMAND_POLL_INTERVAL: u64 = 300;

/// Direct command fetch attempts after a push
pub const DEFAULT_FETCH_RETRIES: u32 = 3;

/// Delay between direct command fetch attempts (milliseconds)
pub const DEFAULT_FETCH_RETRY_MS: u64 = 1000;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Helper functions to read from env with fallback
// ============================================

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Get batch size from environment or use default
pub fn get_batch_size() -> usize {
    env_parse("TELEMETRY_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1)
}

/// Get flush interval from environment or use default
pub fn get_flush_interval() -> u64 {
    env_parse("TELEMETRY_FLUSH_INTERVAL_SECS", DEFAULT_FLUSH_INTERVAL)
}

/// Get delivery attempt cap from environment or use default
pub fn get_max_retries() -> u32 {
    env_parse("TELEMETRY_MAX_RETRIES", DEFAULT_MAX_RETRIES).max(1)
}

/// Get base backoff from environment or use default
pub fn get_retry_base_ms() -> u64 {
    env_parse("TELEMETRY_RETRY_BASE_MS", DEFAULT_RETRY_BASE_MS)
}

/// Get command poll interval from environment or use default
pub fn get_command_poll_interval() -> u64 {
    env_parse("TELEMETRY_COMMAND_POLL_SECS", DEFAULT_COMMAND_POLL_INTERVAL)
}

/// Get direct fetch attempts from environment or use default
pub fn get_fetch_retries() -> u32 {
    env_parse("TELEMETRY_FETCH_RETRIES", DEFAULT_FETCH_RETRIES).max(1)
}

/// Get direct fetch delay from environment or use default
pub fn get_fetch_retry_ms() -> u64 {
    env_parse("TELEMETRY_FETCH_RETRY_MS", DEFAULT_FETCH_RETRY_MS)
}

/// Get remote record store URL, if configured
pub fn get_server_url() -> Option<String> {
    std::env::var("TELEMETRY_SERVER_URL")
        .ok()
        .filter(|s| !s.trim().is_empty())
}

/// Get remote record store token, if configured
pub fn get_api_token() -> Option<String> {
    std::env::var("TELEMETRY_API_TOKEN")
        .ok()
        .filter(|s| !s.trim().is_empty())
}
