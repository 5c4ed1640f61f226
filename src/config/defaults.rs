//! Default configuration values
//!
//! This module provides default values for configuration options.
//! It is the single source of truth for defaults, including the substitutions applied
//! when a configured value is out of range.

/// Environment variable prefix for all configuration options
pub const ENV_PREFIX: &str = "CONN_PROXY_";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default bind host
pub const HOST_STR: &str = "0.0.0.0";

/// Default listen port
pub const PORT: u16 = 8080;

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Relay buffer size used when the configured value is not positive (16 KiB)
pub const BUFFER_SIZE: usize = 16 * 1024;

/// Largest relay buffer per direction (16 MiB); larger values are clamped
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Concurrent connection ceiling used when the configured value is not positive
pub const MAX_CONNECTIONS: usize = 100;

/// Timeout in seconds used when the configured value is below [`MIN_TIMEOUT`]
pub const TIMEOUT_SECS: u64 = 10;

/// Smallest accepted timeout in seconds
pub const MIN_TIMEOUT: i64 = 2;

/// Largest timeout in seconds (one day); larger values are clamped
pub const MAX_TIMEOUT: i64 = 24 * 60 * 60;

/// Loopback literals that are always allowed through the access check
pub const LOOPBACK_HOSTS: [&str; 4] = [".", "[::1]", "localhost", "127.0.0.1"];

/// Allow-list value that disables the access check
pub const ALLOW_ALL: &str = "*";

/// Interval of the periodic summary line in seconds
pub const SUMMARY_INTERVAL_SECS: u64 = 10;

/// Port appended to request hosts that do not name one
pub const HTTP_PORT: u16 = 80;

/// Effective relay buffer size for a raw configured value
pub fn buffer_size(raw: Option<i64>) -> usize {
    match raw {
        Some(size) if size > 0 => (size as u64).min(MAX_BUFFER_SIZE as u64) as usize,
        _ => BUFFER_SIZE,
    }
}

/// Effective connection ceiling for a raw configured value
pub fn max_connections(raw: Option<i64>) -> usize {
    match raw {
        Some(max) if max > 0 => max as usize,
        _ => MAX_CONNECTIONS,
    }
}

/// Effective timeout in seconds for a raw configured value
pub fn timeout(raw: Option<i64>) -> u64 {
    match raw {
        Some(secs) if secs >= MIN_TIMEOUT => secs.min(MAX_TIMEOUT) as u64,
        _ => TIMEOUT_SECS,
    }
}
