//! Configuration validator
//!
//! This module provides functionality for validating configuration.

use log::warn;

use crate::common::net::split_host_port;
use crate::config::defaults::{self, MAX_BUFFER_SIZE, MAX_TIMEOUT, MIN_TIMEOUT};
use crate::config::types::ProxyConfig;
use crate::config::error::{ConfigError, Result};

/// Validate the configuration
///
/// Out-of-range numeric limits are not errors; they fall back to defaults and show up in
/// [`check_warnings`].
pub fn validate_config(config: &ProxyConfig) -> Result<()> {
    if let Some(target) = config.pass_proxy() {
        if split_host_port(target).is_none() {
            return Err(ConfigError::InvalidValue(
                "pass_proxy".to_string(),
                format!("Pass-through target must be host:port, got '{}'", target),
            ));
        }
    }

    match config.log_level() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        level => {
            warn!("Invalid log level: {}. Using default: {}", level, defaults::LOG_LEVEL_STR);
        }
    }

    Ok(())
}

/// Check configuration for values that were replaced by defaults
pub fn check_warnings(config: &ProxyConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if matches!(config.values.buffer_size, Some(size) if size <= 0) {
        warnings.push(format!(
            "buffer_size must be positive, using {} bytes",
            config.buffer_size()
        ));
    }

    if matches!(config.values.buffer_size, Some(size) if size > MAX_BUFFER_SIZE as i64) {
        warnings.push(format!(
            "buffer_size is above {} bytes, using {} bytes",
            MAX_BUFFER_SIZE,
            config.buffer_size()
        ));
    }

    if matches!(config.values.max_connections, Some(max) if max <= 0) {
        warnings.push(format!(
            "max_connections must be positive, using {}",
            config.max_connections()
        ));
    }

    if matches!(config.values.timeout, Some(secs) if secs < MIN_TIMEOUT) {
        warnings.push(format!(
            "timeout must be at least {} seconds, using {}",
            MIN_TIMEOUT,
            config.timeout()
        ));
    }

    if matches!(config.values.timeout, Some(secs) if secs > MAX_TIMEOUT) {
        warnings.push(format!(
            "timeout is above {} seconds, using {}",
            MAX_TIMEOUT,
            config.timeout()
        ));
    }

    match config.log_level() {
        "error" | "warn" | "info" | "debug" | "trace" => {}
        level => warnings.push(format!("Invalid log level '{}', using default 'info'", level)),
    }

    warnings
}
