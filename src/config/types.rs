//! Configuration types
//!
//! This module contains the main configuration types used throughout the application.

use std::collections::HashMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use log::debug;

use crate::config::defaults::{self, ALLOW_ALL, HOST_STR, LOG_LEVEL_STR, PORT};

/// Source of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueSource {
    /// Default value
    Default,
    /// From configuration file
    File,
    /// From environment variable
    Environment,
    /// From command line argument
    CommandLine,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Default => write!(f, "default"),
            ValueSource::File => write!(f, "file"),
            ValueSource::Environment => write!(f, "environment"),
            ValueSource::CommandLine => write!(f, "command line"),
        }
    }
}

/// Configuration values
///
/// Every field is optional so that partial layers (file, environment, command line) can be
/// merged on top of each other. Numeric limits are kept exactly as configured; the
/// accessors on [`ProxyConfig`] apply the fallback substitutions.
///
/// Legacy PascalCase keys (`BuffSize`, `AllowMaxConn`, `AllowIpStr`, ...) are accepted
/// as aliases in configuration files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigValues {
    // --- Network settings ---

    /// Bind host for the listening socket
    #[serde(default)]
    pub host: Option<String>,

    /// Listening port
    #[serde(default, alias = "Port")]
    pub port: Option<u16>,

    // --- Relay settings ---

    /// Relay buffer size in bytes (`<= 0` selects the default)
    #[serde(default, alias = "BuffSize")]
    pub buffer_size: Option<i64>,

    /// Maximum number of concurrently handled connections (`<= 0` selects the default)
    #[serde(default, alias = "AllowMaxConn")]
    pub max_connections: Option<i64>,

    /// Connection timeout in seconds (`< 2` selects the default)
    #[serde(default, alias = "Timeout")]
    pub timeout: Option<i64>,

    /// Comma separated list of allowed client hosts, or `*` for everyone
    #[serde(default, alias = "AllowIpStr")]
    pub allow_ip: Option<String>,

    /// Fixed `host:port` every connection is relayed to, skipping HTTP parsing
    #[serde(default, alias = "PassProxy")]
    pub pass_proxy: Option<String>,

    // --- General settings ---

    /// Verbose per-connection logging
    #[serde(default, alias = "PrintLog")]
    pub print_log: Option<bool>,

    /// Periodic summary of accepted and active connections
    #[serde(default, alias = "PrintIpSummary")]
    pub print_summary: Option<bool>,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Proxy configuration
///
/// Built once at start-up and shared read-only (behind an `Arc`) with every component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Configuration values
    pub values: ConfigValues,

    /// Configuration file path
    pub config_file: Option<PathBuf>,

    /// Source tracking for configuration values
    pub sources: HashMap<String, ValueSource>,
}

impl Deref for ProxyConfig {
    type Target = ConfigValues;

    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl Serialize for ProxyConfig {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.values.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProxyConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let values = ConfigValues::deserialize(deserializer)?;
        Ok(Self::from_values(values))
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let mut config = Self::from_values(ConfigValues::default());
        config.set_default_values();
        config
    }
}

impl ProxyConfig {
    /// Wrap a set of values without applying defaults
    pub fn from_values(values: ConfigValues) -> Self {
        Self {
            values,
            config_file: None,
            sources: HashMap::new(),
        }
    }

    /// Set default values for all configuration options that are still unset
    pub fn set_default_values(&mut self) {
        macro_rules! default_field {
            ($name:ident, $value:expr) => {
                if self.values.$name.is_none() {
                    self.values.$name = Some($value);
                    self.sources.insert(stringify!($name).to_string(), ValueSource::Default);
                }
            };
        }

        default_field!(host, HOST_STR.to_string());
        default_field!(port, PORT);
        default_field!(buffer_size, defaults::BUFFER_SIZE as i64);
        default_field!(max_connections, defaults::MAX_CONNECTIONS as i64);
        default_field!(timeout, defaults::TIMEOUT_SECS as i64);
        default_field!(allow_ip, String::new());
        default_field!(pass_proxy, String::new());
        default_field!(print_log, false);
        default_field!(print_summary, false);
        default_field!(log_level, LOG_LEVEL_STR.to_string());
    }

    /// Get the source of a configuration value
    pub fn source(&self, name: &str) -> String {
        match self.sources.get(name) {
            Some(source) => source.to_string(),
            None => "unknown".to_string(),
        }
    }

    /// Get the bind host
    pub fn host(&self) -> &str {
        self.values.host.as_deref().unwrap_or(HOST_STR)
    }

    /// Get the listening port
    pub fn port(&self) -> u16 {
        self.values.port.unwrap_or(PORT)
    }

    /// Get the listen address as `host:port`
    pub fn listen_addr(&self) -> String {
        let host = self.host();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.port())
        } else {
            format!("{}:{}", host, self.port())
        }
    }

    /// Get the effective relay buffer size in bytes
    pub fn buffer_size(&self) -> usize {
        defaults::buffer_size(self.values.buffer_size)
    }

    /// Get the effective maximum number of concurrently handled connections
    pub fn max_connections(&self) -> usize {
        defaults::max_connections(self.values.max_connections)
    }

    /// Get the effective connection timeout in seconds
    pub fn timeout(&self) -> u64 {
        defaults::timeout(self.values.timeout)
    }

    /// Connection-wide deadline and dial timeout
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout())
    }

    /// How long an arrival waits for an admission slot
    pub fn admission_wait(&self) -> Duration {
        self.timeout_duration() / 2
    }

    /// Get the raw allow-list string
    pub fn allow_ip(&self) -> &str {
        self.values.allow_ip.as_deref().unwrap_or("")
    }

    /// Whether the access check is disabled (`allow_ip` is `*`)
    pub fn allows_all(&self) -> bool {
        self.allow_ip().trim() == ALLOW_ALL
    }

    /// Get the fixed pass-through target, if configured
    pub fn pass_proxy(&self) -> Option<&str> {
        self.values
            .pass_proxy
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
    }

    /// Whether verbose per-connection logging is enabled
    pub fn print_log(&self) -> bool {
        self.values.print_log.unwrap_or(false)
    }

    /// Whether the periodic summary is enabled
    pub fn print_summary(&self) -> bool {
        self.values.print_summary.unwrap_or(false)
    }

    /// Get the configured log level
    pub fn log_level(&self) -> &str {
        self.values.log_level.as_deref().unwrap_or(LOG_LEVEL_STR)
    }

    /// Log level to start the logger with
    ///
    /// `print_log` raises anything quieter than `debug` to `debug`.
    pub fn effective_log_level(&self) -> &str {
        match (self.print_log(), self.log_level()) {
            (true, "error" | "warn" | "info") => "debug",
            (_, level) => level,
        }
    }

    /// Get the configuration file path
    pub fn config_file(&self) -> Option<&Path> {
        self.config_file.as_deref()
    }

    /// Merge two configurations
    ///
    /// Every value set in `other` overrides the value in `self` and is recorded with `source`.
    pub fn merge(&self, other: &ProxyConfig, source: ValueSource) -> Self {
        let mut result = self.clone();

        macro_rules! merge_field {
            ($name:ident) => {
                if other.values.$name.is_some() {
                    result.values.$name = other.values.$name.clone();
                    let origin = other.sources.get(stringify!($name)).copied().unwrap_or(source);
                    result.sources.insert(stringify!($name).to_string(), origin);
                }
            };
        }

        // Network settings
        merge_field!(host);
        merge_field!(port);

        // Relay settings
        merge_field!(buffer_size);
        merge_field!(max_connections);
        merge_field!(timeout);
        merge_field!(allow_ip);
        merge_field!(pass_proxy);

        // General settings
        merge_field!(print_log);
        merge_field!(print_summary);
        merge_field!(log_level);

        if let Some(path) = &other.config_file {
            result.config_file = Some(path.clone());
        }

        result
    }

    /// Log the configuration
    pub fn log(&self) {
        use log::info;

        info!("=== Configuration ===");
        info!("  Listen address: {} (from {})", self.listen_addr(), self.source("port"));
        info!("  Buffer size: {} bytes (from {})", self.buffer_size(), self.source("buffer_size"));
        info!("  Max connections: {} (from {})", self.max_connections(), self.source("max_connections"));
        info!("  Timeout: {} seconds (from {})", self.timeout(), self.source("timeout"));

        if self.allows_all() {
            info!("  Allowed clients: everyone (from {})", self.source("allow_ip"));
        } else {
            info!("  Allowed clients: loopback + [{}] (from {})", self.allow_ip(), self.source("allow_ip"));
        }

        match self.pass_proxy() {
            Some(target) => info!("  Pass-through target: {} (from {})", target, self.source("pass_proxy")),
            None => debug!("  Pass-through target: none"),
        }

        info!("  Print log: {}, print summary: {}", self.print_log(), self.print_summary());

        if let Some(file) = self.config_file() {
            info!("  Configuration file: {}", file.display());
        }

        info!("=====================");
    }
}
