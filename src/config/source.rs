//! Configuration sources
//!
//! This module defines traits and implementations for loading configuration
//! from different sources.

use std::path::{Path, PathBuf};
use std::fs;
use std::env;
use std::collections::HashMap;
use std::str::FromStr;
use log::{debug, warn};

use crate::config::types::{ProxyConfig, ConfigValues, ValueSource};
use crate::config::error::{ConfigError, Result};

/// Configuration source trait
pub trait ConfigSource {
    /// Load configuration from this source
    fn load(&self) -> Result<ProxyConfig>;

    /// Get the source type
    fn source_type(&self) -> ValueSource;
}

/// Record `source` for every field that is set in `config`
fn track_sources(config: &mut ProxyConfig, source: ValueSource) {
    let values = &config.values;
    let fields = [
        ("host", values.host.is_some()),
        ("port", values.port.is_some()),
        ("buffer_size", values.buffer_size.is_some()),
        ("max_connections", values.max_connections.is_some()),
        ("timeout", values.timeout.is_some()),
        ("allow_ip", values.allow_ip.is_some()),
        ("pass_proxy", values.pass_proxy.is_some()),
        ("print_log", values.print_log.is_some()),
        ("print_summary", values.print_summary.is_some()),
        ("log_level", values.log_level.is_some()),
    ];

    let mut sources = HashMap::new();
    for (name, has_value) in fields {
        if has_value {
            sources.insert(name.to_string(), source);
        }
    }
    config.sources = sources;
}

/// Default configuration source
pub struct DefaultSource;

impl ConfigSource for DefaultSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading default configuration");
        Ok(ProxyConfig::default())
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Default
    }
}

/// File configuration source (JSON)
pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    /// Create a new file source
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from file: {}", self.path.display());

        if !self.path.exists() {
            warn!("Configuration file not found: {}", self.path.display());
            warn!("Will use default values unless overridden by environment variables or command line arguments");
            return Ok(ProxyConfig::from_values(ConfigValues::default()));
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::FileReadError(self.path.clone(), e.to_string()))?;

        let values: ConfigValues = serde_json::from_str(&contents).map_err(|e| {
            ConfigError::ParseError(format!("Error parsing {}: {}", self.path.display(), e))
        })?;

        let mut config = ProxyConfig::from_values(values);
        config.config_file = Some(self.path.clone());
        track_sources(&mut config, self.source_type());

        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::File
    }
}

/// Environment variable configuration source
pub struct EnvSource {
    pub prefix: String,
}

impl EnvSource {
    /// Create a new environment source
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        env::var(format!("{}{}", self.prefix, name)).ok()
    }

    fn parsed<T: FromStr>(&self, name: &str) -> Option<T> {
        let value = self.var(name)?;
        match value.trim().parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                warn!("Invalid {}{} in environment: {}", self.prefix, name, value);
                None
            }
        }
    }

    fn flag(&self, name: &str) -> Option<bool> {
        let value = self.var(name)?;
        match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => {
                warn!("Invalid {}{} in environment: {}", self.prefix, name, value);
                None
            }
        }
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from environment variables with prefix: {}", self.prefix);

        let values = ConfigValues {
            host: self.var("HOST"),
            port: self.parsed("PORT"),
            buffer_size: self.parsed("BUFFER_SIZE"),
            max_connections: self.parsed("MAX_CONNECTIONS"),
            timeout: self.parsed("TIMEOUT"),
            allow_ip: self.var("ALLOW_IP"),
            pass_proxy: self.var("PASS_PROXY"),
            print_log: self.flag("PRINT_LOG"),
            print_summary: self.flag("PRINT_SUMMARY"),
            log_level: self.var("LOG_LEVEL"),
        };

        let mut config = ProxyConfig::from_values(values);
        track_sources(&mut config, self.source_type());
        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::Environment
    }
}

/// Command line configuration source
///
/// Holds the values already parsed by the CLI front-end.
pub struct CliSource {
    pub values: ConfigValues,
}

impl CliSource {
    /// Create a new command line source
    pub fn new(values: ConfigValues) -> Self {
        Self { values }
    }
}

impl ConfigSource for CliSource {
    fn load(&self) -> Result<ProxyConfig> {
        debug!("Loading configuration from command line arguments");

        let mut config = ProxyConfig::from_values(self.values.clone());
        track_sources(&mut config, self.source_type());
        Ok(config)
    }

    fn source_type(&self) -> ValueSource {
        ValueSource::CommandLine
    }
}
