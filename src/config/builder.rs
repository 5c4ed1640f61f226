//! Configuration builder
//!
//! This module provides a builder pattern for constructing configuration.

use std::path::Path;
use log::debug;

use crate::config::types::{ProxyConfig, ConfigValues};
use crate::config::source::{ConfigSource, DefaultSource, FileSource, EnvSource, CliSource};
use crate::config::traits::ConfigurationProvider;
use crate::config::validator::validate_config;
use crate::config::error::Result;
use crate::config::{ENV_PREFIX, DEFAULT_CONFIG_FILE};

/// Configuration builder
///
/// Provides a fluent API for building configuration from multiple sources.
/// Sources are applied in the order they are added, later ones winning.
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource + Send + Sync>>,
    validate: bool,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            validate: true,
        }
    }

    /// Add default source
    pub fn with_defaults(mut self) -> Self {
        debug!("Adding default configuration source");
        self.sources.push(Box::new(DefaultSource));
        self
    }

    /// Add file source
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        debug!("Adding file configuration source: {}", path.display());
        self.sources.push(Box::new(FileSource::new(path)));
        self
    }

    /// Add environment source
    pub fn with_env(mut self, prefix: &str) -> Self {
        debug!("Adding environment configuration source with prefix: {}", prefix);
        self.sources.push(Box::new(EnvSource::new(prefix)));
        self
    }

    /// Add command line source
    pub fn with_cli(mut self, values: ConfigValues) -> Self {
        debug!("Adding command line configuration source");
        self.sources.push(Box::new(CliSource::new(values)));
        self
    }

    /// Disable validation
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }

    /// Build the configuration
    pub fn build(&self) -> Result<ProxyConfig> {
        // Start with an empty configuration (without defaults)
        let mut config = ProxyConfig::from_values(ConfigValues::default());

        debug!("Building configuration from {} sources", self.sources.len());

        // Apply sources in order (lowest to highest priority)
        for source in &self.sources {
            let source_type = source.source_type();
            debug!("Loading configuration from source: {:?}", source_type);

            let source_config = source.load()?;
            config = config.merge(&source_config, source_type);
        }

        // Apply default values for any fields that are still None
        config.set_default_values();

        if self.validate {
            debug!("Validating configuration");
            validate_config(&config)?;
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
            .with_defaults()
            .with_file(DEFAULT_CONFIG_FILE)
            .with_env(ENV_PREFIX)
    }
}

impl ConfigurationProvider for ConfigBuilder {
    fn load_config(&self) -> crate::common::Result<ProxyConfig> {
        Ok(self.build()?)
    }
}
