//! Configuration module
//!
//! This module handles application configuration, including loading from
//! different sources (files, environment variables, command line arguments)
//! and validating the configuration.
//!
//! The resulting [`ProxyConfig`] is built once and handed to each component
//! by `Arc`; nothing in the proxy looks configuration up globally.

pub mod builder;
pub mod defaults;
pub mod error;
pub mod source;
pub mod traits;
pub mod types;
pub mod validator;

pub use self::builder::ConfigBuilder;
pub use self::error::ConfigError;
pub use self::source::{ConfigSource, DefaultSource, FileSource, EnvSource, CliSource};
pub use self::traits::ConfigurationProvider;
pub use self::types::{ConfigValues, ProxyConfig, ValueSource};
pub use self::validator::{check_warnings, validate_config};

// Export constants needed externally
pub use defaults::{ENV_PREFIX, DEFAULT_CONFIG_FILE, LOG_LEVEL_STR};
