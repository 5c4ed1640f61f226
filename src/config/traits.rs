//! Configuration traits

use crate::common::Result;
use crate::config::types::ProxyConfig;

/// Something that can produce the proxy configuration for a run
///
/// Callers treat a failure as non-fatal: they log it and continue with
/// `ProxyConfig::default()`.
pub trait ConfigurationProvider {
    /// Load, merge and validate the configuration
    fn load_config(&self) -> Result<ProxyConfig>;
}
