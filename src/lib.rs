//! Conn Proxy: a small forwarding HTTP proxy
//!
//! This library implements a TCP proxy that accepts HTTP/1.x clients, opens a raw TCP
//! connection to the destination each request names and relays bytes in both directions.
//!
//! # Main Features
//!
//! - `CONNECT` tunnels and plain request forwarding
//! - Fixed-target pass-through mode without any HTTP parsing
//! - Exact-match client allow list
//! - Strict bound on concurrently handled connections
//! - Per-connection fault isolation
//!
//! # Example
//!
//! ```no_run
//! use conn_proxy::{Proxy, Result};
//! use conn_proxy::config::{ConfigBuilder, ConfigurationProvider};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ConfigBuilder::default().load_config()?;
//!
//!     let proxy = Proxy::bind(Arc::new(config)).await?;
//!     proxy.run().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod proxy;

// Re-export commonly used structures and functions for convenience
pub use proxy::Proxy;
pub use config::ProxyConfig;
pub use common::{ProxyError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
