//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

/// Connection proxy error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The client sent something that is not an HTTP/1.x request head
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// The client closed the connection before a full request head arrived
    #[error("Connection closed before a complete request was received")]
    IncompleteRequest,

    /// The request carries no usable destination host
    #[error("Request has no destination host")]
    MissingHost,

    /// Dialing the origin failed
    #[error("Failed to connect to {target}: {source}")]
    Dial {
        /// Dial target (host:port)
        target: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Dialing the origin did not complete in time
    #[error("Timed out connecting to {0}")]
    DialTimeout(String),

    /// The connection-wide deadline elapsed
    #[error("Connection deadline exceeded")]
    DeadlineExceeded,
}

impl ProxyError {
    /// Whether the error was caused by the client speaking something other than HTTP/1.x
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequest(_) | Self::IncompleteRequest | Self::MissingHost
        )
    }

    /// Whether the error happened while reaching the origin
    pub fn is_dial(&self) -> bool {
        matches!(self, Self::Dial { .. } | Self::DialTimeout(_))
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
