//! Client access control
//!
//! Exact-match allow list on the client host. No wildcards, no CIDR ranges.

use std::collections::HashSet;

use crate::common::net::strip_port;
use crate::config::defaults::{ALLOW_ALL, LOOPBACK_HOSTS};

/// Response written to clients whose host is not on the allow list
pub const DENY_RESPONSE: &[u8] = b"HTTP/1.1 403 Forbidden \r\nServer: JProxy-1.0 \r\nContent-Type: text/html \r\nConnection:keep-alive \r\nContent-Length: 13 \r\n\r\n Deny access.";

/// Decides whether a remote address may use the proxy
#[derive(Debug, Clone)]
pub struct AccessController {
    /// `None` when every host is allowed
    allowed: Option<HashSet<String>>,
}

impl AccessController {
    /// Build the controller from an allow-list specification
    ///
    /// `*` (surrounding whitespace ignored) allows everyone. Otherwise the string is split on
    /// commas and every token is added verbatim next to the loopback literals.
    pub fn new(allow_list: &str) -> Self {
        if allow_list.trim() == ALLOW_ALL {
            return Self { allowed: None };
        }

        let mut allowed: HashSet<String> = LOOPBACK_HOSTS.iter().map(|h| h.to_string()).collect();
        if !allow_list.is_empty() {
            allowed.extend(allow_list.split(',').map(str::to_string));
        }

        Self { allowed: Some(allowed) }
    }

    /// Whether the access check is bypassed entirely
    pub fn allows_all(&self) -> bool {
        self.allowed.is_none()
    }

    /// Check a remote address of the form `host:port`
    pub fn is_allowed(&self, remote_addr: &str) -> bool {
        let Some(allowed) = &self.allowed else {
            return true;
        };

        allowed.contains(strip_port(remote_addr))
    }
}
