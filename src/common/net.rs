//! Network utility functions
//!
//! Helpers for the `host:port` strings that flow through the proxy.

/// Strip the trailing `:port` from a remote address string
///
/// Works on the textual form produced by `SocketAddr::to_string`, so IPv6 hosts keep their
/// brackets (`[::1]:5000` becomes `[::1]`). A string without a colon is returned unchanged.
pub fn strip_port(addr: &str) -> &str {
    match addr.rfind(':') {
        Some(i) => &addr[..i],
        None => addr,
    }
}

/// Whether a `host[:port]` string already names a port
pub fn has_port(host: &str) -> bool {
    if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6 literal: a port can only follow the closing bracket
        return match rest.find(']') {
            Some(end) => rest[end + 1..].starts_with(':'),
            None => false,
        };
    }

    match host.rfind(':') {
        // Bare IPv6 literal (more than one colon) carries no port
        Some(_) if host.matches(':').count() > 1 => false,
        Some(_) => true,
        None => false,
    }
}

/// Append `:default_port` when `host` has no port of its own
pub fn with_default_port(host: &str, default_port: u16) -> String {
    if has_port(host) {
        host.to_string()
    } else if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, default_port)
    } else {
        format!("{}:{}", host, default_port)
    }
}

/// Split a `host:port` string, requiring a numeric port
pub fn split_host_port(addr: &str) -> Option<(&str, u16)> {
    let i = addr.rfind(':')?;
    let host = &addr[..i];
    let port = addr[i + 1..].parse::<u16>().ok()?;
    if host.is_empty() {
        return None;
    }
    Some((host, port))
}
