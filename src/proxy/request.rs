//! HTTP/1.x request head parsing
//!
//! Only the request line and headers are interpreted. The raw bytes are kept so the head can
//! be forwarded to the origin exactly as the client sent it.

use bytes::BytesMut;
use log::trace;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::net::with_default_port;
use crate::common::{ProxyError, Result};
use crate::config::defaults::HTTP_PORT;

/// Largest accepted request head (request line plus headers)
pub const MAX_REQUEST_HEAD: usize = 64 * 1024;

/// Maximum number of headers to parse
const MAX_HEADERS: usize = 100;

const READ_CHUNK: usize = 4096;

/// Interpreted part of a request head
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method
    pub method: String,
    /// Request target as sent (origin-form, absolute-form or authority-form)
    pub target: String,
    /// Minor HTTP version (0 or 1)
    pub version: u8,
    /// `Host` header value, if present
    pub host: Option<String>,
    /// Bytes taken by the request line and headers, including the blank line
    pub head_len: usize,
}

/// A parsed request together with everything read from the client so far
#[derive(Debug)]
pub struct ProxyRequest {
    head: RequestHead,
    buffer: BytesMut,
}

impl ProxyRequest {
    /// Parsed request line and headers
    pub fn head(&self) -> &RequestHead {
        &self.head
    }

    /// Request method
    pub fn method(&self) -> &str {
        &self.head.method
    }

    /// Whether this is a CONNECT tunnel request
    pub fn is_connect(&self) -> bool {
        self.head.method == "CONNECT"
    }

    /// Destination authority (`host[:port]`) named by the request
    ///
    /// CONNECT carries it as the request target, absolute-form targets carry it in the URI,
    /// anything else falls back to the `Host` header.
    pub fn authority(&self) -> Option<&str> {
        let authority = if self.is_connect() {
            Some(self.head.target.as_str())
        } else if let Some(authority) = uri_authority(&self.head.target) {
            Some(authority)
        } else {
            self.head.host.as_deref()
        };

        authority.map(str::trim).filter(|a| !a.is_empty())
    }

    /// `host:port` to dial, with port 80 filled in when the request names none
    pub fn dial_target(&self) -> Result<String> {
        self.authority()
            .map(|authority| with_default_port(authority, HTTP_PORT))
            .ok_or(ProxyError::MissingHost)
    }

    /// Bytes the client sent after the head (body or early tunnel data)
    pub fn remainder(&self) -> &[u8] {
        &self.buffer[self.head.head_len..]
    }

    /// Everything read from the client so far
    pub fn raw(&self) -> &[u8] {
        &self.buffer
    }
}

/// Authority part of an absolute-form URI, without user info
fn uri_authority(target: &str) -> Option<&str> {
    let (_, rest) = target.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    Some(match authority.rfind('@') {
        Some(at) => &authority[at + 1..],
        None => authority,
    })
}

/// Try to parse a request head from the start of `buf`
///
/// Returns `Ok(None)` while the head is still incomplete.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(buf) {
        Ok(httparse::Status::Complete(head_len)) => {
            let host = req
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("host"))
                .map(|h| String::from_utf8_lossy(h.value).into_owned());

            Ok(Some(RequestHead {
                method: req.method.unwrap_or_default().to_string(),
                target: req.path.unwrap_or_default().to_string(),
                version: req.version.unwrap_or(1),
                host,
                head_len,
            }))
        }
        Ok(httparse::Status::Partial) => Ok(None),
        Err(e) => Err(ProxyError::MalformedRequest(e.to_string())),
    }
}

/// Read from `reader` until a full request head has arrived
///
/// Fails with [`ProxyError::IncompleteRequest`] if the client closes first and with
/// [`ProxyError::MalformedRequest`] if the bytes are not an HTTP/1.x request head or the head
/// grows past [`MAX_REQUEST_HEAD`].
pub async fn read_request<R>(reader: &mut R) -> Result<ProxyRequest>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = BytesMut::with_capacity(READ_CHUNK);

    loop {
        if let Some(head) = parse_head(&buffer)? {
            trace!("request head complete after {} bytes", head.head_len);
            return Ok(ProxyRequest { head, buffer });
        }

        if buffer.len() >= MAX_REQUEST_HEAD {
            return Err(ProxyError::MalformedRequest(format!(
                "request head exceeds {} bytes",
                MAX_REQUEST_HEAD
            )));
        }

        buffer.reserve(READ_CHUNK);
        if reader.read_buf(&mut buffer).await? == 0 {
            return Err(ProxyError::IncompleteRequest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read(bytes: &[u8]) -> Result<ProxyRequest> {
        let mut reader = bytes;
        read_request(&mut reader).await
    }

    #[tokio::test]
    async fn test_connect_target() {
        let req = read(b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n")
            .await
            .unwrap();
        assert!(req.is_connect());
        assert_eq!(req.dial_target().unwrap(), "example.com:443");
        assert!(req.remainder().is_empty());
    }

    #[tokio::test]
    async fn test_host_header_gets_default_port() {
        let req = read(b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n")
            .await
            .unwrap();
        assert!(!req.is_connect());
        assert_eq!(req.method(), "GET");
        assert_eq!(req.dial_target().unwrap(), "example.com:80");
    }

    #[tokio::test]
    async fn test_absolute_form_wins_over_host_header() {
        let req = read(b"GET http://user@origin.test:8080/a?b=c HTTP/1.1\r\nHost: other.test\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(req.dial_target().unwrap(), "origin.test:8080");
    }

    #[tokio::test]
    async fn test_ipv6_host_without_port() {
        let req = read(b"GET / HTTP/1.1\r\nHost: [::1]\r\n\r\n").await.unwrap();
        assert_eq!(req.dial_target().unwrap(), "[::1]:80");
    }

    #[tokio::test]
    async fn test_head_len_and_remainder() {
        let raw = b"POST /submit HTTP/1.0\r\nHost: a.test\r\nContent-Length: 5\r\n\r\nhello";
        let req = read(raw).await.unwrap();
        assert_eq!(req.head().version, 0);
        assert_eq!(req.head().head_len, raw.len() - 5);
        assert_eq!(req.remainder(), b"hello");
        assert_eq!(req.raw(), &raw[..]);
    }

    #[tokio::test]
    async fn test_missing_host() {
        let req = read(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        assert!(matches!(req.dial_target(), Err(ProxyError::MissingHost)));
    }

    #[tokio::test]
    async fn test_closed_before_complete() {
        let err = read(b"GET / HTTP/1.1\r\nHost: a").await.unwrap_err();
        assert!(matches!(err, ProxyError::IncompleteRequest));

        let err = read(b"").await.unwrap_err();
        assert!(matches!(err, ProxyError::IncompleteRequest));
    }

    #[tokio::test]
    async fn test_malformed() {
        let err = read(b"\x16\x03\x01\x02\x00\x01\x00\x01\xfc\x03\x03").await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));

        let err = read(b"GET / HTTP/2.0\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));
    }

    #[tokio::test]
    async fn test_oversized_head() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Fill: ".to_vec();
        raw.extend(std::iter::repeat(b'a').take(MAX_REQUEST_HEAD));
        let err = read(&raw).await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedRequest(_)));
    }
}
