//! Connection handler module
//!
//! Runs the per-connection state machine once a connection has been admitted:
//! read the request (unless in pass-through mode), dial the origin, acknowledge or forward,
//! then relay until both directions stop.

use std::fmt;
use std::time::Duration;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use crate::common::{ProxyError, Result};
use crate::config::ProxyConfig;
use super::forwarder::{proxy_data, Deadlines, RelaySummary};
use super::request::{read_request, ProxyRequest};

/// Banner written to the client once a CONNECT tunnel is dialed
pub const CONNECT_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

const FAR_FUTURE_SECS: u64 = 30 * 365 * 24 * 60 * 60;

/// Lifecycle of a handled connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Accepted by the listener
    Accepted,
    /// Holding an admission token
    Admitted,
    /// Both relay directions running
    Relaying,
    /// Torn down
    Closed,
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Admitted => write!(f, "admitted"),
            Self::Relaying => write!(f, "relaying"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// How the tunnel was set up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelMode {
    /// CONNECT request acknowledged with the established banner
    Connect,
    /// Plain request forwarded verbatim to the origin
    Forward,
    /// Fixed target, no HTTP parsing
    PassThrough,
}

impl fmt::Display for TunnelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Forward => write!(f, "forward"),
            Self::PassThrough => write!(f, "pass-through"),
        }
    }
}

/// Outcome of a tunnel that reached the relay stage
#[derive(Debug)]
pub struct TunnelOutcome {
    /// Tunnel mode
    pub mode: TunnelMode,
    /// Dialed origin
    pub target: String,
    /// Relay completion reports
    pub relay: RelaySummary,
}

/// Handle a single admitted client connection
///
/// # Parameters
///
/// * `client_stream` - Client TCP stream
/// * `remote` - Client address, used for log lines
/// * `config` - Proxy configuration
///
/// # Returns
///
/// Returns the relay outcome, or the error that aborted the connection before relaying.
/// The client stream is closed in every case when this returns.
pub async fn handle_connection(
    client_stream: TcpStream,
    remote: &str,
    config: &ProxyConfig,
) -> Result<TunnelOutcome> {
    run_tunnel(client_stream, remote, config, |target| async move {
        TcpStream::connect(target).await
    })
    .await
}

/// State machine behind [`handle_connection`], generic over the client stream and dialer
pub async fn run_tunnel<C, O, D, F>(
    mut client: C,
    remote: &str,
    config: &ProxyConfig,
    dial: D,
) -> Result<TunnelOutcome>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    O: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    D: FnOnce(String) -> F,
    F: std::future::Future<Output = std::io::Result<O>>,
{
    let limit = config.timeout_duration();

    // Set once, never refreshed: bounds the whole connection, not idle time
    let client_deadline = deadline_after(limit);
    transition(remote, TunnelState::Accepted, TunnelState::Admitted);

    let (mode, target, request) = match config.pass_proxy() {
        Some(target) => (TunnelMode::PassThrough, target.to_string(), None),
        None => {
            let request = timeout_at(client_deadline, read_request(&mut client))
                .await
                .map_err(|_| ProxyError::DeadlineExceeded)??;
            debug!(
                "Request Build,host= {:?},URL= {}",
                request.head().host,
                request.head().target
            );

            let target = request.dial_target()?;
            let mode = if request.is_connect() {
                TunnelMode::Connect
            } else {
                TunnelMode::Forward
            };
            (mode, target, Some(request))
        }
    };

    debug!("Call DialByTimeout:{}", target);
    let mut origin = match timeout(limit, dial(target.clone())).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(ProxyError::Dial { target, source }),
        Err(_) => return Err(ProxyError::DialTimeout(target)),
    };
    let origin_deadline = deadline_after(limit);

    if let Some(request) = &request {
        send_preamble(mode, request, &mut client, &mut origin, client_deadline, origin_deadline).await?;
    }

    transition(remote, TunnelState::Admitted, TunnelState::Relaying);
    let deadlines = Deadlines {
        client: client_deadline,
        origin: origin_deadline,
    };
    let relay = proxy_data(client, origin, deadlines, config.buffer_size()).await;
    transition(remote, TunnelState::Relaying, TunnelState::Closed);

    Ok(TunnelOutcome { mode, target, relay })
}

/// Write whatever has to reach a peer before relaying starts
///
/// CONNECT: the established banner to the client, then any bytes the client already sent
/// past the request head to the origin. Forward: the request as received, head and all.
async fn send_preamble<C, O>(
    mode: TunnelMode,
    request: &ProxyRequest,
    client: &mut C,
    origin: &mut O,
    client_deadline: Instant,
    origin_deadline: Instant,
) -> Result<()>
where
    C: AsyncWrite + Unpin,
    O: AsyncWrite + Unpin,
{
    match mode {
        TunnelMode::Connect => {
            write_before(client_deadline, client, CONNECT_ESTABLISHED).await?;
            debug!("WriteString:{}", "HTTP/1.1 200 Connection Established");
            if !request.remainder().is_empty() {
                write_before(origin_deadline, origin, request.remainder()).await?;
            }
        }
        TunnelMode::Forward => {
            write_before(origin_deadline, origin, request.raw()).await?;
            debug!("WriteRequestHeaders");
        }
        TunnelMode::PassThrough => {}
    }
    Ok(())
}

async fn write_before<W>(deadline: Instant, writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    timeout_at(deadline, async {
        writer.write_all(bytes).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| ProxyError::DeadlineExceeded)?
    .map_err(ProxyError::Io)
}

/// `now + limit`, saturating far in the future instead of overflowing
fn deadline_after(limit: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(limit)
        .unwrap_or_else(|| now + Duration::from_secs(FAR_FUTURE_SECS))
}

fn transition(remote: &str, from: TunnelState, to: TunnelState) {
    debug!("{}: {} -> {}", remote, from, to);
}
