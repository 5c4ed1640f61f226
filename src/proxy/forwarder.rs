//! Data forwarding module
//!
//! Relays bytes between the client and the origin in both directions. Each direction runs as
//! its own task and is bounded by the fixed deadlines of the two sockets it touches; the
//! relay only returns once both directions have stopped.

use std::fmt;
use std::io;
use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};

/// One of the two byte flows of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to origin
    Upstream,
    /// Origin to client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => write!(f, "read clientConn->write proDialConn"),
            Self::Downstream => write!(f, "read proDialConn->write clientConn"),
        }
    }
}

/// How a relay direction stopped
#[derive(Debug)]
pub enum DirectionEnd {
    /// The reading side reached end of stream
    Eof,
    /// A read or write failed
    Error(io::Error),
    /// A socket deadline elapsed
    Deadline,
    /// The copy task itself failed (panicked or was cancelled)
    Aborted,
}

impl fmt::Display for DirectionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "eof"),
            Self::Error(e) => write!(f, "error: {}", e),
            Self::Deadline => write!(f, "deadline"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Completion signal of one relay direction
#[derive(Debug)]
pub struct DirectionReport {
    /// Which way the bytes flowed
    pub direction: Direction,
    /// Bytes copied before stopping
    pub bytes: u64,
    /// Why the direction stopped
    pub end: DirectionEnd,
}

/// Both completion signals of a finished relay
#[derive(Debug, Default)]
pub struct RelaySummary {
    /// Client to origin report
    pub upstream: Option<DirectionReport>,
    /// Origin to client report
    pub downstream: Option<DirectionReport>,
}

impl RelaySummary {
    /// Bytes sent from client to origin
    pub fn bytes_up(&self) -> u64 {
        self.upstream.as_ref().map_or(0, |r| r.bytes)
    }

    /// Bytes sent from origin to client
    pub fn bytes_down(&self) -> u64 {
        self.downstream.as_ref().map_or(0, |r| r.bytes)
    }
}

/// Fixed deadlines of the two sockets of a tunnel
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    /// Client socket deadline
    pub client: Instant,
    /// Origin socket deadline
    pub origin: Instant,
}

/// Forward data between the client and the origin until both directions stop
///
/// # Parameters
///
/// * `client` - Client stream
/// * `origin` - Origin stream
/// * `deadlines` - Connection-wide deadlines, never refreshed by traffic
/// * `buffer_size` - Copy buffer size per direction
///
/// # Returns
///
/// The two completion reports. Both streams are closed when this returns.
pub async fn proxy_data<C, O>(
    client: C,
    origin: O,
    deadlines: Deadlines,
    buffer_size: usize,
) -> RelaySummary
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    O: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (origin_reader, origin_writer) = tokio::io::split(origin);

    let mut tasks = JoinSet::new();
    tasks.spawn(copy_direction(
        Direction::Upstream,
        client_reader,
        origin_writer,
        deadlines.client,
        deadlines.origin,
        buffer_size,
    ));
    tasks.spawn(copy_direction(
        Direction::Downstream,
        origin_reader,
        client_writer,
        deadlines.origin,
        deadlines.client,
        buffer_size,
    ));

    // Join point: wait for exactly two completion signals
    let mut summary = RelaySummary::default();
    let mut completed = 0;
    while let Some(result) = tasks.join_next().await {
        completed += 1;
        match result {
            Ok(report) => {
                debug!("{} end ({}, {} bytes)", report.direction, report.end, report.bytes);
                match report.direction {
                    Direction::Upstream => summary.upstream = Some(report),
                    Direction::Downstream => summary.downstream = Some(report),
                }
            }
            Err(e) => debug!("relay task failed: {}", e),
        }
        debug!("<-completedChan={}", completed);
    }

    for (slot, direction) in [
        (&mut summary.upstream, Direction::Upstream),
        (&mut summary.downstream, Direction::Downstream),
    ] {
        if slot.is_none() {
            *slot = Some(DirectionReport { direction, bytes: 0, end: DirectionEnd::Aborted });
        }
    }

    summary
}

/// Copy one direction until EOF, error or deadline
async fn copy_direction<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    read_deadline: Instant,
    write_deadline: Instant,
    buffer_size: usize,
) -> DirectionReport
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut bytes = 0u64;

    let end = loop {
        let n = match timeout_at(read_deadline, reader.read(&mut buffer)).await {
            Err(_) => break DirectionEnd::Deadline,
            Ok(Err(e)) => break DirectionEnd::Error(e),
            Ok(Ok(0)) => break DirectionEnd::Eof,
            Ok(Ok(n)) => n,
        };

        match timeout_at(write_deadline, writer.write_all(&buffer[..n])).await {
            Err(_) => break DirectionEnd::Deadline,
            Ok(Err(e)) => break DirectionEnd::Error(e),
            Ok(Ok(())) => bytes += n as u64,
        }
    };

    // Let the peer see end of stream; this side may already be broken
    close_quietly(&mut writer, write_deadline, direction).await;

    DirectionReport { direction, bytes, end }
}

/// Shut down a write side, swallowing and logging any failure
///
/// Safe to call on a stream that is already shut down or reset.
pub async fn close_quietly<W>(writer: &mut W, deadline: Instant, label: impl fmt::Display)
where
    W: AsyncWrite + Unpin,
{
    match timeout_at(deadline, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("close {} ignored: {}", label, e),
        Err(_) => debug!("close {} ignored: deadline", label),
    }
}
