//! Proxy server module
//!
//! Owns the listening socket and the accept loop: access check, registry bookkeeping,
//! admission, then one isolated task per admitted connection.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

use crate::common::log::panic_message;
use crate::common::{ProxyError, Result};
use crate::config::defaults::SUMMARY_INTERVAL_SECS;
use crate::config::ProxyConfig;
use super::access::{AccessController, DENY_RESPONSE};
use super::admission::{AdmissionController, AdmissionToken};
use super::handler::handle_connection;
use super::registry::{ConnectionRegistry, RegistryEntry, RegistryHandle};
use super::stats::{spawn_reporter, Counters};

const LISTEN_BACKLOG: u32 = 1024;

/// Pause after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Proxy server structure
///
/// Created bound, so the listening address is known before [`Proxy::run`] starts
/// accepting.
pub struct Proxy {
    /// Bound listener
    listener: TcpListener,
    /// Proxy configuration (wrapped in Arc for efficient sharing)
    config: Arc<ProxyConfig>,
    access: AccessController,
    admission: AdmissionController,
    registry: RegistryHandle,
    counters: Arc<Counters>,
    reporter: Option<JoinHandle<()>>,
}

impl Proxy {
    /// Bind the listening socket and start the background tasks
    ///
    /// # Parameters
    ///
    /// * `config` - Proxy configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the listen address cannot be resolved or bound.
    pub async fn bind(config: Arc<ProxyConfig>) -> Result<Self> {
        let listen_addr = config.listen_addr();
        let addr = lookup_host(&listen_addr)
            .await?
            .next()
            .ok_or_else(|| ProxyError::Config(format!("Cannot resolve listen address {}", listen_addr)))?;

        let listener = listen(addr)?;
        info!("Proxy service listening on {}", listener.local_addr()?);

        let counters = Arc::new(Counters::new());
        let registry = ConnectionRegistry::spawn();
        let admission = AdmissionController::new(
            config.max_connections(),
            config.admission_wait(),
            Arc::clone(&counters),
        );

        let reporter = config.print_summary().then(|| {
            spawn_reporter(
                Arc::clone(&counters),
                registry.clone(),
                Duration::from_secs(SUMMARY_INTERVAL_SECS),
            )
        });

        Ok(Self {
            listener,
            access: AccessController::new(config.allow_ip()),
            admission,
            registry,
            counters,
            reporter,
            config,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared connection counters
    pub fn stats(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Handle to the active-address registry
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Run the accept loop
    ///
    /// Never returns on its own; accept errors are logged and retried after a short pause.
    /// Admission is awaited in the loop, so a saturated proxy stops accepting until a slot
    /// frees up or the arrival gives up waiting.
    pub async fn run(self) -> Result<()> {
        let mut tasks = JoinSet::new();

        let listener = &self.listener;

        loop {
            let (client_stream, client_addr) = next_connection(|| listener.accept(), &mut tasks).await;
            let remote = client_addr.to_string();

            if !self.access.is_allowed(&remote) {
                info!("disallow->{}", remote);
                tasks.spawn(deny(client_stream, remote));
                continue;
            }

            let entry = self.registry.register(&remote);
            let total = self.counters.record_accepted();
            debug!("Accepted connection #{} from {}", total, remote);

            let Some(token) = self.admission.acquire().await else {
                info!("timeout conn {}", remote);
                // Dropping the stream closes it; dropping the entry removes the address
                drop(client_stream);
                drop(entry);
                continue;
            };

            let guard = ConnectionGuard { _token: token, _entry: entry };
            let config = Arc::clone(&self.config);
            tasks.spawn(async move {
                let _guard = guard;
                isolate(&remote, serve(client_stream, &remote, &config)).await;
            });
        }
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        if let Some(reporter) = self.reporter.take() {
            reporter.abort();
        }
    }
}

/// Resources held for the life of one admitted connection
///
/// Released exactly once when the connection task ends, including by panic.
struct ConnectionGuard {
    _token: AdmissionToken,
    _entry: RegistryEntry,
}

/// Wait for the next accepted connection, reaping finished connection tasks meanwhile
async fn next_connection<A, F, T>(mut accept: A, tasks: &mut JoinSet<()>) -> T
where
    A: FnMut() -> F,
    F: Future<Output = io::Result<T>>,
{
    loop {
        tokio::select! {
            Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = result {
                    error!("Connection task error: {}", e);
                }
            }
            accepted = accept() => match accepted {
                Ok(accepted) => return accepted,
                Err(e) => {
                    // Typically descriptor exhaustion
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}

fn listen(addr: SocketAddr) -> Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.set_nodelay(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?)
}

async fn deny(mut stream: TcpStream, remote: String) {
    if let Err(e) = stream.write_all(DENY_RESPONSE).await {
        debug!("deny response to {} not delivered: {}", remote, e);
    }
    let _ = stream.shutdown().await;
}

async fn serve(client_stream: TcpStream, remote: &str, config: &ProxyConfig) {
    match handle_connection(client_stream, remote, config).await {
        Ok(outcome) => debug!(
            "{} {} -> {} closed, {} bytes up, {} bytes down",
            outcome.mode,
            remote,
            outcome.target,
            outcome.relay.bytes_up(),
            outcome.relay.bytes_down()
        ),
        Err(e) if e.is_protocol() => debug!("{}: {}", remote, e),
        Err(e) if e.is_dial() => warn!("{}: {}", remote, e),
        Err(e) => info!("{}: {}", remote, e),
    }
}

/// Run `work`, containing any panic to this connection
///
/// Returns `false` if the work panicked.
async fn isolate<F>(remote: &str, work: F) -> bool
where
    F: Future<Output = ()>,
{
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(()) => true,
        Err(payload) => {
            error!("##Recover Info:## connection {} panicked: {}", remote, panic_message(&*payload));
            false
        }
    }
}
