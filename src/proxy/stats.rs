//! Connection counters and the periodic summary
//!
//! The periodic summary is the only observability surface besides ordinary log lines.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use log::info;
use tokio::task::JoinHandle;

use super::message::AddressSnapshot;
use super::registry::RegistryHandle;

/// Process-lifetime connection counters
#[derive(Debug, Default)]
pub struct Counters {
    total_accepted: AtomicU64,
    in_flight: AtomicUsize,
}

impl Counters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an accepted connection that passed the access check
    pub fn record_accepted(&self) -> u64 {
        self.total_accepted.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Total connections accepted since start
    pub fn total_accepted(&self) -> u64 {
        self.total_accepted.load(Ordering::Relaxed)
    }

    /// Connections currently being handled
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub(crate) fn enter(&self) -> usize {
        self.in_flight.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn leave(&self) -> usize {
        self.in_flight.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

/// Start the periodic summary task
///
/// Every `interval` it logs the total accepted count, the in-flight count and the full
/// active-address registry.
pub fn spawn_reporter(
    counters: Arc<Counters>,
    registry: RegistryHandle,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(report_every(counters, registry, interval, |line| info!("{}", line)))
}

/// Summary line for the given counters and registry snapshot
pub fn format_summary(counters: &Counters, addresses: &AddressSnapshot) -> String {
    format!(
        "Sum Process Count -> {}, Current Process Count -> {}, Current Link Address list -> {:?}",
        counters.total_accepted(),
        counters.in_flight(),
        addresses
    )
}

async fn report_every<F>(
    counters: Arc<Counters>,
    registry: RegistryHandle,
    interval: Duration,
    mut emit: F,
) where
    F: FnMut(String),
{
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    loop {
        ticker.tick().await;
        let addresses = registry.snapshot().await;
        emit(format_summary(&counters, &addresses));
    }
}
