//! Admission control
//!
//! Bounds the number of connections handled at the same time. Capacity is a counting
//! semaphore with `max_connections` permits; a permit wrapped in an [`AdmissionToken`] is
//! held for the whole life of a handled connection.
//!
//! Acquisition is timed: an arrival that gets no permit within the wait is rejected.
//! The bound is strict, admitted connections never exceed the configured maximum.

use std::sync::Arc;
use std::time::Duration;
use log::debug;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use super::stats::Counters;

/// Hands out admission tokens
#[derive(Debug, Clone)]
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    max_connections: usize,
    wait: Duration,
}

impl AdmissionController {
    /// Create a controller with `max_connections` slots and the given acquisition wait
    pub fn new(max_connections: usize, wait: Duration, counters: Arc<Counters>) -> Self {
        let max_connections = max_connections.min(Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(max_connections)),
            counters,
            max_connections,
            wait,
        }
    }

    /// Configured ceiling
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait up to the configured wait for a slot
    ///
    /// Returns `None` when the wait elapses; nothing is held in that case.
    pub async fn acquire(&self) -> Option<AdmissionToken> {
        match timeout(self.wait, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => {
                let in_flight = self.counters.enter();
                debug!("admitted, in flight {}/{}", in_flight, self.max_connections);
                Some(AdmissionToken {
                    _permit: permit,
                    counters: Arc::clone(&self.counters),
                })
            }
            // The semaphore is never closed; treat it like a timeout anyway
            Ok(Err(_)) | Err(_) => None,
        }
    }
}

/// One unit of admission capacity
///
/// Dropping the token releases the slot and decrements the in-flight counter, exactly once.
#[derive(Debug)]
pub struct AdmissionToken {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        let in_flight = self.counters.leave();
        debug!("release admission slot, in flight {}", in_flight);
        // The permit field is dropped after this, handing the slot back
    }
}
