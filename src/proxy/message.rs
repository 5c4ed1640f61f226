//! Connection registry messages
//!
//! Every change to the registry travels through one channel, so the registry task is
//! the only code that ever touches the address map.

use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};

/// Active-address snapshot: remote address -> number of sightings
pub type AddressSnapshot = BTreeMap<String, usize>;

/// Messages that can be sent to the registry task
#[derive(Debug)]
pub enum RegistryMessage {
    /// A connection from this remote address was accepted
    Register(String),
    /// A connection from this remote address was torn down
    Remove(String),
    /// Report the current records
    Snapshot(oneshot::Sender<AddressSnapshot>),
}

/// Create a new registry message channel
///
/// Unbounded so that teardown (which runs in `Drop`) can always notify without waiting.
pub fn create_channel() -> (mpsc::UnboundedSender<RegistryMessage>, mpsc::UnboundedReceiver<RegistryMessage>) {
    mpsc::unbounded_channel()
}
