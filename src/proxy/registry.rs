//! Active connection registry
//!
//! Tracks which remote addresses currently have a connection open. The map is owned by a
//! single long-lived task; the accept path and connection teardown talk to it through
//! [`RegistryHandle`].

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};

use super::message::{create_channel, AddressSnapshot, RegistryMessage};

/// The registry task state
pub struct ConnectionRegistry {
    records: AddressSnapshot,
    receiver: mpsc::UnboundedReceiver<RegistryMessage>,
}

impl ConnectionRegistry {
    /// Start the registry task and return a handle to it
    ///
    /// The task runs until every handle (and every outstanding [`RegistryEntry`]) is dropped.
    pub fn spawn() -> RegistryHandle {
        let (sender, receiver) = create_channel();
        let registry = Self {
            records: AddressSnapshot::new(),
            receiver,
        };
        tokio::spawn(registry.run());
        RegistryHandle { sender }
    }

    async fn run(mut self) {
        while let Some(message) = self.receiver.recv().await {
            self.apply(message);
        }
        debug!("Connection registry stopped");
    }

    fn apply(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::Register(addr) => {
                *self.records.entry(addr).or_insert(0) += 1;
            }
            RegistryMessage::Remove(addr) => {
                debug!("removeIpPort= {}", addr);
                // Teardown clears the whole record for the address
                self.records.remove(&addr);
            }
            RegistryMessage::Snapshot(reply) => {
                let _ = reply.send(self.records.clone());
            }
        }
    }
}

/// Cloneable handle to the registry task
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::UnboundedSender<RegistryMessage>,
}

impl RegistryHandle {
    /// Record a sighting of `addr`
    ///
    /// The returned entry sends the removal notification when it is dropped, so every
    /// registered address is removed exactly once no matter how the connection ends.
    pub fn register(&self, addr: &str) -> RegistryEntry {
        self.send(RegistryMessage::Register(addr.to_string()));
        RegistryEntry {
            addr: addr.to_string(),
            handle: self.clone(),
        }
    }

    /// Current records, or an empty map if the registry task is gone
    pub async fn snapshot(&self) -> AddressSnapshot {
        let (reply, response) = oneshot::channel();
        self.send(RegistryMessage::Snapshot(reply));
        response.await.unwrap_or_default()
    }

    fn send(&self, message: RegistryMessage) {
        if let Err(e) = self.sender.send(message) {
            warn!("Connection registry is not running, dropped {:?}", e.0);
        }
    }
}

/// Presence of one connection in the registry
#[derive(Debug)]
pub struct RegistryEntry {
    addr: String,
    handle: RegistryHandle,
}

impl RegistryEntry {
    /// Remote address this entry was registered for
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Drop for RegistryEntry {
    fn drop(&mut self) {
        self.handle.send(RegistryMessage::Remove(std::mem::take(&mut self.addr)));
    }
}
