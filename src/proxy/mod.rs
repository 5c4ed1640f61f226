//! Proxy service module
//!
//! The accept loop, admission control, the per-connection tunnel and the bidirectional relay.
//!
//! Shared state lives behind small owners: admission behind a semaphore, the active-address
//! registry behind its own task, counters behind atomics. Connection tasks only hold
//! tokens whose `Drop` releases what they took.

pub mod server;
pub mod access;
pub mod admission;
pub mod handler;
pub mod forwarder;
pub mod message;
pub mod registry;
pub mod request;
pub mod stats;

pub use server::Proxy;
pub use access::{AccessController, DENY_RESPONSE};
pub use admission::{AdmissionController, AdmissionToken};
pub use handler::{handle_connection, TunnelMode, TunnelOutcome, TunnelState, CONNECT_ESTABLISHED};
pub use forwarder::{proxy_data, Deadlines, Direction, DirectionEnd, RelaySummary};
pub use message::{AddressSnapshot, RegistryMessage};
pub use registry::{ConnectionRegistry, RegistryEntry, RegistryHandle};
pub use request::{read_request, ProxyRequest, RequestHead};
pub use stats::Counters;
