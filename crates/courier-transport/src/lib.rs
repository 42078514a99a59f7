//! Courier transport layer.
//!
//! WebSocket transport for the routing core. The transport owns:
//! - connection identity (one uuid per socket, assigned at connect time)
//! - the per-connection outbound queues the core delivers through
//! - heartbeat pings and disconnect-cause classification
//! - the HTTP surface (websocket upgrade + health)
//!
//! It is decoupled from the core through the `Delivery` trait: the core
//! enqueues envelopes, and each connection's own task writes its socket.

pub mod senders;
pub mod server;

pub use senders::SenderTable;
pub use server::{TransportConfig, TransportServer};
