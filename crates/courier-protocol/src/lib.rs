//! Courier protocol types.
//!
//! Wire envelopes exchanged with clients, the routing error taxonomy, and
//! disconnect-cause classification. This crate is the single source of truth
//! for message kinds, event names, and failure reason strings.

pub mod envelope;
pub mod error;
pub mod lifecycle;

pub use envelope::{
    DeliveryStatus, Events, InboundEnvelope, InboundMessage, Kinds, OutboundEnvelope,
};
pub use error::RoutingError;
pub use lifecycle::DisconnectCause;

/// Opaque connection identifier, assigned by the transport at connect time.
pub type ConnectionId = String;

/// Externally supplied room name. Rooms are created implicitly on first join
/// and removed when their last member leaves.
pub type RoomId = String;
