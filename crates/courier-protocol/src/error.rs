//! Routing error taxonomy and wire reason strings.

use thiserror::Error;

/// Errors produced by the registry, room table, and router.
///
/// Every variant maps to a stable reason string carried on `fail` envelopes.
/// None of these escape the router as process-level faults; they are
/// converted into a `fail` envelope for the originating connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// The transport reported a connect for an identifier already tracked.
    #[error("connection {id} is already registered")]
    DuplicateConnection { id: String },

    /// The referenced connection is not registered.
    #[error("connection {id} is not registered")]
    UnknownConnection { id: String },

    /// The sender is not a member of the room it tried to address.
    #[error("not a member of room {room}")]
    NotAMember { room: String },

    /// The inbound envelope carried a kind the router does not understand.
    #[error("unrecognized message kind {kind:?}")]
    UnrecognizedKind { kind: String },

    /// A room-scoped kind arrived without a room identifier.
    #[error("message kind {kind:?} requires a roomId")]
    MissingRoomId { kind: String },

    /// A direct message arrived without a target identifier.
    #[error("direct messages require a targetId")]
    MissingTargetId,

    /// The inbound frame could not be parsed into an envelope.
    #[error("malformed envelope: {detail}")]
    MalformedEnvelope { detail: String },

    /// Delivery to a single recipient failed. Non-fatal: fan-out continues
    /// with the remaining recipients.
    #[error("delivery to {target} failed")]
    DeliveryFailed { target: String },
}

impl RoutingError {
    /// Stable reason string carried on `fail` envelopes.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::DuplicateConnection { .. } => "duplicate-connection",
            Self::UnknownConnection { .. } => "not-connected",
            Self::NotAMember { .. } => "not-a-member",
            Self::UnrecognizedKind { .. } => "unrecognized-kind",
            Self::MissingRoomId { .. } => "missing-room-id",
            Self::MissingTargetId => "missing-target-id",
            Self::MalformedEnvelope { .. } => "malformed-envelope",
            Self::DeliveryFailed { .. } => "delivery-failed",
        }
    }
}
