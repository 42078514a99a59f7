//! Wire envelopes for inbound client messages and outbound results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RoutingError;

/// Message kind strings accepted from clients.
pub struct Kinds;

impl Kinds {
    pub const JOIN: &str = "join";
    pub const LEAVE: &str = "leave";
    pub const CHAT: &str = "chat";
    /// Accepted alias for [`Kinds::CHAT`], kept for wire compatibility.
    pub const ALL: &str = "all";
    pub const DIRECT: &str = "to";
}

/// Event kind names carried on outbound envelopes.
pub struct Events;

impl Events {
    /// Sent to a connection right after the transport assigns its identifier.
    pub const CONNECTED: &str = "connected";
    /// Join acknowledgement, sent to the joining connection only.
    pub const JOINED: &str = "joined";
    /// Broadcast to the remaining members of a room after a departure.
    pub const ROOM_LEFT: &str = "room-left";
    /// Room-scoped chat fan-out.
    pub const CHAT: &str = "chat";
    /// Direct message to a single connection.
    pub const DIRECT: &str = "to";
}

/// Raw inbound envelope as it appears on the wire:
/// `{ kind, roomId?, targetId?, payload? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// A validated inbound message.
///
/// Conversion from [`InboundEnvelope`] is the single place unknown kinds and
/// missing fields are rejected; the router dispatches on this enum
/// exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Join { room_id: String },
    Leave { room_id: String },
    Chat { room_id: String, payload: Option<Value> },
    Direct { target_id: String, payload: Option<Value> },
}

impl InboundMessage {
    /// Validate a wire envelope into a typed message.
    pub fn from_envelope(env: InboundEnvelope) -> Result<Self, RoutingError> {
        fn require_room(room: Option<String>, kind: &str) -> Result<String, RoutingError> {
            room.filter(|r| !r.is_empty())
                .ok_or_else(|| RoutingError::MissingRoomId { kind: kind.to_string() })
        }

        match env.kind.as_str() {
            Kinds::JOIN => Ok(Self::Join {
                room_id: require_room(env.room_id, Kinds::JOIN)?,
            }),
            Kinds::LEAVE => Ok(Self::Leave {
                room_id: require_room(env.room_id, Kinds::LEAVE)?,
            }),
            Kinds::CHAT | Kinds::ALL => Ok(Self::Chat {
                room_id: require_room(env.room_id, Kinds::CHAT)?,
                payload: env.payload,
            }),
            Kinds::DIRECT => Ok(Self::Direct {
                target_id: env
                    .target_id
                    .filter(|t| !t.is_empty())
                    .ok_or(RoutingError::MissingTargetId)?,
                payload: env.payload,
            }),
            _ => Err(RoutingError::UnrecognizedKind { kind: env.kind }),
        }
    }
}

/// Outcome marker on every outbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Success,
    Fail,
}

/// Outbound envelope: `{ status, kind?, reason?, payload? }`.
///
/// Sent back to the originating connection and/or fanned out to room members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl OutboundEnvelope {
    pub fn success(kind: &str) -> Self {
        Self {
            status: DeliveryStatus::Success,
            kind: Some(kind.into()),
            reason: None,
            payload: None,
        }
    }

    pub fn fail(error: &RoutingError) -> Self {
        Self {
            status: DeliveryStatus::Fail,
            kind: None,
            reason: Some(error.reason().into()),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }
}
