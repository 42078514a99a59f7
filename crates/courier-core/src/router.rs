//! Router — validates inbound envelopes and computes delivery.
//!
//! Each room operation is a single critical section over the shared routing
//! state: read membership, apply the mutation, snapshot the recipient set.
//! Sends happen strictly after the lock is released, through the
//! [`Delivery`] seam, and fan-out failures are isolated per recipient.

use std::sync::Arc;

use courier_protocol::{
    ConnectionId, Events, InboundEnvelope, InboundMessage, OutboundEnvelope, RoutingError,
};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;
use crate::rooms::RoomTable;

/// Transport seam: enqueue an envelope for one connection.
///
/// Implementations must not block. The router calls this while fanning out
/// to many recipients, and a slow peer must only back up its own queue.
pub trait Delivery: Send + Sync + 'static {
    fn deliver(&self, target: &str, envelope: &OutboundEnvelope) -> Result<(), RoutingError>;
}

/// Router tuning knobs.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Echo room chat back to its sender. Standard chat-room semantics;
    /// turn off for clients that render their own messages locally.
    pub echo_chat_to_sender: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            echo_chat_to_sender: true,
        }
    }
}

pub struct Router {
    registry: ConnectionRegistry,
    rooms: RoomTable,
    delivery: Arc<dyn Delivery>,
    config: RouterConfig,
}

impl Router {
    pub fn new(
        registry: ConnectionRegistry,
        rooms: RoomTable,
        delivery: Arc<dyn Delivery>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            rooms,
            delivery,
            config,
        }
    }

    /// Entry point for one raw text frame from `sender`.
    ///
    /// Parse and validation failures are answered with a `fail` envelope;
    /// nothing here propagates as a process-level fault.
    pub fn handle_text(&self, sender: &str, raw: &str) {
        let envelope = match serde_json::from_str::<InboundEnvelope>(raw) {
            Ok(env) => env,
            Err(e) => {
                self.reject(
                    sender,
                    &RoutingError::MalformedEnvelope {
                        detail: e.to_string(),
                    },
                );
                return;
            }
        };
        match InboundMessage::from_envelope(envelope) {
            Ok(message) => self.dispatch(sender, message),
            Err(e) => self.reject(sender, &e),
        }
    }

    /// Dispatch a validated message from `sender`.
    pub fn dispatch(&self, sender: &str, message: InboundMessage) {
        match message {
            InboundMessage::Join { room_id } => self.handle_join(sender, &room_id),
            InboundMessage::Leave { room_id } => self.handle_leave(sender, &room_id),
            InboundMessage::Chat { room_id, payload } => {
                self.handle_chat(sender, &room_id, payload)
            }
            InboundMessage::Direct { target_id, payload } => {
                self.handle_direct(sender, &target_id, payload)
            }
        }
    }

    fn handle_join(&self, sender: &str, room: &str) {
        match self.rooms.join(room, sender) {
            Ok(_) => {
                // The join ack stays local to the joining connection.
                let ack = OutboundEnvelope::success(Events::JOINED)
                    .with_payload(json!({ "roomId": room }));
                self.send_to(sender, &ack);
            }
            Err(e) => self.reject(sender, &e),
        }
    }

    fn handle_leave(&self, sender: &str, room: &str) {
        match self.rooms.leave(room, sender) {
            Ok(Some(remaining)) => self.notify_room_left(room, sender, &remaining),
            // Not a member: success with nothing to announce.
            Ok(None) => {}
            Err(e) => self.reject(sender, &e),
        }
    }

    /// Broadcast a departure to the members still in the room. The departed
    /// connection is never in `remaining`, so it is excluded by construction.
    pub fn notify_room_left(&self, room: &str, departed: &str, remaining: &[ConnectionId]) {
        if remaining.is_empty() {
            return;
        }
        let event = OutboundEnvelope::success(Events::ROOM_LEFT)
            .with_payload(json!({ "roomId": room, "connectionId": departed }));
        self.fan_out(remaining, &event);
    }

    fn handle_chat(&self, sender: &str, room: &str, payload: Option<Value>) {
        // Membership check and recipient set come from one snapshot of the
        // table, so no partially-applied join/leave is observable here.
        let members = self.rooms.members_of(room);
        if !members.iter().any(|m| m == sender) {
            self.reject(
                sender,
                &RoutingError::NotAMember {
                    room: room.to_string(),
                },
            );
            return;
        }

        let event = OutboundEnvelope::success(Events::CHAT).with_payload(json!({
            "roomId": room,
            "sender": sender,
            "body": payload.unwrap_or(Value::Null),
        }));
        self.fan_out(
            members
                .iter()
                .filter(|m| self.config.echo_chat_to_sender || m.as_str() != sender),
            &event,
        );
    }

    fn handle_direct(&self, sender: &str, target: &str, payload: Option<Value>) {
        // Direct messages bypass room scoping; the target just has to exist.
        if !self.registry.contains(target) {
            self.reject(
                sender,
                &RoutingError::UnknownConnection {
                    id: target.to_string(),
                },
            );
            return;
        }
        let event = OutboundEnvelope::success(Events::DIRECT).with_payload(json!({
            "sender": sender,
            "body": payload.unwrap_or(Value::Null),
        }));
        self.send_to(target, &event);
    }

    /// Per-recipient independent fan-out: one failed delivery is logged and
    /// never aborts the rest.
    fn fan_out<'a, I>(&self, recipients: I, envelope: &OutboundEnvelope)
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        let mut failed = 0usize;
        for recipient in recipients {
            if let Err(e) = self.delivery.deliver(recipient, envelope) {
                failed += 1;
                warn!(target = %recipient, error = %e, "delivery failed during fan-out");
            }
        }
        if failed > 0 {
            debug!(failed, "fan-out completed with failures");
        }
    }

    /// Convert an error into a `fail` envelope for the originating
    /// connection.
    fn reject(&self, sender: &str, error: &RoutingError) {
        debug!(connection = %sender, reason = error.reason(), "rejected inbound message");
        self.send_to(sender, &OutboundEnvelope::fail(error));
    }

    fn send_to(&self, target: &str, envelope: &OutboundEnvelope) {
        if let Err(e) = self.delivery.deliver(target, envelope) {
            warn!(target = %target, error = %e, "delivery failed");
        }
    }
}
