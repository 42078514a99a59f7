//! RoomTable — room membership over the registry's shared state.
//!
//! Rooms are implicit: created on first join, removed the moment the last
//! member leaves. The table is a facade over [`ConnectionRegistry`]'s state,
//! so the room index and each connection's membership set always change
//! together under one lock acquisition.

use courier_protocol::{ConnectionId, RoomId, RoutingError};
use tracing::debug;

use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct RoomTable {
    registry: ConnectionRegistry,
}

impl RoomTable {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Idempotent: joining a room already joined is a no-op success.
    /// Returns `true` when the connection was newly added.
    pub fn join(&self, room: &str, conn: &str) -> Result<bool, RoutingError> {
        let mut guard = self.registry.inner.write();
        let state = &mut *guard;
        let record = state
            .connections
            .get_mut(conn)
            .ok_or_else(|| RoutingError::UnknownConnection { id: conn.to_string() })?;

        let newly = record.rooms.insert(room.to_string());
        if newly {
            state
                .rooms
                .entry(room.to_string())
                .or_default()
                .insert(conn.to_string());
            debug!(connection = %conn, room = %room, "joined room");
        }
        Ok(newly)
    }

    /// Remove a connection from a room.
    ///
    /// Idempotent: leaving a room the connection is not in (or a room that
    /// does not exist) is a no-op success and returns `None`. On an actual
    /// departure, returns the members remaining afterwards, snapshotted in
    /// the same critical section as the mutation; the room itself is dropped
    /// once its member set is empty.
    pub fn leave(&self, room: &str, conn: &str) -> Result<Option<Vec<ConnectionId>>, RoutingError> {
        let mut guard = self.registry.inner.write();
        let state = &mut *guard;
        let record = state
            .connections
            .get_mut(conn)
            .ok_or_else(|| RoutingError::UnknownConnection { id: conn.to_string() })?;

        if !record.rooms.remove(room) {
            return Ok(None);
        }

        let remaining: Vec<ConnectionId> = match state.rooms.get_mut(room) {
            Some(members) => {
                members.remove(conn);
                members.iter().cloned().collect()
            }
            None => Vec::new(),
        };
        if remaining.is_empty() {
            state.rooms.remove(room);
            debug!(room = %room, "room emptied and removed");
        }
        debug!(connection = %conn, room = %room, remaining = remaining.len(), "left room");
        Ok(Some(remaining))
    }

    /// Members of a room. Empty for a room that does not exist; never fails.
    pub fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.registry
            .inner
            .read()
            .rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rooms the connection currently belongs to.
    pub fn rooms_of(&self, conn: &str) -> Result<Vec<RoomId>, RoutingError> {
        let state = self.registry.inner.read();
        state
            .connections
            .get(conn)
            .map(|record| record.rooms.iter().cloned().collect())
            .ok_or_else(|| RoutingError::UnknownConnection { id: conn.to_string() })
    }

    /// Number of live rooms (health endpoint).
    pub fn room_count(&self) -> usize {
        self.registry.inner.read().rooms.len()
    }
}
