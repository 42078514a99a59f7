//! ConnectionRegistry — tracks live connections and the room index.
//!
//! Both the connection map and the room index live under a single
//! `parking_lot::RwLock`, so a membership change updates the room's member
//! set and the connection's room set in one critical section. Lock holds
//! are short and synchronous; callers snapshot what they need under the
//! lock and do all sending after release.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use courier_protocol::{ConnectionId, RoomId, RoutingError};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Lifecycle state of a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Active,
    Closing,
    Closed,
}

/// Internal record for one connection.
#[derive(Debug)]
pub(crate) struct ConnectionRecord {
    pub(crate) state: ConnectionState,
    pub(crate) rooms: HashSet<RoomId>,
}

/// Cloned, lock-free view of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub rooms: HashSet<RoomId>,
}

pub(crate) struct RegistryState {
    pub(crate) connections: HashMap<ConnectionId, ConnectionRecord>,
    pub(crate) rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

/// Tracks every live connection by identifier.
///
/// Cheap to clone; clones share the same underlying state.
#[derive(Clone)]
pub struct ConnectionRegistry {
    pub(crate) inner: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryState {
                connections: HashMap::new(),
                rooms: HashMap::new(),
            })),
        }
    }

    /// Track a new connection in the `Active` state.
    ///
    /// The transport assigns unique identifiers, so a duplicate here means a
    /// transport bug; it is checked anyway.
    pub fn register(&self, id: &str) -> Result<(), RoutingError> {
        let mut state = self.inner.write();
        if state.connections.contains_key(id) {
            return Err(RoutingError::DuplicateConnection { id: id.to_string() });
        }
        state.connections.insert(
            id.to_string(),
            ConnectionRecord {
                state: ConnectionState::Active,
                rooms: HashSet::new(),
            },
        );
        debug!(connection = %id, "registered");
        Ok(())
    }

    /// Remove a connection record.
    ///
    /// Room eviction does not cascade from here: the caller must have left
    /// every room first. A record still holding rooms is a caller contract
    /// violation and gets logged.
    pub fn unregister(&self, id: &str) -> Result<(), RoutingError> {
        let mut state = self.inner.write();
        match state.connections.remove(id) {
            Some(record) => {
                if !record.rooms.is_empty() {
                    warn!(
                        connection = %id,
                        rooms = record.rooms.len(),
                        "unregistered while still holding room memberships"
                    );
                }
                debug!(connection = %id, "unregistered");
                Ok(())
            }
            None => Err(RoutingError::UnknownConnection { id: id.to_string() }),
        }
    }

    /// Snapshot a connection's current state and memberships.
    pub fn get(&self, id: &str) -> Result<ConnectionSnapshot, RoutingError> {
        let state = self.inner.read();
        state
            .connections
            .get(id)
            .map(|record| ConnectionSnapshot {
                id: id.to_string(),
                state: record.state,
                rooms: record.rooms.clone(),
            })
            .ok_or_else(|| RoutingError::UnknownConnection { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().connections.contains_key(id)
    }

    /// Transition a connection into `Closing` at the start of teardown.
    pub fn mark_closing(&self, id: &str) -> Result<(), RoutingError> {
        self.set_state(id, ConnectionState::Closing)
    }

    /// Transition a connection into `Closed` once room eviction is done.
    pub fn mark_closed(&self, id: &str) -> Result<(), RoutingError> {
        self.set_state(id, ConnectionState::Closed)
    }

    fn set_state(&self, id: &str, to: ConnectionState) -> Result<(), RoutingError> {
        let mut state = self.inner.write();
        match state.connections.get_mut(id) {
            Some(record) => {
                record.state = to;
                Ok(())
            }
            None => Err(RoutingError::UnknownConnection { id: id.to_string() }),
        }
    }

    /// Number of tracked connections (health endpoint).
    pub fn connection_count(&self) -> usize {
        self.inner.read().connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
