//! LifecycleCoordinator — classifies disconnects and drives cleanup.
//!
//! Every cause funnels into one cleanup path; the classification only
//! shapes the log line. Remaining members of every room the connection was
//! in are informed before its registration disappears.

use std::sync::Arc;

use courier_protocol::DisconnectCause;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;
use crate::rooms::RoomTable;
use crate::router::Router;

pub struct LifecycleCoordinator {
    registry: ConnectionRegistry,
    rooms: RoomTable,
    router: Arc<Router>,
}

impl LifecycleCoordinator {
    pub fn new(registry: ConnectionRegistry, rooms: RoomTable, router: Arc<Router>) -> Self {
        Self {
            registry,
            rooms,
            router,
        }
    }

    /// Handle a transport disconnect event for `conn`.
    ///
    /// Infallible: a connection that is already gone is logged and skipped,
    /// and an unrecognized cause takes the normal cleanup path.
    pub fn handle_disconnect(&self, conn: &str, cause: DisconnectCause) {
        self.log_cause(conn, &cause);

        if self.registry.mark_closing(conn).is_err() {
            warn!(connection = %conn, "disconnect event for untracked connection");
            return;
        }

        // Evict room by room so each departure broadcast sees a consistent
        // remaining-member snapshot.
        let rooms = self.rooms.rooms_of(conn).unwrap_or_default();
        for room in rooms {
            match self.rooms.leave(&room, conn) {
                Ok(Some(remaining)) => self.router.notify_room_left(&room, conn, &remaining),
                Ok(None) => {}
                Err(e) => {
                    warn!(connection = %conn, room = %room, error = %e, "room eviction failed")
                }
            }
        }

        if self.registry.mark_closed(conn).is_err()
            || self.registry.unregister(conn).is_err()
        {
            // Lost a race with another teardown path; nothing left to clean.
            warn!(connection = %conn, "connection vanished during teardown");
        }
    }

    fn log_cause(&self, conn: &str, cause: &DisconnectCause) {
        match cause {
            DisconnectCause::TransportError => {
                warn!(connection = %conn, cause = %cause, "connection closed after transport error");
            }
            DisconnectCause::Unrecognized(raw) => {
                warn!(connection = %conn, cause = %raw, "connection closed with unrecognized cause");
            }
            _ => {
                info!(connection = %conn, cause = %cause, "connection closed");
            }
        }
    }
}
