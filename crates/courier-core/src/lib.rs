//! Courier core — connection registry, room membership, message routing,
//! and disconnect cleanup.
//!
//! The transport feeds inbound frames and lifecycle events in; everything
//! going back out passes through the [`Delivery`] seam, so the core never
//! touches a socket and never sends while holding a lock.

pub mod lifecycle;
pub mod registry;
pub mod rooms;
pub mod router;

pub use lifecycle::LifecycleCoordinator;
pub use registry::{ConnectionRegistry, ConnectionSnapshot, ConnectionState};
pub use rooms::RoomTable;
pub use router::{Delivery, Router, RouterConfig};

use std::sync::Arc;

/// The wired-together core, shared between the transport's connection tasks.
pub struct RoutingCore {
    pub registry: ConnectionRegistry,
    pub rooms: RoomTable,
    pub router: Arc<Router>,
    pub lifecycle: Arc<LifecycleCoordinator>,
}

impl RoutingCore {
    /// Build a core that delivers outbound envelopes through `delivery`.
    pub fn new(delivery: Arc<dyn Delivery>, config: RouterConfig) -> Self {
        let registry = ConnectionRegistry::new();
        let rooms = RoomTable::new(registry.clone());
        let router = Arc::new(Router::new(
            registry.clone(),
            rooms.clone(),
            delivery,
            config,
        ));
        let lifecycle = Arc::new(LifecycleCoordinator::new(
            registry.clone(),
            rooms.clone(),
            router.clone(),
        ));
        Self {
            registry,
            rooms,
            router,
            lifecycle,
        }
    }
}
