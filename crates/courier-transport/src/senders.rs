//! Per-connection outbound queues.
//!
//! The transport registers an unbounded sender per connection; the core's
//! router delivers by enqueueing here. Actual socket writes happen in each
//! connection's own task, so a slow peer only backs up its own queue.

use std::sync::Arc;

use courier_core::Delivery;
use courier_protocol::{OutboundEnvelope, RoutingError};
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Delivery table mapping connection identifiers to outbound queues.
///
/// Cheap to clone; clones share the same underlying table.
#[derive(Clone, Default)]
pub struct SenderTable {
    senders: Arc<DashMap<String, mpsc::UnboundedSender<String>>>,
}

impl SenderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection's outbound queue.
    pub fn insert(&self, id: &str, tx: mpsc::UnboundedSender<String>) {
        self.senders.insert(id.to_string(), tx);
    }

    /// Detach a connection's outbound queue. Dropping the sender wakes the
    /// connection task, which then tears the socket down.
    pub fn remove(&self, id: &str) {
        self.senders.remove(id);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl Delivery for SenderTable {
    fn deliver(&self, target: &str, envelope: &OutboundEnvelope) -> Result<(), RoutingError> {
        let failed = || RoutingError::DeliveryFailed {
            target: target.to_string(),
        };
        let frame = serde_json::to_string(envelope).map_err(|_| failed())?;
        let sender = self.senders.get(target).ok_or_else(failed)?;
        sender.send(frame).map_err(|_| failed())
    }
}
