//! Progress and state-change events published by the manager.
//!
//! Consumers subscribe and render; the core never depends on a UI framework.
//! Delivery is broadcast: a subscriber that falls behind skips events
//! (`RecvError::Lagged`) rather than slowing the engine down.

use tokio::sync::broadcast;

use crate::region_db::{RegionError, RegionId, RegionState};
use crate::tile::TileCoord;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    RegionCreated {
        id: RegionId,
        total_tiles: u64,
    },
    StateChanged {
        id: RegionId,
        state: RegionState,
        error: Option<RegionError>,
    },
    /// Consistent snapshot taken inside the ledger transaction.
    Progress {
        id: RegionId,
        downloaded_tiles: u64,
        total_tiles: u64,
        byte_size: u64,
    },
    /// A tile exhausted its retries; the run continues with the others.
    TileFailed {
        id: RegionId,
        coord: TileCoord,
        reason: String,
    },
    /// Connectivity dropped during a run; fetching has halted.
    NetworkUnavailable {
        id: RegionId,
    },
    RegionDeleted {
        id: RegionId,
        freed_bytes: u64,
    },
}

/// Sending half of the event channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ManagerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish to current subscribers; having none is fine.
    pub fn emit(&self, event: ManagerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_in_order() {
        let bus = EventBus::new();
        bus.emit(ManagerEvent::RegionCreated {
            id: 0,
            total_tiles: 1,
        });
        let mut rx = bus.subscribe();
        bus.emit(ManagerEvent::RegionCreated {
            id: 1,
            total_tiles: 26,
        });
        bus.emit(ManagerEvent::NetworkUnavailable { id: 1 });
        assert_eq!(
            rx.recv().await.unwrap(),
            ManagerEvent::RegionCreated {
                id: 1,
                total_tiles: 26
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            ManagerEvent::NetworkUnavailable { id: 1 }
        );
    }
}
