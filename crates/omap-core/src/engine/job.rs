//! Tile jobs: the per-run work list derived from the ledger.

use std::collections::{HashSet, VecDeque};

use crate::region_db::{OfflineMapRegion, RegionId};
use crate::tile::{enumerate_tiles, TileCoord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileJobStatus {
    Queued,
    InFlight,
    Done,
    Failed,
}

/// One tile to fetch in the current run. Ephemeral: never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileJob {
    pub region_id: RegionId,
    pub coord: TileCoord,
    pub status: TileJobStatus,
    pub retry_count: u32,
}

impl TileJob {
    pub fn new(region_id: RegionId, coord: TileCoord) -> Self {
        Self {
            region_id,
            coord,
            status: TileJobStatus::Queued,
            retry_count: 0,
        }
    }
}

/// Every tile of `region` not already in `done`, shallowest zoom first.
pub fn plan_jobs(region: &OfflineMapRegion, done: &HashSet<TileCoord>) -> VecDeque<TileJob> {
    enumerate_tiles(&region.bounds, region.zoom_range)
        .filter(|coord| !done.contains(coord))
        .map(|coord| TileJob::new(region.id, coord))
        .collect()
}
