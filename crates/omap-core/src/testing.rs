//! Shared fixtures for unit tests: a scriptable in-memory tile source and
//! helpers to build engines and regions of a known size.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::events::EventBus;
use crate::network::NetworkGate;
use crate::region_db::RegionDb;
use crate::retry::{FetchError, RetryPolicy};
use crate::source::TileSource;
use crate::storage::TileCache;
use crate::tile::{tile_bounds, GeoRect, TileCoord, ZoomRange};

pub(crate) const TILE_LEN: usize = 64;

/// Tile source serving `TILE_LEN` bytes per tile, with knobs for the
/// failure modes the engine has to handle.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    calls: Mutex<HashMap<TileCoord, u32>>,
    successes: AtomicU64,
    /// After this many successful fetches, further fetches block while `held` is set.
    hold_after: Option<u64>,
    held: AtomicBool,
    /// On this call number (1-based), close `gate` and fail; later calls fail while it is closed.
    drop_network_on_call: Option<u64>,
    gate: Option<NetworkGate>,
    dropped: AtomicBool,
    failing: Mutex<HashSet<TileCoord>>,
    /// Tiles that take this long to serve.
    slow: HashMap<TileCoord, Duration>,
    reject_status: Option<u32>,
    total_calls: AtomicU64,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hold_after(mut self, successes: u64) -> Self {
        self.hold_after = Some(successes);
        self.held = AtomicBool::new(true);
        self
    }

    pub(crate) fn drop_network_on_call(mut self, call: u64, gate: NetworkGate) -> Self {
        self.drop_network_on_call = Some(call);
        self.gate = Some(gate);
        self
    }

    pub(crate) fn failing(self, coords: impl IntoIterator<Item = TileCoord>) -> Self {
        self.failing.lock().unwrap().extend(coords);
        self
    }

    pub(crate) fn slow(mut self, coord: TileCoord, delay: Duration) -> Self {
        self.slow.insert(coord, delay);
        self
    }

    pub(crate) fn rejecting(mut self, status: u32) -> Self {
        self.reject_status = Some(status);
        self
    }

    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }

    pub(crate) fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub(crate) fn calls_for(&self, coord: TileCoord) -> u32 {
        self.calls.lock().unwrap().get(&coord).copied().unwrap_or(0)
    }

    pub(crate) fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::SeqCst)
    }
}

impl TileSource for ScriptedSource {
    fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, FetchError> {
        let call = self.total_calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.calls.lock().unwrap().entry(coord).or_insert(0) += 1;

        if let Some(status) = self.reject_status {
            return Err(FetchError::Http(status));
        }
        if let Some(gate) = &self.gate {
            if Some(call) == self.drop_network_on_call && !self.dropped.swap(true, Ordering::SeqCst) {
                gate.set_connected(false);
            }
            if !gate.is_connected() {
                return Err(FetchError::Connection("network is down".into()));
            }
        }
        if let Some(delay) = self.slow.get(&coord) {
            std::thread::sleep(*delay);
        }
        if self.failing.lock().unwrap().contains(&coord) {
            return Err(FetchError::Http(404));
        }
        if let Some(limit) = self.hold_after {
            if self.successes.load(Ordering::SeqCst) >= limit {
                while self.held.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(2));
                }
            }
        }
        self.successes.fetch_add(1, Ordering::SeqCst);
        Ok(vec![(coord.x % 251) as u8; TILE_LEN])
    }
}

pub(crate) fn fast_config(workers: usize) -> EngineConfig {
    EngineConfig {
        workers,
        fetch_timeout: Duration::from_secs(5),
        grace_period: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

/// Bounds covering exactly an `n` x `n` block of tiles at `zoom`.
pub(crate) fn tile_block(zoom: u8, x0: u32, y0: u32, n: u32) -> (GeoRect, ZoomRange) {
    let top_left = tile_bounds(TileCoord::new(zoom, x0, y0));
    let bottom_right = tile_bounds(TileCoord::new(zoom, x0 + n - 1, y0 + n - 1));
    let inset = 1e-6;
    let bounds = GeoRect::new(
        bottom_right.min_lat + inset,
        top_left.min_lon + inset,
        top_left.max_lat - inset,
        bottom_right.max_lon - inset,
    )
    .unwrap();
    (bounds, ZoomRange::new(zoom, zoom).unwrap())
}

/// 100 tiles at zoom 12.
pub(crate) fn hundred_tiles() -> (GeoRect, ZoomRange) {
    tile_block(12, 1000, 1500, 10)
}

pub(crate) struct Fixture {
    pub db: RegionDb,
    pub cache: TileCache,
    pub gate: NetworkGate,
    pub events: EventBus,
    _dir: tempfile::TempDir,
}

pub(crate) async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let cache = TileCache::open(dir.path().join("tiles")).unwrap();
    Fixture {
        db: RegionDb::open_memory().await.unwrap(),
        cache,
        gate: NetworkGate::new(true),
        events: EventBus::new(),
        _dir: dir,
    }
}
