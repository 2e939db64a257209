//! `DownloadManager`: the one façade the rest of an application talks to.
//!
//! Composes the region store, tile cache, engine, accountant, and network gate.
//! State-changing commands are serialized through a session lock; reads run
//! concurrently with an active download but never overlap a delete.

use anyhow::Context;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::accountant::{StorageAccountant, UsageReport};
use crate::config::{EngineConfig, OmapConfig};
use crate::engine::{EngineState, StartOutcome, TileDownloadEngine};
use crate::error::{ManagerError, ManagerResult};
use crate::events::{EventBus, ManagerEvent};
use crate::network::NetworkGate;
use crate::region_db::{RegionDb, RegionId, RegionSummary};
use crate::source::{CurlTileSource, TileSource};
use crate::storage::TileCache;
use crate::tile::{GeoRect, ZoomRange};

pub struct DownloadManager {
    db: RegionDb,
    cache: TileCache,
    engine: TileDownloadEngine,
    accountant: StorageAccountant,
    gate: NetworkGate,
    events: EventBus,
    /// One start/pause/resume/cancel/delete at a time.
    session: Mutex<()>,
    /// Held for writing while a delete removes files and rows.
    view: RwLock<()>,
}

impl DownloadManager {
    /// Build a manager over existing components and reconcile leftovers from
    /// an unclean shutdown (see [`DownloadManager::reconcile`]).
    pub async fn open(
        db: RegionDb,
        cache: TileCache,
        source: Arc<dyn TileSource>,
        gate: NetworkGate,
        config: EngineConfig,
    ) -> ManagerResult<Self> {
        let manager = Self::attach(db, cache, source, gate, config);
        manager.reconcile().await?;
        Ok(manager)
    }

    /// Build a manager without touching persisted state, for a process that
    /// shares the store with another one that is downloading right now.
    pub fn attach(
        db: RegionDb,
        cache: TileCache,
        source: Arc<dyn TileSource>,
        gate: NetworkGate,
        config: EngineConfig,
    ) -> Self {
        let events = EventBus::new();
        let engine = TileDownloadEngine::new(
            db.clone(),
            cache.clone(),
            source,
            gate.clone(),
            events.clone(),
            config,
        );
        Self {
            accountant: StorageAccountant::new(db.clone()),
            db,
            cache,
            engine,
            gate,
            events,
            session: Mutex::new(()),
            view: RwLock::new(()),
        }
    }

    /// Startup reconciliation: regions left `downloading` become `paused`;
    /// stale temp files and half-deleted region directories are removed.
    pub async fn reconcile(&self) -> ManagerResult<()> {
        let _session = self.session.lock().await;
        let recovered = self.db.recover_downloading_regions().await?;
        if recovered > 0 {
            tracing::info!(recovered, "reset interrupted downloads to paused");
        }
        let cache = self.cache.clone();
        let swept = tokio::task::spawn_blocking(move || cache.sweep_stale_files())
            .await
            .context("cache sweep task")?
            .map_err(ManagerError::DiskWrite)?;
        if swept > 0 {
            tracing::info!(swept, "removed stale files from tile cache");
        }
        Ok(())
    }

    /// Open with the on-disk defaults: XDG state database, configured cache
    /// directory, and an HTTP tile source built from the config. `recover`
    /// runs startup reconciliation; pass false while another process downloads.
    pub async fn from_config(cfg: &OmapConfig, gate: NetworkGate, recover: bool) -> anyhow::Result<Self> {
        cfg.validate()?;
        let db = RegionDb::open_default().await?;
        let cache_dir = cfg.tile_cache_dir()?;
        let cache = TileCache::open(&cache_dir)
            .with_context(|| format!("open tile cache {}", cache_dir.display()))?;
        let engine_cfg = cfg.engine();
        let source = CurlTileSource::new(
            cfg.tile_url_template.clone(),
            cfg.user_agent.clone(),
            engine_cfg.fetch_timeout,
        );
        let manager = Self::attach(db, cache, Arc::new(source), gate, engine_cfg);
        if recover {
            manager.reconcile().await?;
        }
        Ok(manager)
    }

    /// Register a new region. Nothing is downloaded until `start_download`.
    pub async fn create_region(
        &self,
        name: &str,
        bounds: GeoRect,
        zoom_range: (u8, u8),
    ) -> ManagerResult<RegionId> {
        bounds.validate()?;
        let zooms = ZoomRange::new(zoom_range.0, zoom_range.1)?;
        let _session = self.session.lock().await;
        let region = self.db.add_region(name, &bounds, zooms).await?;
        tracing::info!(
            region_id = region.id,
            name,
            total_tiles = region.total_tiles,
            min_zoom = zooms.min,
            max_zoom = zooms.max,
            "region created"
        );
        self.events.emit(ManagerEvent::RegionCreated {
            id: region.id,
            total_tiles: region.total_tiles,
        });
        Ok(region.id)
    }

    pub async fn start_download(&self, id: RegionId) -> ManagerResult<StartOutcome> {
        let _session = self.session.lock().await;
        self.engine.start(id).await
    }

    pub async fn pause_download(&self) -> ManagerResult<()> {
        let _session = self.session.lock().await;
        self.engine.pause().await
    }

    pub async fn resume_download(&self) -> ManagerResult<StartOutcome> {
        let _session = self.session.lock().await;
        self.engine.resume().await
    }

    pub async fn cancel_download(&self) -> ManagerResult<()> {
        let _session = self.session.lock().await;
        self.engine.cancel().await
    }

    /// Remove a region's metadata, ledger, and tiles.
    ///
    /// An active run on the region is cancelled and drained first. Tiles are
    /// moved aside before the rows are dropped and put back if that fails, so
    /// a region is never listed without its files or the other way round.
    pub async fn delete_region(&self, id: RegionId) -> ManagerResult<()> {
        let _session = self.session.lock().await;
        if self.db.get_region(id).await?.is_none() {
            return Err(ManagerError::NotFound(id));
        }
        self.engine.release(id).await?;

        let _view = self.view.write().await;
        // Re-read after the drain: the last tiles of the run may have landed.
        let region = self
            .db
            .get_region(id)
            .await?
            .ok_or(ManagerError::NotFound(id))?;

        let cache = self.cache.clone();
        let staged = tokio::task::spawn_blocking(move || cache.stage_region_removal(id))
            .await
            .context("stage region removal task")?
            .map_err(ManagerError::DiskWrite)?;

        if let Err(e) = self.db.remove_region(id).await {
            if let Some(staged) = staged {
                if let Err(restore) = staged.restore() {
                    tracing::error!(region_id = id, "failed to restore tiles after aborted delete: {}", restore);
                }
            }
            return Err(e.into());
        }

        if let Some(staged) = staged {
            let purged = tokio::task::spawn_blocking(move || staged.purge()).await;
            match purged {
                Ok(Ok(())) => {}
                // Left for the startup sweep.
                Ok(Err(e)) => tracing::warn!(region_id = id, "failed to purge deleted tiles: {}", e),
                Err(e) => tracing::warn!(region_id = id, "purge task: {}", e),
            }
        }

        tracing::info!(region_id = id, freed_bytes = region.byte_size, "region deleted");
        self.events.emit(ManagerEvent::RegionDeleted {
            id,
            freed_bytes: region.byte_size,
        });
        Ok(())
    }

    /// All regions, newest first.
    pub async fn list_regions(&self) -> ManagerResult<Vec<RegionSummary>> {
        let _view = self.view.read().await;
        let regions = self.db.list_regions().await?;
        Ok(regions.iter().map(|r| r.summary()).collect())
    }

    pub async fn region(&self, id: RegionId) -> ManagerResult<RegionSummary> {
        let _view = self.view.read().await;
        self.db
            .get_region(id)
            .await?
            .map(|r| r.summary())
            .ok_or(ManagerError::NotFound(id))
    }

    /// Summary of the region being downloaded right now, if any.
    pub async fn current_download(&self) -> ManagerResult<Option<RegionSummary>> {
        let Some(id) = self.engine.active_region().await else {
            return Ok(None);
        };
        let _view = self.view.read().await;
        Ok(self.db.get_region(id).await?.map(|r| r.summary()))
    }

    /// Fraction of the active region downloaded; 0 when nothing is running.
    pub async fn download_progress(&self) -> ManagerResult<f64> {
        Ok(self
            .current_download()
            .await?
            .map(|s| s.fraction())
            .unwrap_or(0.0))
    }

    pub async fn total_storage_used(&self) -> ManagerResult<u64> {
        let _view = self.view.read().await;
        Ok(self.accountant.total_storage_used().await?)
    }

    pub async fn region_size(&self, id: RegionId) -> ManagerResult<u64> {
        let _view = self.view.read().await;
        self.accountant
            .region_size(id)
            .await?
            .ok_or(ManagerError::NotFound(id))
    }

    pub async fn usage_report(&self) -> ManagerResult<UsageReport> {
        let _view = self.view.read().await;
        Ok(self.accountant.report().await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    pub async fn engine_state(&self) -> EngineState {
        self.engine.state().await
    }

    /// Wait for the current run to end (completed, paused, or cancelled).
    pub async fn wait_for_run(&self) {
        self.engine.join().await
    }

    pub fn network(&self) -> &NetworkGate {
        &self.gate
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }
}
