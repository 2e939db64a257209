//! Tile download engine: one active region at a time.
//!
//! State machine:
//!
//! ```text
//!            start                pause / cancel / net loss
//!   Idle ───────────► Running ─────────────────────────────► Draining
//!    ▲                                                          │
//!    │  completed / cancelled          paused (any cause)       │
//!    └──────────────────────────────◄───────────┬───────────────┘
//!                                               ▼
//!                                       Paused(region) ── start(region) ──► Running
//! ```
//!
//! A supervisor task owns each run: it feeds a bounded pool of workers from
//! the job queue, watches connectivity, and writes the final region state.
//! Callers of `pause`/`cancel` wait at most the configured grace period.

mod job;
mod supervisor;
mod worker;

pub use job::{plan_jobs, TileJob, TileJobStatus};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::config::EngineConfig;
use crate::control::{StopReason, StopSignal};
use crate::error::{ManagerError, ManagerResult};
use crate::events::{EventBus, ManagerEvent};
use crate::network::NetworkGate;
use crate::region_db::{RegionDb, RegionId, RegionState};
use crate::source::TileSource;
use crate::storage::TileCache;

/// Externally visible engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running(RegionId),
    /// Stop requested; in-flight tiles are finishing.
    Draining(RegionId),
    /// Last run stopped short; `resume` restarts this region.
    Paused(RegionId),
}

/// Result of a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A run was launched with this many tiles queued.
    Started { queued: usize },
    /// The ledger already holds every tile; the region is `Completed`.
    AlreadyComplete,
}

/// Everything a run needs, shared by the engine, the supervisor, and workers.
pub(crate) struct EngineShared {
    pub(crate) db: RegionDb,
    pub(crate) cache: TileCache,
    pub(crate) source: Arc<dyn TileSource>,
    pub(crate) gate: NetworkGate,
    pub(crate) events: EventBus,
    pub(crate) config: EngineConfig,
    slot: Mutex<Slot>,
    next_run: AtomicU64,
}

#[derive(Clone)]
struct ActiveRun {
    run_id: u64,
    region: RegionId,
    stop: Arc<StopSignal>,
    finished: watch::Receiver<bool>,
}

enum Slot {
    Idle,
    Running(ActiveRun),
    Draining(ActiveRun),
    Paused(RegionId),
}

impl Slot {
    fn state(&self) -> EngineState {
        match self {
            Slot::Idle => EngineState::Idle,
            Slot::Running(run) => EngineState::Running(run.region),
            Slot::Draining(run) => EngineState::Draining(run.region),
            Slot::Paused(id) => EngineState::Paused(*id),
        }
    }
}

/// Owner of the single active download job.
#[derive(Clone)]
pub struct TileDownloadEngine {
    shared: Arc<EngineShared>,
}

impl TileDownloadEngine {
    pub fn new(
        db: RegionDb,
        cache: TileCache,
        source: Arc<dyn TileSource>,
        gate: NetworkGate,
        events: EventBus,
        config: EngineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                db,
                cache,
                source,
                gate,
                events,
                config,
                slot: Mutex::new(Slot::Idle),
                next_run: AtomicU64::new(1),
            }),
        }
    }

    pub async fn state(&self) -> EngineState {
        self.shared.slot.lock().await.state()
    }

    /// Region whose tiles are being fetched right now (running or draining).
    pub async fn active_region(&self) -> Option<RegionId> {
        match self.state().await {
            EngineState::Running(id) | EngineState::Draining(id) => Some(id),
            EngineState::Idle | EngineState::Paused(_) => None,
        }
    }

    /// Start (or resume) downloading `region_id`.
    ///
    /// The remaining work is recomputed from the ledger every time, so a
    /// paused, cancelled, failed, or crash-recovered region resumes exactly
    /// where its recorded tiles end.
    pub async fn start(&self, region_id: RegionId) -> ManagerResult<StartOutcome> {
        let mut slot = self.shared.slot.lock().await;
        match &*slot {
            Slot::Running(run) | Slot::Draining(run) => {
                return Err(ManagerError::EngineBusy { active: run.region })
            }
            Slot::Paused(id) if *id != region_id => {
                return Err(ManagerError::EngineBusy { active: *id })
            }
            Slot::Paused(_) | Slot::Idle => {}
        }
        if !self.shared.gate.is_connected() {
            return Err(ManagerError::NoConnectivity);
        }

        let db = &self.shared.db;
        let region = db
            .get_region(region_id)
            .await?
            .ok_or(ManagerError::NotFound(region_id))?;
        if region.state == RegionState::Completed {
            *slot = Slot::Idle;
            return Ok(StartOutcome::AlreadyComplete);
        }

        let done = db.done_tiles(region_id).await?;
        let jobs = plan_jobs(&region, &done);
        if jobs.is_empty() {
            if !db.complete_if_full(region_id).await? {
                return Err(ManagerError::Store(anyhow::anyhow!(
                    "region {} has no tiles left to fetch but its counters are short",
                    region_id
                )));
            }
            *slot = Slot::Idle;
            self.shared.events.emit(ManagerEvent::StateChanged {
                id: region_id,
                state: RegionState::Completed,
                error: None,
            });
            return Ok(StartOutcome::AlreadyComplete);
        }

        if !db.begin_download(region_id).await? {
            // Possibly this very region, claimed by another process.
            let active = db.downloading_regions().await?.into_iter().next();
            return match active {
                Some(active) => Err(ManagerError::EngineBusy { active }),
                None => Err(ManagerError::NotFound(region_id)),
            };
        }
        self.shared.events.emit(ManagerEvent::StateChanged {
            id: region_id,
            state: RegionState::Downloading,
            error: None,
        });

        let queued = jobs.len();
        let run_id = self.shared.next_run.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(StopSignal::new());
        let (finished_tx, finished_rx) = watch::channel(false);
        tracing::info!(
            region_id,
            run_id,
            queued,
            already_done = done.len(),
            "starting region download"
        );
        tokio::spawn(supervisor::supervise(
            Arc::clone(&self.shared),
            supervisor::RunHandle {
                run_id,
                region: region_id,
                stop: Arc::clone(&stop),
                finished: finished_tx,
            },
            jobs,
        ));
        *slot = Slot::Running(ActiveRun {
            run_id,
            region: region_id,
            stop,
            finished: finished_rx,
        });
        Ok(StartOutcome::Started { queued })
    }

    /// Resume the region left in `Paused(region)` by the last run.
    pub async fn resume(&self) -> ManagerResult<StartOutcome> {
        let target = match self.state().await {
            EngineState::Paused(id) => id,
            EngineState::Running(id) | EngineState::Draining(id) => {
                return Err(ManagerError::EngineBusy { active: id })
            }
            EngineState::Idle => return Err(ManagerError::NothingToResume),
        };
        self.start(target).await
    }

    /// Stop fetching new tiles; finished tiles stay recorded. Region ends `Paused`.
    pub async fn pause(&self) -> ManagerResult<()> {
        let run = {
            let mut slot = self.shared.slot.lock().await;
            let run = match &*slot {
                Slot::Running(run) => run.clone(),
                _ => return Err(ManagerError::NotRunning),
            };
            run.stop.request(StopReason::Pause);
            *slot = Slot::Draining(run.clone());
            run
        };
        tracing::info!(region_id = run.region, "pause requested");
        self.wait_drained(&run).await;
        Ok(())
    }

    /// Stop all work and mark the region `Cancelled`. Downloaded tiles are kept.
    pub async fn cancel(&self) -> ManagerResult<()> {
        let run = {
            let mut slot = self.shared.slot.lock().await;
            match &*slot {
                Slot::Running(run) | Slot::Draining(run) => {
                    let run = run.clone();
                    run.stop.request(StopReason::Cancel);
                    *slot = Slot::Draining(run.clone());
                    run
                }
                Slot::Paused(id) => {
                    let id = *id;
                    self.shared
                        .db
                        .finish_run(id, RegionState::Cancelled, None)
                        .await?;
                    *slot = Slot::Idle;
                    tracing::info!(region_id = id, "paused region cancelled");
                    self.shared.events.emit(ManagerEvent::StateChanged {
                        id,
                        state: RegionState::Cancelled,
                        error: None,
                    });
                    return Ok(());
                }
                Slot::Idle => return Err(ManagerError::NotRunning),
            }
        };
        tracing::info!(region_id = run.region, "cancel requested");
        self.wait_drained(&run).await;
        Ok(())
    }

    /// Make sure the engine no longer references `region_id`: cancel and fully
    /// drain its run if active, or forget it if paused. Used before deletion.
    pub async fn release(&self, region_id: RegionId) -> ManagerResult<()> {
        let run = {
            let mut slot = self.shared.slot.lock().await;
            match &*slot {
                Slot::Running(run) | Slot::Draining(run) if run.region == region_id => {
                    let run = run.clone();
                    run.stop.request(StopReason::Cancel);
                    *slot = Slot::Draining(run.clone());
                    run
                }
                Slot::Paused(id) if *id == region_id => {
                    *slot = Slot::Idle;
                    return Ok(());
                }
                _ => return Ok(()),
            }
        };
        wait_finished(run.finished).await;
        Ok(())
    }

    /// Wait until the current run (if any) has fully finished.
    pub async fn join(&self) {
        let finished = match &*self.shared.slot.lock().await {
            Slot::Running(run) | Slot::Draining(run) => run.finished.clone(),
            Slot::Idle | Slot::Paused(_) => return,
        };
        wait_finished(finished).await;
    }

    async fn wait_drained(&self, run: &ActiveRun) {
        let grace = self.shared.config.grace_period;
        if tokio::time::timeout(grace, wait_finished(run.finished.clone()))
            .await
            .is_err()
        {
            tracing::warn!(
                region_id = run.region,
                grace_ms = grace.as_millis() as u64,
                "grace period elapsed; in-flight tiles still finishing"
            );
        }
    }
}

async fn wait_finished(mut finished: watch::Receiver<bool>) {
    // Sender dropped without sending means the supervisor is gone: treat as finished.
    let _ = finished.wait_for(|done| *done).await;
}

#[cfg(test)]
mod tests;
