//! Run supervisor: keeps up to `workers` tiles in flight, reacts to
//! connectivity changes, and settles the region's final state.
//!
//! When a worker finishes, the next queued tile is started until the queue is
//! empty or a stop is requested. After a stop no new tiles are started; the
//! in-flight ones are drained before the final state is written.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

use super::job::TileJob;
use super::worker::{run_tile, TileOutcome, TileReport};
use super::{EngineShared, Slot};
use crate::control::{StopReason, StopSignal};
use crate::events::ManagerEvent;
use crate::region_db::{RegionError, RegionId, RegionState};

/// Identity and control channels of one run, owned by its supervisor.
pub(super) struct RunHandle {
    pub run_id: u64,
    pub region: RegionId,
    pub stop: Arc<StopSignal>,
    pub finished: watch::Sender<bool>,
}

#[derive(Debug, Default)]
struct RunTally {
    fetched: u64,
    failed: u64,
    fatal: Option<RegionError>,
    network_reported: bool,
}

pub(super) async fn supervise(shared: Arc<EngineShared>, run: RunHandle, mut jobs: VecDeque<TileJob>) {
    let workers = shared.config.workers.max(1);
    let stop = Arc::clone(&run.stop);
    let mut gate_rx = shared.gate.subscribe();
    let mut join_set: JoinSet<TileReport> = JoinSet::new();
    let mut tally = RunTally::default();

    loop {
        while join_set.len() < workers && !stop.is_stopped() {
            let Some(job) = jobs.pop_front() else {
                break;
            };
            join_set.spawn(run_tile(Arc::clone(&shared), job, Arc::clone(&stop)));
        }

        if join_set.is_empty() {
            break;
        }

        tokio::select! {
            joined = join_set.join_next() => {
                let Some(joined) = joined else {
                    break;
                };
                match joined {
                    Ok(report) => handle_report(&shared, &run, &mut tally, report),
                    Err(e) => {
                        tracing::error!(region_id = run.region, "tile task join: {}", e);
                        tally.failed += 1;
                    }
                }
            }
            Ok(()) = gate_rx.changed(), if !stop.is_stopped() => {
                let connected = *gate_rx.borrow_and_update();
                if !connected {
                    network_lost(&shared, &run, &mut tally);
                }
            }
        }
    }

    let remaining = jobs.len();
    settle(&shared, &run, &tally, remaining).await;
}

fn handle_report(shared: &EngineShared, run: &RunHandle, tally: &mut RunTally, report: TileReport) {
    let TileReport { job, outcome } = report;
    match outcome {
        TileOutcome::Done(mark) => {
            tally.fetched += 1;
            if mark.newly_done {
                tracing::trace!(
                    region_id = run.region,
                    coord = %job.coord,
                    downloaded = mark.downloaded_tiles,
                    total = mark.total_tiles,
                    "tile recorded"
                );
                shared.events.emit(ManagerEvent::Progress {
                    id: run.region,
                    downloaded_tiles: mark.downloaded_tiles,
                    total_tiles: mark.total_tiles,
                    byte_size: mark.byte_size,
                });
            }
        }
        TileOutcome::Failed { error } => {
            tally.failed += 1;
            tracing::warn!(
                region_id = run.region,
                coord = %job.coord,
                retries = job.retry_count,
                "tile failed: {}",
                error
            );
            shared.events.emit(ManagerEvent::TileFailed {
                id: run.region,
                coord: job.coord,
                reason: error,
            });
        }
        TileOutcome::NetworkDown => network_lost(shared, run, tally),
        TileOutcome::Fatal(error) => {
            tracing::error!(region_id = run.region, coord = %job.coord, "stopping run: {}", error);
            if tally.fatal.is_none() {
                tally.fatal = Some(error);
            }
            run.stop.request(StopReason::Fatal);
        }
        TileOutcome::Interrupted => {}
    }
}

fn network_lost(shared: &EngineShared, run: &RunHandle, tally: &mut RunTally) {
    run.stop.request(StopReason::NetworkLost);
    if !tally.network_reported {
        tally.network_reported = true;
        tracing::warn!(region_id = run.region, "connectivity lost; halting fetches");
        shared.events.emit(ManagerEvent::NetworkUnavailable { id: run.region });
    }
}

/// Target state for a finished run, before the ledger has its say.
fn final_state(reason: Option<StopReason>, tally: &RunTally) -> (RegionState, Option<RegionError>) {
    match reason {
        Some(StopReason::Cancel) => (RegionState::Cancelled, None),
        Some(StopReason::Pause) => (RegionState::Paused, None),
        Some(StopReason::NetworkLost) => (RegionState::Paused, Some(RegionError::NetworkUnavailable)),
        Some(StopReason::Fatal) => (RegionState::Paused, tally.fatal.clone()),
        None if tally.failed > 0 => (
            RegionState::Paused,
            Some(RegionError::TilesFailed {
                count: tally.failed,
            }),
        ),
        None => (RegionState::Completed, None),
    }
}

async fn settle(shared: &EngineShared, run: &RunHandle, tally: &RunTally, remaining: usize) {
    let reason = run.stop.reason();
    let (target, error) = final_state(reason, tally);
    let db = &shared.db;

    let written = if target == RegionState::Completed {
        match db.complete_if_full(run.region).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!(region_id = run.region, "queue drained but ledger is short; pausing");
                db.finish_run(run.region, RegionState::Paused, None).await.map(|_| ())
            }
            Err(e) => Err(e),
        }
    } else {
        // Never overrides `completed`: a last tile landing during the drain wins.
        db.finish_run(run.region, target, error.as_ref()).await.map(|_| ())
    };
    if let Err(e) = written {
        tracing::error!(region_id = run.region, "failed to record run end: {:#}", e);
    }

    let settled = match db.get_region(run.region).await {
        Ok(region) => region,
        Err(e) => {
            tracing::error!(region_id = run.region, "failed to read region after run: {:#}", e);
            None
        }
    };

    {
        let mut slot = shared.slot.lock().await;
        let ours = matches!(&*slot, Slot::Running(active) | Slot::Draining(active) if active.run_id == run.run_id);
        if ours {
            *slot = match settled.as_ref().map(|r| r.state) {
                Some(RegionState::Paused) => Slot::Paused(run.region),
                _ => Slot::Idle,
            };
        }
    }

    match settled {
        Some(region) => {
            tracing::info!(
                region_id = run.region,
                state = region.state.as_str(),
                stop = ?reason,
                fetched = tally.fetched,
                failed = tally.failed,
                not_started = remaining,
                downloaded = region.downloaded_tiles,
                total = region.total_tiles,
                "download run finished"
            );
            shared.events.emit(ManagerEvent::StateChanged {
                id: run.region,
                state: region.state,
                error: region.error,
            });
        }
        None => tracing::info!(region_id = run.region, "download run finished; region no longer exists"),
    }

    let _ = run.finished.send(true);
}
