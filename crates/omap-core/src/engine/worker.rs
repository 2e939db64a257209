//! One worker: fetch a tile (with retries), write it, record it.
//!
//! Only the fetch is abandoned on stop. Once bytes are in hand the disk write
//! and ledger insert always run to completion, so a finished tile is never
//! lost and a recorded tile always has its file.

use std::sync::Arc;

use super::job::{TileJob, TileJobStatus};
use super::EngineShared;
use crate::control::StopSignal;
use crate::region_db::{MarkOutcome, RegionError};
use crate::retry::{fetch_with_retry, ErrorKind, FetchError, RetryOutcome};

/// What happened to one tile job.
#[derive(Debug)]
pub(super) enum TileOutcome {
    Done(MarkOutcome),
    /// Exhausted retries or hit a non-retryable tile error.
    Failed { error: String },
    /// Connectivity is gone; don't keep trying.
    NetworkDown,
    /// Fatal to the whole run.
    Fatal(RegionError),
    /// Stop requested before the tile was fetched.
    Interrupted,
}

#[derive(Debug)]
pub(super) struct TileReport {
    pub job: TileJob,
    pub outcome: TileOutcome,
}

pub(super) async fn run_tile(
    shared: Arc<EngineShared>,
    mut job: TileJob,
    stop: Arc<StopSignal>,
) -> TileReport {
    job.status = TileJobStatus::InFlight;
    let outcome = fetch_and_record(&shared, &mut job, &stop).await;
    job.status = match outcome {
        TileOutcome::Done(_) => TileJobStatus::Done,
        TileOutcome::Failed { .. } | TileOutcome::Fatal(_) => TileJobStatus::Failed,
        TileOutcome::NetworkDown | TileOutcome::Interrupted => TileJobStatus::Queued,
    };
    TileReport { job, outcome }
}

async fn fetch_and_record(
    shared: &Arc<EngineShared>,
    job: &mut TileJob,
    stop: &StopSignal,
) -> TileOutcome {
    if !shared.gate.is_connected() {
        return TileOutcome::NetworkDown;
    }
    let coord = job.coord;
    let region = job.region_id;
    let timeout = shared.config.fetch_timeout;

    let fetched = fetch_with_retry(&shared.config.retry, stop, |attempt| {
        let source = Arc::clone(&shared.source);
        job.retry_count = attempt.saturating_sub(1);
        async move {
            let handle = tokio::task::spawn_blocking(move || source.fetch(coord));
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(FetchError::Connection(format!("fetch task failed: {}", join))),
                Err(_) => Err(FetchError::Timeout),
            }
        }
    })
    .await;

    let bytes = match fetched {
        RetryOutcome::Done(bytes) => bytes,
        RetryOutcome::Interrupted => return TileOutcome::Interrupted,
        RetryOutcome::Failed {
            error,
            kind,
            attempts,
        } => {
            tracing::debug!(region_id = region, %coord, attempts, ?kind, "tile fetch failed: {}", error);
            return match kind {
                ErrorKind::Unauthorized(status) => TileOutcome::Fatal(RegionError::SourceRejected {
                    status: u32::from(status),
                }),
                ErrorKind::Connection | ErrorKind::Timeout if !shared.gate.is_connected() => {
                    TileOutcome::NetworkDown
                }
                _ => TileOutcome::Failed {
                    error: error.to_string(),
                },
            };
        }
    };

    let cache = shared.cache.clone();
    let written = tokio::task::spawn_blocking(move || cache.write_tile(region, coord, &bytes)).await;
    let size = match written {
        Ok(Ok(size)) => size,
        Ok(Err(e)) => {
            tracing::error!(region_id = region, %coord, "tile write failed: {}", e);
            return TileOutcome::Fatal(RegionError::DiskWrite {
                message: e.to_string(),
            });
        }
        Err(join) => {
            return TileOutcome::Fatal(RegionError::DiskWrite {
                message: format!("write task failed: {}", join),
            })
        }
    };

    match shared.db.mark_tile_done(region, coord, size).await {
        Ok(mark) => TileOutcome::Done(mark),
        Err(e) => {
            tracing::error!(region_id = region, %coord, "ledger update failed: {:#}", e);
            // An unrecorded tile must not stay on disk.
            let cache = shared.cache.clone();
            match tokio::task::spawn_blocking(move || cache.remove_tile(region, coord)).await {
                Ok(Ok(())) => {}
                Ok(Err(rm)) => {
                    tracing::warn!(region_id = region, %coord, "could not remove unrecorded tile: {}", rm)
                }
                Err(join) => {
                    tracing::warn!(region_id = region, %coord, "tile removal task failed: {}", join)
                }
            }
            TileOutcome::Fatal(RegionError::DiskWrite {
                message: format!("ledger update failed: {}", e),
            })
        }
    }
}
