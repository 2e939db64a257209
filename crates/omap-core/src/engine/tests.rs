//! Engine tests against the scripted in-memory tile source.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::{EngineState, StartOutcome, TileDownloadEngine};
use crate::error::ManagerError;
use crate::events::ManagerEvent;
use crate::region_db::{OfflineMapRegion, RegionError, RegionState};
use crate::source::TileSource;
use crate::testing::{fast_config, fixture, hundred_tiles, tile_block, Fixture, ScriptedSource, TILE_LEN};
use crate::tile::{enumerate_tiles, GeoRect, TileCoord, ZoomRange};

fn engine(fx: &Fixture, source: Arc<ScriptedSource>, workers: usize) -> TileDownloadEngine {
    TileDownloadEngine::new(
        fx.db.clone(),
        fx.cache.clone(),
        source as Arc<dyn TileSource>,
        fx.gate.clone(),
        fx.events.clone(),
        fast_config(workers),
    )
}

fn dc() -> (GeoRect, ZoomRange) {
    (
        GeoRect::new(38.80, -77.10, 39.00, -76.90).unwrap(),
        ZoomRange::new(10, 12).unwrap(),
    )
}

async fn add(fx: &Fixture, name: &str, (bounds, zooms): (GeoRect, ZoomRange)) -> OfflineMapRegion {
    fx.db.add_region(name, &bounds, zooms).await.unwrap()
}

async fn wait_for_progress(rx: &mut broadcast::Receiver<ManagerEvent>, downloaded: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let ManagerEvent::Progress {
                downloaded_tiles, ..
            } = rx.recv().await.unwrap()
            {
                if downloaded_tiles == downloaded {
                    return;
                }
            }
        }
    })
    .await
    .expect("progress event");
}

async fn join(engine: &TileDownloadEngine) {
    tokio::time::timeout(Duration::from_secs(10), engine.join())
        .await
        .expect("run finished");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn downloads_every_tile_and_completes() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new());
    let engine = engine(&fx, Arc::clone(&source), 4);
    let region = add(&fx, "DC", dc()).await;
    let mut rx = fx.events.subscribe();

    let outcome = engine.start(region.id).await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { queued: 26 });
    join(&engine).await;

    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Completed);
    assert_eq!(stored.downloaded_tiles, 26);
    assert_eq!(stored.byte_size, 26 * TILE_LEN as u64);
    assert_eq!(stored.error, None);
    assert_eq!(engine.state().await, EngineState::Idle);

    for coord in enumerate_tiles(&region.bounds, region.zoom_range) {
        assert!(fx.cache.has_tile(region.id, coord), "missing {}", coord);
        assert_eq!(source.calls_for(coord), 1);
    }

    let mut last_progress = 0;
    let mut final_state = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            ManagerEvent::Progress {
                downloaded_tiles, ..
            } => {
                assert!(downloaded_tiles > last_progress);
                last_progress = downloaded_tiles;
            }
            ManagerEvent::StateChanged { state, .. } => final_state = Some(state),
            _ => {}
        }
    }
    assert_eq!(last_progress, 26);
    assert_eq!(final_state, Some(RegionState::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_then_resume_fetches_only_the_rest() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new().hold_after(40));
    let engine = engine(&fx, Arc::clone(&source), 1);
    let region = add(&fx, "hundred", hundred_tiles()).await;
    assert_eq!(region.total_tiles, 100);
    let mut rx = fx.events.subscribe();

    engine.start(region.id).await.unwrap();
    wait_for_progress(&mut rx, 40).await;
    engine.pause().await.unwrap();
    source.release();

    let paused = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(paused.state, RegionState::Paused);
    assert_eq!(paused.downloaded_tiles, 40);
    assert_eq!(paused.error, None);
    assert_eq!(engine.state().await, EngineState::Paused(region.id));
    let first_run = fx.db.done_tiles(region.id).await.unwrap();
    assert_eq!(first_run.len(), 40);

    let outcome = engine.resume().await.unwrap();
    assert_eq!(outcome, StartOutcome::Started { queued: 60 });
    join(&engine).await;

    let done = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(done.state, RegionState::Completed);
    assert_eq!(done.downloaded_tiles, 100);
    for coord in first_run {
        assert_eq!(source.calls_for(coord), 1, "{} fetched again", coord);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn network_loss_pauses_with_reason() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new().drop_network_on_call(31, fx.gate.clone()));
    let engine = engine(&fx, Arc::clone(&source), 1);
    let region = add(&fx, "hundred", hundred_tiles()).await;
    let mut rx = fx.events.subscribe();

    engine.start(region.id).await.unwrap();
    join(&engine).await;

    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Paused);
    assert_eq!(stored.error, Some(RegionError::NetworkUnavailable));
    assert_eq!(stored.downloaded_tiles, 30);
    assert_eq!(engine.state().await, EngineState::Paused(region.id));

    let mut saw_network_event = false;
    while let Ok(event) = rx.try_recv() {
        if event == (ManagerEvent::NetworkUnavailable { id: region.id }) {
            saw_network_event = true;
        }
    }
    assert!(saw_network_event);

    assert!(matches!(engine.resume().await, Err(ManagerError::NoConnectivity)));

    fx.gate.set_connected(true);
    assert_eq!(
        engine.resume().await.unwrap(),
        StartOutcome::Started { queued: 70 }
    );
    join(&engine).await;
    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Completed);
    assert_eq!(stored.downloaded_tiles, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_region_is_refused_while_busy() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new().hold_after(0));
    let engine = engine(&fx, Arc::clone(&source), 2);
    let a = add(&fx, "a", dc()).await;
    let b = add(&fx, "b", dc()).await;

    engine.start(a.id).await.unwrap();
    assert_eq!(engine.active_region().await, Some(a.id));
    match engine.start(b.id).await {
        Err(ManagerError::EngineBusy { active }) => assert_eq!(active, a.id),
        other => panic!("expected EngineBusy, got {:?}", other),
    }
    let b_stored = fx.db.get_region(b.id).await.unwrap().unwrap();
    assert_eq!(b_stored.state, RegionState::Pending);

    engine.cancel().await.unwrap();
    source.release();
    assert_eq!(engine.state().await, EngineState::Idle);
    let a_stored = fx.db.get_region(a.id).await.unwrap().unwrap();
    assert_eq!(a_stored.state, RegionState::Cancelled);

    engine.start(b.id).await.unwrap();
    join(&engine).await;
    let b_stored = fx.db.get_region(b.id).await.unwrap().unwrap();
    assert_eq!(b_stored.state, RegionState::Completed);
}

#[tokio::test]
async fn start_without_connectivity_is_refused() {
    let fx = fixture().await;
    fx.gate.set_connected(false);
    let source = Arc::new(ScriptedSource::new());
    let engine = engine(&fx, Arc::clone(&source), 2);
    let region = add(&fx, "DC", dc()).await;

    assert!(matches!(
        engine.start(region.id).await,
        Err(ManagerError::NoConnectivity)
    ));
    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Pending);
    assert_eq!(source.total_calls(), 0);
    assert_eq!(engine.state().await, EngineState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_tiles_pause_then_complete_on_retry() {
    let fx = fixture().await;
    let (bounds, zooms) = dc();
    let bad: Vec<_> = enumerate_tiles(&bounds, zooms).skip(5).take(3).collect();
    let source = Arc::new(ScriptedSource::new().failing(bad.clone()));
    let engine = engine(&fx, Arc::clone(&source), 3);
    let region = add(&fx, "DC", (bounds, zooms)).await;

    engine.start(region.id).await.unwrap();
    join(&engine).await;

    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Paused);
    assert_eq!(stored.error, Some(RegionError::TilesFailed { count: 3 }));
    assert_eq!(stored.downloaded_tiles, 23);
    for coord in &bad {
        assert!(!fx.cache.has_tile(region.id, *coord));
    }

    source.heal();
    assert_eq!(
        engine.resume().await.unwrap(),
        StartOutcome::Started { queued: 3 }
    );
    join(&engine).await;
    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Completed);
    assert_eq!(stored.error, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_source_stops_the_run() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new().rejecting(403));
    let engine = engine(&fx, Arc::clone(&source), 2);
    let region = add(&fx, "DC", dc()).await;

    engine.start(region.id).await.unwrap();
    join(&engine).await;

    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Paused);
    assert_eq!(stored.error, Some(RegionError::SourceRejected { status: 403 }));
    assert_eq!(stored.downloaded_tiles, 0);
    // No retries, and no new tiles once the first rejection lands.
    assert!(source.total_calls() < 26);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_keeps_tiles_and_restart_continues() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new().hold_after(10));
    let engine = engine(&fx, Arc::clone(&source), 1);
    let region = add(&fx, "DC", dc()).await;
    let mut rx = fx.events.subscribe();

    engine.start(region.id).await.unwrap();
    wait_for_progress(&mut rx, 10).await;
    engine.cancel().await.unwrap();
    source.release();

    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Cancelled);
    assert_eq!(stored.downloaded_tiles, 10);
    assert_eq!(engine.state().await, EngineState::Idle);
    assert!(matches!(engine.resume().await, Err(ManagerError::NothingToResume)));

    assert_eq!(
        engine.start(region.id).await.unwrap(),
        StartOutcome::Started { queued: 16 }
    );
    join(&engine).await;
    assert_eq!(
        fx.db.get_region(region.id).await.unwrap().unwrap().state,
        RegionState::Completed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_from_paused_releases_engine() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new().hold_after(5));
    let engine = engine(&fx, Arc::clone(&source), 1);
    let a = add(&fx, "a", dc()).await;
    let b = add(&fx, "b", dc()).await;
    let mut rx = fx.events.subscribe();

    engine.start(a.id).await.unwrap();
    wait_for_progress(&mut rx, 5).await;
    engine.pause().await.unwrap();
    source.release();
    assert!(matches!(
        engine.start(b.id).await,
        Err(ManagerError::EngineBusy { active }) if active == a.id
    ));

    engine.cancel().await.unwrap();
    assert_eq!(engine.state().await, EngineState::Idle);
    assert_eq!(
        fx.db.get_region(a.id).await.unwrap().unwrap().state,
        RegionState::Cancelled
    );
    engine.start(b.id).await.unwrap();
    join(&engine).await;
}

#[tokio::test]
async fn controls_without_a_run() {
    let fx = fixture().await;
    let engine = engine(&fx, Arc::new(ScriptedSource::new()), 2);
    assert!(matches!(engine.pause().await, Err(ManagerError::NotRunning)));
    assert!(matches!(engine.cancel().await, Err(ManagerError::NotRunning)));
    assert!(matches!(engine.resume().await, Err(ManagerError::NothingToResume)));
    assert!(matches!(engine.start(99).await, Err(ManagerError::NotFound(99))));
    engine.join().await;
}

#[tokio::test]
async fn fully_recorded_region_completes_without_fetching() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new());
    let engine = engine(&fx, Arc::clone(&source), 2);
    let region = add(&fx, "DC", dc()).await;
    for coord in enumerate_tiles(&region.bounds, region.zoom_range) {
        fx.db.mark_tile_done(region.id, coord, 1).await.unwrap();
    }
    // The ledger already flipped it to completed.
    assert_eq!(
        engine.start(region.id).await.unwrap(),
        StartOutcome::AlreadyComplete
    );
    assert_eq!(source.total_calls(), 0);
    assert_eq!(engine.state().await, EngineState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disk_write_failure_pauses_and_keeps_ledger_clean() {
    let fx = fixture().await;
    let source = Arc::new(ScriptedSource::new());
    let engine = engine(&fx, Arc::clone(&source), 2);
    let region = add(&fx, "DC", dc()).await;
    // A plain file where the region directory should go: every write fails.
    let blocker = fx.cache.region_dir(region.id);
    std::fs::write(&blocker, b"not a directory").unwrap();

    engine.start(region.id).await.unwrap();
    join(&engine).await;

    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Paused);
    assert!(
        matches!(stored.error, Some(RegionError::DiskWrite { .. })),
        "error: {:?}",
        stored.error
    );
    assert_eq!(stored.downloaded_tiles, 0);
    assert_eq!(stored.byte_size, 0);
    assert_eq!(engine.state().await, EngineState::Paused(region.id));

    // Once the disk is usable again, nothing was skipped.
    std::fs::remove_file(&blocker).unwrap();
    assert_eq!(engine.resume().await.unwrap(), StartOutcome::Started { queued: 26 });
    join(&engine).await;
    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Completed);
    assert_eq!(stored.downloaded_tiles, 26);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_tile_times_out_and_is_retried() {
    let fx = fixture().await;
    let (bounds, zooms) = tile_block(12, 1000, 1500, 2);
    let slow = TileCoord::new(12, 1001, 1500);
    let source = Arc::new(ScriptedSource::new().slow(slow, Duration::from_millis(400)));
    let mut config = fast_config(2);
    config.fetch_timeout = Duration::from_millis(50);
    let engine = TileDownloadEngine::new(
        fx.db.clone(),
        fx.cache.clone(),
        Arc::clone(&source) as Arc<dyn TileSource>,
        fx.gate.clone(),
        fx.events.clone(),
        config,
    );
    let region = add(&fx, "block", (bounds, zooms)).await;
    let mut rx = fx.events.subscribe();

    assert_eq!(engine.start(region.id).await.unwrap(), StartOutcome::Started { queued: 4 });
    join(&engine).await;

    // Two attempts per the retry policy, both cut off by the per-tile deadline.
    assert_eq!(source.calls_for(slow), 2);
    let stored = fx.db.get_region(region.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RegionState::Paused);
    assert_eq!(stored.error, Some(RegionError::TilesFailed { count: 1 }));
    assert_eq!(stored.downloaded_tiles, 3);
    assert!(!fx.cache.has_tile(region.id, slow));

    let mut failed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ManagerEvent::TileFailed { coord, .. } = event {
            failed.push(coord);
        }
    }
    assert_eq!(failed, vec![slow]);
}
