//! `omap download <id>` – download a region in the foreground.
//!
//! Owns the manager for the duration of the run, serves the control socket
//! (pause/cancel/delete from other shells), prints progress, and pauses
//! cleanly on Ctrl-C.

use anyhow::Result;
use omap_core::accountant::format_bytes;
use omap_core::config::OmapConfig;
use omap_core::engine::StartOutcome;
use omap_core::events::ManagerEvent;
use omap_core::network::NetworkGate;
use omap_core::region_db::RegionState;
use omap_core::DownloadManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;

use super::live_download;
use crate::cli::control_socket;

const PROGRESS_INTERVAL_MS: u64 = 500;
const PROBE_INTERVAL: Duration = Duration::from_secs(5);
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn run_download(cfg: &OmapConfig, id: i64) -> Result<()> {
    let (socket_path, running) = live_download().await;
    if running {
        anyhow::bail!("another `omap download` is already running");
    }

    let gate = NetworkGate::new(true);
    let manager = Arc::new(DownloadManager::from_config(cfg, gate.clone(), true).await?);
    let probe = cfg
        .probe_addr()
        .map(|addr| gate.spawn_tcp_probe(addr, PROBE_INTERVAL, PROBE_TIMEOUT));

    let _listener = match &socket_path {
        Some(path) => match control_socket::spawn_control_listener(Arc::clone(&manager), path) {
            Ok(l) => {
                tracing::debug!(path = %path.display(), "control socket listening");
                Some(l)
            }
            Err(e) => {
                tracing::warn!("control socket unavailable: {:#}", e);
                None
            }
        },
        None => None,
    };

    let mut events = manager.subscribe();
    match manager.start_download(id).await? {
        StartOutcome::AlreadyComplete => {
            println!("Region {id} is already complete.");
            return Ok(());
        }
        StartOutcome::Started { queued } => {
            println!("Downloading region {id}: {queued} tile(s) to fetch. Ctrl-C to pause.");
        }
    }

    let started = Instant::now();
    let mut last_print = Instant::now();
    let mut interrupted = false;
    let run = manager.wait_for_run();
    tokio::pin!(run);
    loop {
        tokio::select! {
            _ = &mut run => break,
            event = events.recv() => match event {
                Ok(ManagerEvent::Progress { id: region, downloaded_tiles, total_tiles, byte_size }) if region == id => {
                    let now = Instant::now();
                    if now.duration_since(last_print).as_millis() as u64 >= PROGRESS_INTERVAL_MS
                        || downloaded_tiles >= total_tiles
                    {
                        let pct = downloaded_tiles as f64 * 100.0 / total_tiles.max(1) as f64;
                        let rate = downloaded_tiles as f64 / started.elapsed().as_secs_f64().max(0.001);
                        println!(
                            "  {}/{} tiles ({:.1}%)  {}  {:.1} tiles/s",
                            downloaded_tiles, total_tiles, pct, format_bytes(byte_size), rate
                        );
                        last_print = now;
                    }
                }
                Ok(ManagerEvent::TileFailed { coord, reason, .. }) => {
                    eprintln!("  tile {} failed: {}", coord, reason);
                }
                Ok(ManagerEvent::NetworkUnavailable { .. }) => {
                    eprintln!("  network unavailable; pausing");
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => tracing::debug!(skipped, "progress display lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                println!("\nPausing...");
                if let Err(e) = manager.pause_download().await {
                    tracing::debug!("pause on Ctrl-C: {}", e);
                }
            }
        }
    }

    if let Some(probe) = probe {
        probe.abort();
    }

    match manager.region(id).await {
        Ok(region) => {
            let error = region
                .error
                .as_ref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default();
            println!(
                "Region {} {} ({}/{} tiles, {}){}",
                id,
                region.state.as_str(),
                region.downloaded_tiles,
                region.total_tiles,
                format_bytes(region.byte_size),
                error
            );
            if region.state == RegionState::Paused {
                println!("Run `omap download {id}` again to resume.");
            }
        }
        // Deleted over the control socket while running.
        Err(omap_core::ManagerError::NotFound(_)) => println!("Region {id} was deleted."),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
