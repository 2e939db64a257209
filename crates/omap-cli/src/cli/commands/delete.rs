//! `omap delete <id>` – remove a region and its tiles.

use anyhow::Result;
use omap_core::config::OmapConfig;

use super::{live_download, open_manager};
use crate::cli::control_socket::{self, ControlRequest};

pub async fn run_delete(cfg: &OmapConfig, id: i64) -> Result<()> {
    let (socket, running) = live_download().await;
    match socket {
        // The downloading process owns the engine; let it cancel and delete.
        Some(path) if running => control_socket::send(&path, ControlRequest::Delete(id)).await?,
        _ => {
            let manager = open_manager(cfg, false).await?;
            manager.delete_region(id).await?;
        }
    }
    println!("Deleted region {id}");
    Ok(())
}
