//! `omap pause <id>` / `omap cancel <id>` – signal a running `omap download`.

use anyhow::Result;

use super::live_download;
use crate::cli::control_socket::{self, ControlRequest};

pub async fn run_pause(id: i64) -> Result<()> {
    send(ControlRequest::Pause(id)).await?;
    println!("Paused region {id}");
    Ok(())
}

pub async fn run_cancel(id: i64) -> Result<()> {
    send(ControlRequest::Cancel(id)).await?;
    println!("Cancelled region {id}");
    Ok(())
}

async fn send(request: ControlRequest) -> Result<()> {
    match live_download().await {
        (Some(path), true) => control_socket::send(&path, request).await,
        _ => anyhow::bail!("no `omap download` is running"),
    }
}
