//! CLI command handlers, one file per command.

mod control;
mod create;
mod delete;
mod download;
mod list;
mod usage;

pub use control::{run_cancel, run_pause};
pub use create::run_create;
pub use delete::run_delete;
pub use download::run_download;
pub use list::run_list;
pub use usage::run_usage;

use omap_core::config::OmapConfig;
use omap_core::network::NetworkGate;
use omap_core::DownloadManager;
use std::path::PathBuf;

use crate::cli::control_socket;

/// Control socket path and whether an `omap download` is listening on it.
async fn live_download() -> (Option<PathBuf>, bool) {
    match omap_core::control::default_control_socket_path() {
        Ok(path) => {
            let live = control_socket::is_live(&path).await;
            (Some(path), live)
        }
        Err(_) => (None, false),
    }
}

/// Manager for a short-lived command. Startup reconciliation is skipped while
/// another process is downloading, so its region is not reset under it.
async fn open_manager(cfg: &OmapConfig, download_running: bool) -> anyhow::Result<DownloadManager> {
    DownloadManager::from_config(cfg, NetworkGate::new(true), !download_running).await
}
