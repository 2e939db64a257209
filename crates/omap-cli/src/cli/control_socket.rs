//! Control socket: server (during `omap download`) and client (pause, cancel, delete).
//! Protocol: one request line "pause <id>", "cancel <id>" or "delete <id>";
//! one reply line "ok" or "error <message>".

use anyhow::{Context, Result};
use omap_core::region_db::RegionId;
use omap_core::{DownloadManager, ManagerError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Pause(RegionId),
    Cancel(RegionId),
    Delete(RegionId),
}

impl ControlRequest {
    pub fn parse(line: &str) -> Option<Self> {
        let (verb, id) = line.trim().split_once(' ')?;
        let id = id.trim().parse::<RegionId>().ok()?;
        match verb {
            "pause" => Some(ControlRequest::Pause(id)),
            "cancel" => Some(ControlRequest::Cancel(id)),
            "delete" => Some(ControlRequest::Delete(id)),
            _ => None,
        }
    }

    fn line(&self) -> String {
        match self {
            ControlRequest::Pause(id) => format!("pause {}\n", id),
            ControlRequest::Cancel(id) => format!("cancel {}\n", id),
            ControlRequest::Delete(id) => format!("delete {}\n", id),
        }
    }
}

/// Removes the socket file when the listener goes away.
pub struct ControlListener {
    path: PathBuf,
    task: tokio::task::JoinHandle<()>,
}

impl Drop for ControlListener {
    fn drop(&mut self) {
        self.task.abort();
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Listens on `path` and applies each request to `manager`.
pub fn spawn_control_listener(
    manager: Arc<DownloadManager>,
    path: impl AsRef<Path>,
) -> Result<ControlListener> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind control socket {}", path.display()))?;
    let task = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let manager = Arc::clone(&manager);
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut reader = BufReader::new(read).lines();
                        while let Ok(Some(line)) = reader.next_line().await {
                            let reply = match ControlRequest::parse(&line) {
                                Some(request) => match apply(&manager, request).await {
                                    Ok(()) => "ok\n".to_string(),
                                    Err(e) => format!("error {}\n", e),
                                },
                                None => format!("error malformed request: {}\n", line.trim()),
                            };
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(ControlListener { path, task })
}

async fn apply(manager: &DownloadManager, request: ControlRequest) -> Result<(), ManagerError> {
    tracing::debug!(?request, "control request");
    match request {
        ControlRequest::Pause(id) | ControlRequest::Cancel(id) => {
            let active = manager.current_download().await?.map(|r| r.id);
            if active != Some(id) {
                return Err(ManagerError::NotRunning);
            }
            if matches!(request, ControlRequest::Pause(_)) {
                manager.pause_download().await
            } else {
                manager.cancel_download().await
            }
        }
        ControlRequest::Delete(id) => manager.delete_region(id).await,
    }
}

/// True if an `omap download` is listening on `socket_path`.
pub async fn is_live(socket_path: &Path) -> bool {
    socket_path.exists() && UnixStream::connect(socket_path).await.is_ok()
}

/// Sends one request and waits for the reply line.
pub async fn send(socket_path: &Path, request: ControlRequest) -> Result<()> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to {}", socket_path.display()))?;
    let (read, mut write) = stream.into_split();
    write.write_all(request.line().as_bytes()).await?;
    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .unwrap_or_default();
    match reply.strip_prefix("error ") {
        Some(message) => anyhow::bail!("{}", message),
        None if reply == "ok" => Ok(()),
        None => anyhow::bail!("unexpected reply from control socket: {:?}", reply),
    }
}
