//! Job control for pause/cancel: a shared stop signal per download run.
//!
//! The engine hands one `StopSignal` to the supervisor and every worker of a
//! run. Pause, cancel, and connectivity loss all go through it; workers
//! observe it at the network boundary and between retries.

use std::path::PathBuf;
use tokio::sync::watch;

/// Why a run is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// User pause; region ends `Paused`.
    Pause,
    /// User cancel; region ends `Cancelled`.
    Cancel,
    /// Connectivity dropped; region ends `Paused` with a network error.
    NetworkLost,
    /// Job-level failure (disk write, source rejected); region ends `Paused` with the error.
    Fatal,
}

/// Shared stop request for one run.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<Option<StopReason>>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Request a stop. The first reason wins, except that `Cancel` overrides
    /// any other pending reason. Returns true if the recorded reason changed.
    pub fn request(&self, reason: StopReason) -> bool {
        self.tx.send_if_modified(|current| match *current {
            None => {
                *current = Some(reason);
                true
            }
            Some(StopReason::Pause | StopReason::NetworkLost | StopReason::Fatal)
                if reason == StopReason::Cancel =>
            {
                *current = Some(reason);
                true
            }
            Some(_) => false,
        })
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once any stop has been requested.
    pub async fn stopped(&self) -> StopReason {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Sender is owned by `self`; unreachable while borrowed.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Unix socket a foreground `omap download` listens on for pause/cancel.
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("omap")?.get_state_home();
    Ok(dir.join("control.sock"))
}
