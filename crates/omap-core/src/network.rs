//! Connectivity gate with push notifications on transitions.
//!
//! The gate only records what some probe (OS callback, periodic TCP check,
//! test harness) tells it. The engine refuses to start while it is closed and
//! treats a transition to closed as an automatic pause.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Shared connectivity flag. Clones observe the same state.
#[derive(Clone, Debug)]
pub struct NetworkGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for NetworkGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NetworkGate {
    pub fn new(connected: bool) -> Self {
        let (tx, _rx) = watch::channel(connected);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_connected(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update connectivity; subscribers are only woken on an actual transition.
    pub fn set_connected(&self, connected: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == connected {
                false
            } else {
                *current = connected;
                true
            }
        });
        if changed {
            if connected {
                tracing::info!("network connectivity restored");
            } else {
                tracing::warn!("network connectivity lost");
            }
        }
    }

    /// Receiver that wakes on every connectivity transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolves once the gate is open.
    pub async fn wait_until_connected(&self) {
        let mut rx = self.subscribe();
        // The sender lives as long as `self`, so this only errors if it is dropped.
        let _ = rx.wait_for(|connected| *connected).await;
    }

    /// Periodically probe `host:port` with a TCP connect and feed the result into the gate.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_tcp_probe(
        &self,
        addr: String,
        interval: Duration,
        timeout: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let ok = matches!(
                    tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr.as_str())).await,
                    Ok(Ok(_))
                );
                tracing::trace!(addr = %addr, ok, "connectivity probe");
                gate.set_connected(ok);
            }
        })
    }
}
