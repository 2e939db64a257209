//! Caller-facing error taxonomy for the download manager.

use crate::region_db::RegionId;
use crate::tile::BoundsError;

/// Errors returned by [`crate::DownloadManager`] operations.
///
/// Every variant is distinguishable so callers can branch on the kind
/// instead of parsing messages.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// Degenerate bounds or a bad zoom range. Never retried.
    #[error("invalid region bounds: {0}")]
    InvalidBounds(#[from] BoundsError),
    /// Another region owns the engine (running, draining, or paused).
    #[error("download engine is busy with region {active}")]
    EngineBusy { active: RegionId },
    /// The network gate is closed; not retried automatically.
    #[error("no network connectivity")]
    NoConnectivity,
    #[error("region {0} not found")]
    NotFound(RegionId),
    #[error("no download is running")]
    NotRunning,
    #[error("no paused download to resume")]
    NothingToResume,
    /// Tile cache could not be modified (e.g. during delete).
    #[error("tile cache I/O failed: {0}")]
    DiskWrite(#[source] std::io::Error),
    /// Metadata store or other internal failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ManagerError {
    /// True for errors caused by the caller's input rather than system state.
    pub fn is_user_error(&self) -> bool {
        matches!(self, ManagerError::InvalidBounds(_) | ManagerError::NotFound(_))
    }
}

pub type ManagerResult<T> = std::result::Result<T, ManagerError>;
