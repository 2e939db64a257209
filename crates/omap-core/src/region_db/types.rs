//! Types used by the region database.

use serde::{Deserialize, Serialize};

use crate::tile::{GeoRect, ZoomRange};

/// Region identifier.
pub type RegionId = i64;

/// Lifecycle state stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionState {
    Pending,
    Downloading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl RegionState {
    pub fn as_str(self) -> &'static str {
        match self {
            RegionState::Pending => "pending",
            RegionState::Downloading => "downloading",
            RegionState::Paused => "paused",
            RegionState::Completed => "completed",
            RegionState::Cancelled => "cancelled",
            RegionState::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => RegionState::Pending,
            "downloading" => RegionState::Downloading,
            "paused" => RegionState::Paused,
            "completed" => RegionState::Completed,
            "cancelled" => RegionState::Cancelled,
            _ => RegionState::Failed,
        }
    }
}

/// Why the last run stopped short, persisted as JSON next to the region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionError {
    /// Connectivity dropped mid-run; resume once the network is back.
    NetworkUnavailable,
    /// All tiles were attempted but some exhausted their retries.
    TilesFailed { count: u64 },
    /// Writing a tile to the cache failed (disk full, permissions, ...).
    DiskWrite { message: String },
    /// The tile source refused us (auth / forbidden); retrying won't help until fixed.
    SourceRejected { status: u32 },
}

impl std::fmt::Display for RegionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegionError::NetworkUnavailable => write!(f, "network unavailable"),
            RegionError::TilesFailed { count } => write!(f, "{} tile(s) failed", count),
            RegionError::DiskWrite { message } => write!(f, "disk write failed: {}", message),
            RegionError::SourceRejected { status } => {
                write!(f, "tile source rejected requests (HTTP {})", status)
            }
        }
    }
}

/// Full region record.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineMapRegion {
    pub id: RegionId,
    pub name: String,
    pub bounds: GeoRect,
    pub zoom_range: ZoomRange,
    pub total_tiles: u64,
    pub downloaded_tiles: u64,
    pub byte_size: u64,
    pub state: RegionState,
    pub error: Option<RegionError>,
    /// Unix seconds.
    pub created_at: i64,
}

impl OfflineMapRegion {
    pub fn summary(&self) -> RegionSummary {
        RegionSummary {
            id: self.id,
            name: self.name.clone(),
            state: self.state,
            downloaded_tiles: self.downloaded_tiles,
            total_tiles: self.total_tiles,
            byte_size: self.byte_size,
            created_at: self.created_at,
            error: self.error.clone(),
        }
    }
}

/// Summary view handed to UIs (`list`, `current_download`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub id: RegionId,
    pub name: String,
    pub state: RegionState,
    pub downloaded_tiles: u64,
    pub total_tiles: u64,
    pub byte_size: u64,
    pub created_at: i64,
    pub error: Option<RegionError>,
}

impl RegionSummary {
    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_tiles == 0 {
            return 1.0;
        }
        (self.downloaded_tiles as f64 / self.total_tiles as f64).min(1.0)
    }
}
