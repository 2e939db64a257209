//! Disk usage accounting derived from the region registry.
//!
//! Sizes come from the ledger-maintained `byte_size` counters, recomputed on
//! demand; there is no separate cache to go stale.

use anyhow::Result;

use crate::region_db::{RegionDb, RegionId};

/// Per-region line of a usage report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionUsage {
    pub id: RegionId,
    pub name: String,
    pub byte_size: u64,
}

/// Storage usage across all regions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UsageReport {
    pub total_bytes: u64,
    pub regions: Vec<RegionUsage>,
}

#[derive(Clone)]
pub struct StorageAccountant {
    db: RegionDb,
}

impl StorageAccountant {
    pub fn new(db: RegionDb) -> Self {
        Self { db }
    }

    /// Sum of `byte_size` over every region.
    pub async fn total_storage_used(&self) -> Result<u64> {
        self.db.total_byte_size().await
    }

    /// Bytes stored for one region, `None` if the region is unknown.
    pub async fn region_size(&self, id: RegionId) -> Result<Option<u64>> {
        self.db.region_byte_size(id).await
    }

    /// Usage per region (largest first) plus the total, from one listing.
    pub async fn report(&self) -> Result<UsageReport> {
        let mut regions: Vec<RegionUsage> = self
            .db
            .list_regions()
            .await?
            .into_iter()
            .map(|r| RegionUsage {
                id: r.id,
                name: r.name,
                byte_size: r.byte_size,
            })
            .collect();
        regions.sort_by(|a, b| b.byte_size.cmp(&a.byte_size).then(a.id.cmp(&b.id)));
        let total_bytes = regions.iter().map(|r| r.byte_size).sum();
        Ok(UsageReport {
            total_bytes,
            regions,
        })
    }
}

/// Human-readable byte count (binary units).
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
