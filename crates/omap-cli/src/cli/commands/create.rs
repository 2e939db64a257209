//! `omap create` – register a region.

use anyhow::Result;
use omap_core::accountant::format_bytes;
use omap_core::config::OmapConfig;
use omap_core::tile::GeoRect;

use super::{live_download, open_manager};

/// Rough per-tile size for the download estimate.
const TYPICAL_TILE_BYTES: u64 = 20 * 1024;

pub async fn run_create(cfg: &OmapConfig, name: &str, bounds: GeoRect, zoom: (u8, u8)) -> Result<()> {
    let (_, running) = live_download().await;
    let manager = open_manager(cfg, running).await?;
    let id = manager.create_region(name, bounds, zoom).await?;
    let summary = manager.region(id).await?;
    println!(
        "Created region {} \"{}\": {} tiles (zoom {}-{}), ~{} to download",
        id,
        summary.name,
        summary.total_tiles,
        zoom.0,
        zoom.1,
        format_bytes(summary.total_tiles.saturating_mul(TYPICAL_TILE_BYTES))
    );
    Ok(())
}
