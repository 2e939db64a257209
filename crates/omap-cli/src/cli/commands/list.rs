//! `omap list` – show all regions.

use anyhow::Result;
use omap_core::accountant::format_bytes;
use omap_core::region_db::RegionDb;

pub async fn run_list() -> Result<()> {
    let db = RegionDb::open_default().await?;
    let regions = db.list_regions().await?;
    if regions.is_empty() {
        println!("No regions.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:<14} {:>10} {:>7} {}",
        "ID", "STATE", "TILES", "SIZE", "DONE", "NAME"
    );
    for r in regions {
        let summary = r.summary();
        let tiles = format!("{}/{}", summary.downloaded_tiles, summary.total_tiles);
        let error = summary
            .error
            .as_ref()
            .map(|e| format!("  ({})", e))
            .unwrap_or_default();
        println!(
            "{:<6} {:<12} {:<14} {:>10} {:>6.1}% {}{}",
            summary.id,
            summary.state.as_str(),
            tiles,
            format_bytes(summary.byte_size),
            summary.fraction() * 100.0,
            summary.name,
            error
        );
    }
    Ok(())
}
