//! `omap usage` – disk usage per region and in total.

use anyhow::Result;
use omap_core::accountant::{format_bytes, StorageAccountant};
use omap_core::region_db::RegionDb;

pub async fn run_usage() -> Result<()> {
    let db = RegionDb::open_default().await?;
    let report = StorageAccountant::new(db).report().await?;
    for r in &report.regions {
        println!("{:<6} {:>10}  {}", r.id, format_bytes(r.byte_size), r.name);
    }
    println!("Total: {}", format_bytes(report.total_bytes));
    Ok(())
}
