//! Region read operations: list, get, aggregates.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::super::db::RegionDb;
use super::super::types::{OfflineMapRegion, RegionError, RegionId, RegionState};
use crate::tile::{GeoRect, ZoomRange};

const REGION_COLUMNS: &str = r#"
    id, name, min_lat, min_lon, max_lat, max_lon, min_zoom, max_zoom,
    total_tiles, downloaded_tiles, byte_size, state, error_json, created_at
"#;

fn region_from_row(row: &SqliteRow) -> Result<OfflineMapRegion> {
    let state_str: String = row.get("state");
    let error_json: Option<String> = row.get("error_json");
    let error = error_json
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(serde_json::from_str::<RegionError>)
        .transpose()?;
    let min_zoom: i64 = row.get("min_zoom");
    let max_zoom: i64 = row.get("max_zoom");
    let total_tiles: i64 = row.get("total_tiles");
    let downloaded_tiles: i64 = row.get("downloaded_tiles");
    let byte_size: i64 = row.get("byte_size");

    Ok(OfflineMapRegion {
        id: row.get("id"),
        name: row.get("name"),
        bounds: GeoRect {
            min_lat: row.get("min_lat"),
            min_lon: row.get("min_lon"),
            max_lat: row.get("max_lat"),
            max_lon: row.get("max_lon"),
        },
        zoom_range: ZoomRange {
            min: min_zoom as u8,
            max: max_zoom as u8,
        },
        total_tiles: total_tiles.max(0) as u64,
        downloaded_tiles: downloaded_tiles.max(0) as u64,
        byte_size: byte_size.max(0) as u64,
        state: RegionState::from_str(&state_str),
        error,
        created_at: row.get("created_at"),
    })
}

impl RegionDb {
    /// List all regions, newest first (ties broken by id so the order is stable).
    pub async fn list_regions(&self) -> Result<Vec<OfflineMapRegion>> {
        let sql = format!(
            "SELECT {} FROM regions ORDER BY created_at DESC, id DESC",
            REGION_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(region_from_row).collect()
    }

    /// Fetch a single region row.
    pub async fn get_region(&self, id: RegionId) -> Result<Option<OfflineMapRegion>> {
        let sql = format!("SELECT {} FROM regions WHERE id = ?1", REGION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(region_from_row).transpose()
    }

    /// Ids of regions currently marked `downloading` (at most one outside of crash recovery).
    pub async fn downloading_regions(&self) -> Result<Vec<RegionId>> {
        let rows = sqlx::query(r#"SELECT id FROM regions WHERE state = 'downloading'"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get::<i64, _>("id")).collect())
    }

    /// Sum of `byte_size` over all regions.
    pub async fn total_byte_size(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar(r#"SELECT COALESCE(SUM(byte_size), 0) FROM regions"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(total.max(0) as u64)
    }

    /// `byte_size` of one region, `None` if unknown.
    pub async fn region_byte_size(&self, id: RegionId) -> Result<Option<u64>> {
        let size: Option<i64> =
            sqlx::query_scalar(r#"SELECT byte_size FROM regions WHERE id = ?1"#)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(size.map(|s| s.max(0) as u64))
    }
}
