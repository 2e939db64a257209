//! Region write operations: add, state transitions, recovery, remove.

use anyhow::Result;

use super::super::db::{unix_timestamp, RegionDb};
use super::super::types::{OfflineMapRegion, RegionError, RegionId, RegionState};
use crate::tile::{count_tiles, GeoRect, ZoomRange};

fn error_json(error: Option<&RegionError>) -> Result<Option<String>> {
    Ok(error.map(serde_json::to_string).transpose()?)
}

impl RegionDb {
    /// Insert a new `pending` region. `total_tiles` is derived from bounds x zoom range.
    ///
    /// Inputs are expected to be validated already (see `GeoRect::new` / `ZoomRange::new`).
    pub async fn add_region(
        &self,
        name: &str,
        bounds: &GeoRect,
        zoom_range: ZoomRange,
    ) -> Result<OfflineMapRegion> {
        let now = unix_timestamp();
        let total_tiles = count_tiles(bounds, zoom_range);

        let id = sqlx::query(
            r#"
            INSERT INTO regions (
                name, min_lat, min_lon, max_lat, max_lon, min_zoom, max_zoom,
                total_tiles, downloaded_tiles, byte_size, state, error_json,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                      ?8, 0, 0, ?9, NULL,
                      ?10, ?11)
            "#,
        )
        .bind(name)
        .bind(bounds.min_lat)
        .bind(bounds.min_lon)
        .bind(bounds.max_lat)
        .bind(bounds.max_lon)
        .bind(i64::from(zoom_range.min))
        .bind(i64::from(zoom_range.max))
        .bind(total_tiles as i64)
        .bind(RegionState::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(OfflineMapRegion {
            id,
            name: name.to_string(),
            bounds: *bounds,
            zoom_range,
            total_tiles,
            downloaded_tiles: 0,
            byte_size: 0,
            state: RegionState::Pending,
            error: None,
            created_at: now,
        })
    }

    /// Move a region to `downloading`, clearing the last error.
    ///
    /// Refuses (returns false) if the region is missing, already completed,
    /// already downloading, or any other region is downloading, so the
    /// single-active-job rule also holds across processes sharing the store.
    pub async fn begin_download(&self, id: RegionId) -> Result<bool> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE regions
            SET state = 'downloading',
                error_json = NULL,
                updated_at = ?1
            WHERE id = ?2
              AND state NOT IN ('completed', 'downloading')
              AND NOT EXISTS (
                  SELECT 1 FROM regions WHERE state = 'downloading'
              )
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Record how a run ended. Never overrides `completed` (set by the ledger).
    /// Returns false if the region is gone or already completed.
    pub async fn finish_run(
        &self,
        id: RegionId,
        state: RegionState,
        error: Option<&RegionError>,
    ) -> Result<bool> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE regions
            SET state = ?1,
                error_json = ?2,
                updated_at = ?3
            WHERE id = ?4
              AND state != 'completed'
            "#,
        )
        .bind(state.as_str())
        .bind(error_json(error)?)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Mark a region `completed` if every tile is already in the ledger.
    /// Used when a (re)start finds nothing left to fetch.
    pub async fn complete_if_full(&self, id: RegionId) -> Result<bool> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE regions
            SET state = 'completed',
                error_json = NULL,
                updated_at = ?1
            WHERE id = ?2
              AND downloaded_tiles >= total_tiles
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 1)
    }

    /// Normalize any region left in `downloading` to `paused` (e.g. after a crash).
    /// Returns the number of regions reset.
    pub async fn recover_downloading_regions(&self) -> Result<u64> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE regions
            SET state = 'paused',
                updated_at = ?1
            WHERE state = 'downloading'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    /// Remove a region and its ledger rows in one transaction.
    /// Returns false if the region did not exist.
    ///
    /// Tile files are handled by the cache; see `DownloadManager::delete_region`.
    pub async fn remove_region(&self, id: RegionId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(r#"DELETE FROM tiles WHERE region_id = ?1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let r = sqlx::query(r#"DELETE FROM regions WHERE id = ?1"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(r.rows_affected() == 1)
    }
}
