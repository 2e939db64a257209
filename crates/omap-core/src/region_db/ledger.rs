//! Tile ledger: which tiles of a region are downloaded, and their sizes.

use anyhow::Result;
use sqlx::Row;
use std::collections::HashSet;

use super::db::{unix_timestamp, RegionDb};
use super::types::{RegionId, RegionState};
use crate::tile::TileCoord;

/// Result of recording a tile, as seen inside the recording transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkOutcome {
    /// False if the tile was already in the ledger (nothing changed).
    pub newly_done: bool,
    /// Region state after the update.
    pub state: RegionState,
    pub downloaded_tiles: u64,
    pub total_tiles: u64,
    pub byte_size: u64,
}

impl MarkOutcome {
    pub fn completed(&self) -> bool {
        self.state == RegionState::Completed
    }
}

impl RegionDb {
    /// Record a tile as downloaded. Idempotent: a tile already in the ledger is a no-op.
    ///
    /// Ledger row, counters, and the `completed` transition are one transaction,
    /// so readers never see `downloaded_tiles` and `byte_size` disagree.
    /// Fails if the region does not exist.
    pub async fn mark_tile_done(
        &self,
        id: RegionId,
        coord: TileCoord,
        bytes: u64,
    ) -> Result<MarkOutcome> {
        let now = unix_timestamp();
        let mut tx = self.pool.begin().await?;

        // Insert first so the transaction takes the write lock up front.
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tiles (region_id, zoom, x, y, bytes)
            SELECT ?1, ?2, ?3, ?4, ?5
            WHERE EXISTS (SELECT 1 FROM regions WHERE id = ?1)
            "#,
        )
        .bind(id)
        .bind(i64::from(coord.zoom))
        .bind(i64::from(coord.x))
        .bind(i64::from(coord.y))
        .bind(bytes as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            sqlx::query(
                r#"
                UPDATE regions
                SET downloaded_tiles = downloaded_tiles + 1,
                    byte_size = byte_size + ?1,
                    state = CASE
                        WHEN downloaded_tiles + 1 >= total_tiles THEN 'completed'
                        ELSE state
                    END,
                    error_json = CASE
                        WHEN downloaded_tiles + 1 >= total_tiles THEN NULL
                        ELSE error_json
                    END,
                    updated_at = ?2
                WHERE id = ?3
                "#,
            )
            .bind(bytes as i64)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query(
            r#"
            SELECT state, downloaded_tiles, total_tiles, byte_size
            FROM regions
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            anyhow::bail!("region {} not found", id);
        };
        tx.commit().await?;

        let state: String = row.get("state");
        let downloaded: i64 = row.get("downloaded_tiles");
        let total: i64 = row.get("total_tiles");
        let byte_size: i64 = row.get("byte_size");
        Ok(MarkOutcome {
            newly_done: inserted,
            state: RegionState::from_str(&state),
            downloaded_tiles: downloaded.max(0) as u64,
            total_tiles: total.max(0) as u64,
            byte_size: byte_size.max(0) as u64,
        })
    }

    /// All tiles recorded for a region.
    pub async fn done_tiles(&self, id: RegionId) -> Result<HashSet<TileCoord>> {
        let rows = sqlx::query(r#"SELECT zoom, x, y FROM tiles WHERE region_id = ?1"#)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        let mut out = HashSet::with_capacity(rows.len());
        for row in rows {
            let zoom: i64 = row.get("zoom");
            let x: i64 = row.get("x");
            let y: i64 = row.get("y");
            out.insert(TileCoord::new(zoom as u8, x as u32, y as u32));
        }
        Ok(out)
    }

    /// Recorded size of one tile, `None` if it is not in the ledger.
    pub async fn tile_bytes(&self, id: RegionId, coord: TileCoord) -> Result<Option<u64>> {
        let bytes: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT bytes FROM tiles
            WHERE region_id = ?1 AND zoom = ?2 AND x = ?3 AND y = ?4
            "#,
        )
        .bind(id)
        .bind(i64::from(coord.zoom))
        .bind(i64::from(coord.x))
        .bind(i64::from(coord.y))
        .fetch_optional(&self.pool)
        .await?;
        Ok(bytes.map(|b| b.max(0) as u64))
    }

    /// Number of ledger rows for a region.
    pub async fn ledger_count(&self, id: RegionId) -> Result<u64> {
        let n: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM tiles WHERE region_id = ?1"#)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(n.max(0) as u64)
    }
}
