//! On-disk tile cache and file lifecycle.
//!
//! Tiles are addressed by `(region_id, zoom, x, y)`. Each write goes to a
//! `.part` temp file, is synced, and is atomically renamed into place, so a
//! tile path either holds complete bytes or does not exist.

mod cache;

pub use cache::{StagedRemoval, TileCache};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Prefix of region directories staged for deletion.
pub const TRASH_PREFIX: &str = ".trash-";

/// Path for the temp file: appends `.part` to the final path (e.g. `3.tile` → `3.tile.part`).
pub fn temp_path(final_path: &std::path::Path) -> std::path::PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    std::path::PathBuf::from(o)
}
