//! Region-partitioned tile cache with atomic per-tile writes.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{temp_path, TEMP_SUFFIX, TRASH_PREFIX};
use crate::region_db::RegionId;
use crate::tile::TileCoord;

/// Tile cache rooted at a directory: `<root>/<region>/<z>/<x>/<y>.tile`.
///
/// Cheap to clone; all methods are blocking std::fs calls, so async callers
/// should run them on the blocking pool.
#[derive(Debug, Clone)]
pub struct TileCache {
    root: PathBuf,
}

impl TileCache {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(TileCache { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn region_dir(&self, region: RegionId) -> PathBuf {
        self.root.join(region.to_string())
    }

    pub fn tile_path(&self, region: RegionId, coord: TileCoord) -> PathBuf {
        self.region_dir(region)
            .join(coord.zoom.to_string())
            .join(coord.x.to_string())
            .join(format!("{}.tile", coord.y))
    }

    /// Write tile bytes: temp file, fsync, rename. Returns the number of bytes written.
    /// On error no file is left at the final path (a stale `.part` may remain
    /// and is cleaned up by [`TileCache::sweep_stale_files`]).
    pub fn write_tile(&self, region: RegionId, coord: TileCoord, data: &[u8]) -> io::Result<u64> {
        let final_path = self.tile_path(region, coord);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = temp_path(&final_path);
        {
            let mut f = File::create(&tmp)?;
            f.write_all(data)?;
            f.sync_all()?;
        }
        if let Err(e) = fs::rename(&tmp, &final_path) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(data.len() as u64)
    }

    pub fn read_tile(&self, region: RegionId, coord: TileCoord) -> io::Result<Vec<u8>> {
        fs::read(self.tile_path(region, coord))
    }

    pub fn has_tile(&self, region: RegionId, coord: TileCoord) -> bool {
        self.tile_path(region, coord).is_file()
    }

    /// Remove one tile file. A tile that is already gone is not an error.
    pub fn remove_tile(&self, region: RegionId, coord: TileCoord) -> io::Result<()> {
        match fs::remove_file(self.tile_path(region, coord)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Atomically move a region's directory out of the way.
    ///
    /// Returns `None` if the region never had tiles on disk. The caller either
    /// purges the staged directory once metadata is gone, or restores it.
    pub fn stage_region_removal(&self, region: RegionId) -> io::Result<Option<StagedRemoval>> {
        let original = self.region_dir(region);
        if !original.exists() {
            return Ok(None);
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let trash = self
            .root
            .join(format!("{}{}-{}", TRASH_PREFIX, region, nanos));
        fs::rename(&original, &trash)?;
        Ok(Some(StagedRemoval { original, trash }))
    }

    /// Remove leftovers from interrupted runs: `.part` files and staged trash
    /// directories. Returns how many entries were removed.
    pub fn sweep_stale_files(&self) -> io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name();
            if name.to_string_lossy().starts_with(TRASH_PREFIX) {
                fs::remove_dir_all(&path)?;
                removed += 1;
            } else if entry.file_type()?.is_dir() {
                removed += remove_partials(&path)?;
            }
        }
        Ok(removed)
    }
}

fn remove_partials(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            removed += remove_partials(&path)?;
        } else if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// A region directory renamed aside, pending purge or restore.
#[derive(Debug)]
pub struct StagedRemoval {
    original: PathBuf,
    trash: PathBuf,
}

impl StagedRemoval {
    /// Delete the staged tiles for good.
    pub fn purge(self) -> io::Result<()> {
        fs::remove_dir_all(&self.trash)
    }

    /// Put the directory back where it was.
    pub fn restore(self) -> io::Result<()> {
        fs::rename(&self.trash, &self.original)
    }
}
