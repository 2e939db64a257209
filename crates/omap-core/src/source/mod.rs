//! Tile sources: where tile bytes come from.
//!
//! The engine only needs "bytes for (z, x, y) or a classified error", so the
//! vendor protocol stays behind the [`TileSource`] trait. `CurlTileSource` is
//! the HTTP implementation driven by a `{z}/{x}/{y}` URL template.

mod http;

pub use http::CurlTileSource;

use crate::retry::FetchError;
use crate::tile::TileCoord;

/// Blocking tile fetcher. Implementations are called from the blocking pool,
/// one call per attempt; retries and timeouts are handled by the engine.
pub trait TileSource: Send + Sync + 'static {
    fn fetch(&self, coord: TileCoord) -> Result<Vec<u8>, FetchError>;
}

/// Expand a `{z}/{x}/{y}` template for one tile.
pub fn expand_template(template: &str, coord: TileCoord) -> String {
    template
        .replace("{z}", &coord.zoom.to_string())
        .replace("{x}", &coord.x.to_string())
        .replace("{y}", &coord.y.to_string())
}
