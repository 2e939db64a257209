//! Tile pyramid math: geographic rectangles, zoom ranges, and the set of
//! Web Mercator (slippy map) tiles that cover them.
//!
//! Everything here is a pure function of `(GeoRect, ZoomRange)`; nothing
//! depends on a mapping library, so enumeration is testable on its own.

mod pyramid;
mod types;

pub use pyramid::{count_tiles, enumerate_tiles, tile_bounds, tile_range, TileRange};
pub use types::{BoundsError, GeoRect, TileCoord, ZoomRange, MAX_LAT, MAX_ZOOM, MIN_LAT};
