//! Bounds x zoom range -> tile coordinate set.

use std::f64::consts::PI;

use super::types::{GeoRect, TileCoord, ZoomRange, MAX_LAT, MIN_LAT};

/// Inclusive block of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn tile_count(&self) -> u64 {
        let cols = u64::from(self.max_x - self.min_x) + 1;
        let rows = u64::from(self.max_y - self.min_y) + 1;
        cols * rows
    }

    pub fn contains(&self, coord: &TileCoord) -> bool {
        coord.zoom == self.zoom
            && (self.min_x..=self.max_x).contains(&coord.x)
            && (self.min_y..=self.max_y).contains(&coord.y)
    }

    /// Row-major iteration (north to south, west to east).
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let TileRange {
            zoom,
            min_x,
            max_x,
            min_y,
            max_y,
        } = *self;
        (min_y..=max_y).flat_map(move |y| (min_x..=max_x).map(move |x| TileCoord { zoom, x, y }))
    }
}

fn lon_to_x(lon: f64, n: f64) -> u32 {
    let x = ((lon + 180.0) / 360.0 * n).floor();
    x.clamp(0.0, n - 1.0) as u32
}

fn lat_to_y(lat: f64, n: f64) -> u32 {
    let lat_rad = lat.clamp(MIN_LAT, MAX_LAT).to_radians();
    let y = ((1.0 - lat_rad.tan().asinh() / PI) / 2.0 * n).floor();
    y.clamp(0.0, n - 1.0) as u32
}

/// Tiles intersecting `bounds` at `zoom`. North maps to the smaller y.
pub fn tile_range(bounds: &GeoRect, zoom: u8) -> TileRange {
    let n = 2.0_f64.powi(i32::from(zoom));
    TileRange {
        zoom,
        min_x: lon_to_x(bounds.min_lon, n),
        max_x: lon_to_x(bounds.max_lon, n),
        min_y: lat_to_y(bounds.max_lat, n),
        max_y: lat_to_y(bounds.min_lat, n),
    }
}

/// Geographic rectangle covered by one tile.
pub fn tile_bounds(coord: TileCoord) -> GeoRect {
    let n = 2.0_f64.powi(i32::from(coord.zoom));
    let lon = |x: f64| x / n * 360.0 - 180.0;
    let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    GeoRect {
        min_lat: lat(f64::from(coord.y) + 1.0),
        min_lon: lon(f64::from(coord.x)),
        max_lat: lat(f64::from(coord.y)),
        max_lon: lon(f64::from(coord.x) + 1.0),
    }
}

/// Number of tiles covering `bounds` across every level of `zooms`.
pub fn count_tiles(bounds: &GeoRect, zooms: ZoomRange) -> u64 {
    zooms.levels().map(|z| tile_range(bounds, z).tile_count()).sum()
}

/// Every tile covering `bounds`, zoom level by zoom level, shallowest first.
pub fn enumerate_tiles(bounds: &GeoRect, zooms: ZoomRange) -> impl Iterator<Item = TileCoord> {
    let bounds = *bounds;
    zooms.levels().flat_map(move |z| tile_range(&bounds, z).iter())
}
