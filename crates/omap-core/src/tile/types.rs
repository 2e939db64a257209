//! Geographic and tile coordinate types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Northern limit of the Web Mercator projection.
pub const MAX_LAT: f64 = 85.051_128_78;
/// Southern limit of the Web Mercator projection.
pub const MIN_LAT: f64 = -85.051_128_78;
/// Deepest zoom level accepted for a region.
pub const MAX_ZOOM: u8 = 22;

/// Reasons a region's bounds or zoom range are rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoundsError {
    #[error("bounds have zero area (min must be strictly less than max)")]
    Degenerate,
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
    #[error("bounds lie entirely outside the Web Mercator latitude range")]
    OutsideProjection,
    #[error("min zoom {min} is greater than max zoom {max}")]
    ZoomOrder { min: u8, max: u8 },
    #[error("zoom {0} exceeds the maximum of {max}", max = MAX_ZOOM)]
    ZoomTooDeep(u8),
}

/// Axis-aligned geographic rectangle in degrees.
///
/// Rectangles crossing the antimeridian are not supported; split them in two.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRect {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoRect {
    /// Builds a validated rectangle from its corners.
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Result<Self, BoundsError> {
        let rect = GeoRect {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        };
        rect.validate()?;
        Ok(rect)
    }

    /// Builds a rectangle from a center point and a full lat/lon span.
    pub fn from_center(lat: f64, lon: f64, lat_span: f64, lon_span: f64) -> Result<Self, BoundsError> {
        let half_lat = lat_span / 2.0;
        let half_lon = lon_span / 2.0;
        Self::new(lat - half_lat, lon - half_lon, lat + half_lat, lon + half_lon)
    }

    pub fn validate(&self) -> Result<(), BoundsError> {
        for lat in [self.min_lat, self.max_lat] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(BoundsError::InvalidLatitude(lat));
            }
        }
        for lon in [self.min_lon, self.max_lon] {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(BoundsError::InvalidLongitude(lon));
            }
        }
        if self.min_lat >= self.max_lat || self.min_lon >= self.max_lon {
            return Err(BoundsError::Degenerate);
        }
        if self.max_lat <= MIN_LAT || self.min_lat >= MAX_LAT {
            return Err(BoundsError::OutsideProjection);
        }
        Ok(())
    }
}

/// Inclusive zoom range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

impl ZoomRange {
    pub fn new(min: u8, max: u8) -> Result<Self, BoundsError> {
        if min > max {
            return Err(BoundsError::ZoomOrder { min, max });
        }
        if max > MAX_ZOOM {
            return Err(BoundsError::ZoomTooDeep(max));
        }
        Ok(ZoomRange { min, max })
    }

    pub fn levels(&self) -> std::ops::RangeInclusive<u8> {
        self.min..=self.max
    }
}

impl fmt::Display for ZoomRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Address of one tile in the pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        TileCoord { zoom, x, y }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}
