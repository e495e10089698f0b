//! Resolution to level-of-detail mapping
//!
//! Resolutions are ground sample distances in meters per pixel. Levels
//! follow the OSM/mapnik tiling scheme: level 0 shows the whole world in a
//! single 256 pixel tile and each level doubles the detail.

/// Highest level of detail tracked by the stores
pub const MAX_LOD: i32 = 33;

/// Ground resolution of level 0 at the equator
const LEVEL_ZERO_RESOLUTION: f64 = 156_543.034;

/// Map a resolution to a level of detail, clamped to `[0, MAX_LOD]`
///
/// Non-positive resolutions mean "infinitely detailed" and map to
/// [`MAX_LOD`]; infinite resolutions map to level 0.
pub fn level_of_detail(resolution: f64) -> i32 {
    if resolution.is_nan() || resolution <= 0.0 {
        return MAX_LOD;
    }
    let level = (LEVEL_ZERO_RESOLUTION / resolution).log2().round();
    if level.is_nan() || level < 0.0 {
        0
    } else if level > MAX_LOD as f64 {
        MAX_LOD
    } else {
        level as i32
    }
}

/// Resolution at the given level of detail
pub fn resolution_of(level: i32) -> f64 {
    LEVEL_ZERO_RESOLUTION / 2f64.powi(level.clamp(0, MAX_LOD))
}

/// Query-side LOD bounds derived from a resolution range
///
/// `min_resolution` is the coarsest resolution of interest and yields the
/// minimum level; `NaN` leaves the corresponding side unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LodRange {
    /// Minimum level of interest; matches when `max_lod >= min`
    pub min: Option<i32>,
    /// Maximum level of interest; matches when `min_lod <= max`
    pub max: Option<i32>,
}

impl LodRange {
    /// Build from a resolution range, `NaN` meaning unbounded
    pub fn from_resolutions(min_resolution: f64, max_resolution: f64) -> Self {
        Self {
            min: (!min_resolution.is_nan()).then(|| level_of_detail(min_resolution)),
            max: (!max_resolution.is_nan()).then(|| level_of_detail(max_resolution)),
        }
    }

    /// Check if neither side is bounded
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Check if an item covering `[min_lod, max_lod]` is relevant
    pub fn matches(&self, min_lod: i32, max_lod: i32) -> bool {
        self.min.map_or(true, |q| max_lod >= q) && self.max.map_or(true, |q| min_lod <= q)
    }
}
