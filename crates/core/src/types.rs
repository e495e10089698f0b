//! Identifier and scalar types shared by every backend

use serde::{Deserialize, Serialize};

/// Store-unique feature identifier
pub type FeatureId = i64;

/// Store-unique feature set identifier
pub type FeatureSetId = i64;

/// Sentinel for "no feature id assigned"
pub const FEATURE_ID_NONE: FeatureId = 0;

/// Sentinel for "no feature set id assigned"
pub const FEATURESET_ID_NONE: FeatureSetId = 0;

/// Sentinel for "no version information"
pub const FEATURE_VERSION_NONE: i64 = 0;

/// Raw storage sentinel for a feature without a time reference
pub const TIMESTAMP_NONE: i64 = i64::MIN;

/// How a feature's altitude is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum AltitudeMode {
    /// Geometry is draped on the terrain
    #[default]
    ClampToGround = 0,
    /// Altitude is relative to the terrain
    Relative = 1,
    /// Altitude is relative to the ellipsoid
    Absolute = 2,
}

impl AltitudeMode {
    /// Decode from the persisted integer code; unknown codes clamp to ground
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => AltitudeMode::Relative,
            2 => AltitudeMode::Absolute,
            _ => AltitudeMode::ClampToGround,
        }
    }

    /// Persisted integer code
    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Convert an optional timestamp to its raw storage form
pub fn timestamp_to_raw(ts: Option<i64>) -> i64 {
    ts.unwrap_or(TIMESTAMP_NONE)
}

/// Convert a raw stored timestamp back to an optional value
pub fn timestamp_from_raw(raw: i64) -> Option<i64> {
    if raw == TIMESTAMP_NONE {
        None
    } else {
        Some(raw)
    }
}
