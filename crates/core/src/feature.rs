//! Features, feature sets and their mutation payloads

use geo_types::Geometry;

use crate::attributes::AttributeSet;
use crate::capabilities::ModificationFlags;
use crate::geometry::{normalize_geometry, BBox, GeometryType};
use crate::lod::{level_of_detail, resolution_of};
use crate::style::Style;
use crate::types::{AltitudeMode, FeatureId, FeatureSetId, FEATURE_ID_NONE};

// ============================================================================
// Feature set
// ============================================================================

/// A named, versioned group of features
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureSet {
    /// Store-unique id
    pub id: FeatureSetId,
    /// Display name
    pub name: String,
    /// Content type (e.g. "KML", "shapefile")
    pub feature_type: String,
    /// Provider that produced the content
    pub provider: String,
    /// Coarsest level of detail at which the set is relevant
    pub min_lod: i32,
    /// Finest level of detail at which the set is relevant
    pub max_lod: i32,
    /// Baseline visibility
    pub visible: bool,
    /// Some member feature's visibility differs from the baseline
    pub visible_check: bool,
    /// Some member feature's LOD range differs from the set's
    pub lod_check: bool,
    /// Bumped on every rename
    pub name_version: i64,
    /// Bumped on every set-level visibility change
    pub visible_version: i64,
    /// Bumped on every set-level LOD change
    pub lod_version: i64,
}

impl FeatureSet {
    /// Overall content version; 1 for a fresh set, +1 per counter bump
    pub fn version(&self) -> i64 {
        self.name_version + self.visible_version + self.lod_version - 2
    }

    /// Coarsest resolution at which the set is relevant
    pub fn min_resolution(&self) -> f64 {
        resolution_of(self.min_lod)
    }

    /// Finest resolution at which the set is relevant
    pub fn max_resolution(&self) -> f64 {
        resolution_of(self.max_lod)
    }
}

/// Insert payload for a feature set
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSetDefinition {
    /// Display name
    pub name: String,
    /// Content type
    pub feature_type: String,
    /// Provider
    pub provider: String,
    /// Coarsest resolution; `f64::MAX` for "always relevant"
    pub min_resolution: f64,
    /// Finest resolution; 0 for "always relevant"
    pub max_resolution: f64,
}

impl FeatureSetDefinition {
    /// Definition relevant at every resolution
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        let provider = provider.into();
        Self {
            name: name.into(),
            feature_type: provider.clone(),
            provider,
            min_resolution: f64::MAX,
            max_resolution: 0.0,
        }
    }

    /// Set the content type
    pub fn with_type(mut self, feature_type: impl Into<String>) -> Self {
        self.feature_type = feature_type.into();
        self
    }

    /// Set the resolution range
    pub fn with_resolution(mut self, min_resolution: f64, max_resolution: f64) -> Self {
        self.min_resolution = min_resolution;
        self.max_resolution = max_resolution;
        self
    }

    /// LOD bounds as `(min_lod, max_lod)`
    pub fn lod_range(&self) -> (i32, i32) {
        (
            level_of_detail(self.min_resolution),
            level_of_detail(self.max_resolution),
        )
    }
}

// ============================================================================
// Feature
// ============================================================================

/// A vector map entity
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Store-unique id
    pub id: FeatureId,
    /// Owning feature set
    pub feature_set_id: FeatureSetId,
    /// Display name
    pub name: Option<String>,
    /// Geometry, longitude on x
    pub geometry: Option<Geometry<f64>>,
    /// Visual style
    pub style: Option<Style>,
    /// Attributes; `None` if absent or undecodable
    pub attributes: Option<AttributeSet>,
    /// Altitude interpretation
    pub altitude_mode: AltitudeMode,
    /// Extrusion height; 0 for none, negative to extrude to the ground
    pub extrude: f64,
    /// Time reference in epoch milliseconds
    pub timestamp: Option<i64>,
    /// Starts at 1, bumped once per update
    pub version: i64,
}

impl Feature {
    /// Geometry type, if the feature has geometry
    pub fn geometry_type(&self) -> Option<GeometryType> {
        self.geometry.as_ref().map(GeometryType::from_geometry)
    }

    /// Geometry envelope, if the feature has non-empty geometry
    pub fn envelope(&self) -> Option<BBox> {
        self.geometry.as_ref().and_then(BBox::from_geometry)
    }
}

/// Insert payload for a feature
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureDefinition {
    /// Requested id, [`FEATURE_ID_NONE`] to have one assigned
    pub id: FeatureId,
    /// Display name
    pub name: Option<String>,
    /// Geometry
    pub geometry: Option<Geometry<f64>>,
    /// Style
    pub style: Option<Style>,
    /// Attributes
    pub attributes: Option<AttributeSet>,
    /// Altitude interpretation
    pub altitude_mode: AltitudeMode,
    /// Extrusion height
    pub extrude: f64,
    /// Time reference in epoch milliseconds
    pub timestamp: Option<i64>,
}

impl FeatureDefinition {
    /// Definition with a name and geometry
    pub fn new(name: impl Into<String>, geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            id: FEATURE_ID_NONE,
            name: Some(name.into()),
            geometry: Some(geometry.into()),
            ..Self::default()
        }
    }

    /// Request a specific id
    pub fn with_id(mut self, id: FeatureId) -> Self {
        self.id = id;
        self
    }

    /// Set the style
    pub fn with_style(mut self, style: Style) -> Self {
        self.style = Some(style);
        self
    }

    /// Set the attributes
    pub fn with_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Set altitude mode and extrusion
    pub fn with_altitude(mut self, mode: AltitudeMode, extrude: f64) -> Self {
        self.altitude_mode = mode;
        self.extrude = extrude;
        self
    }

    /// Set the time reference
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Materialize as a version-1 feature
    pub fn into_feature(self, id: FeatureId, feature_set_id: FeatureSetId) -> Feature {
        Feature {
            id,
            feature_set_id,
            name: self.name,
            geometry: self.geometry.map(normalize_geometry),
            style: self.style,
            attributes: self.attributes,
            altitude_mode: self.altitude_mode,
            extrude: self.extrude,
            timestamp: self.timestamp,
            version: 1,
        }
    }
}

// ============================================================================
// Feature update
// ============================================================================

/// How supplied attributes combine with the stored ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeUpdate {
    /// Replace the stored attributes entirely
    Replace,
    /// Add new keys and overwrite existing ones, keeping the rest
    AddOrReplace,
}

/// Field-by-field feature update; `None` leaves a field unchanged
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureUpdate {
    /// New name
    pub name: Option<Option<String>>,
    /// New geometry
    pub geometry: Option<Geometry<f64>>,
    /// New style
    pub style: Option<Option<Style>>,
    /// New attributes and how to apply them
    pub attributes: Option<(AttributeSet, AttributeUpdate)>,
    /// New altitude mode
    pub altitude_mode: Option<AltitudeMode>,
    /// New extrusion
    pub extrude: Option<f64>,
}

impl FeatureUpdate {
    /// Empty update
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Some(name.into()));
        self
    }

    /// Change the geometry
    pub fn geometry(mut self, geometry: impl Into<Geometry<f64>>) -> Self {
        self.geometry = Some(geometry.into());
        self
    }

    /// Change the style
    pub fn style(mut self, style: Option<Style>) -> Self {
        self.style = Some(style);
        self
    }

    /// Replace the attributes
    pub fn attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = Some((attributes, AttributeUpdate::Replace));
        self
    }

    /// Merge into the attributes
    pub fn merge_attributes(mut self, attributes: AttributeSet) -> Self {
        self.attributes = Some((attributes, AttributeUpdate::AddOrReplace));
        self
    }

    /// Change altitude mode
    pub fn altitude_mode(mut self, mode: AltitudeMode) -> Self {
        self.altitude_mode = Some(mode);
        self
    }

    /// Change extrusion
    pub fn extrude(mut self, extrude: f64) -> Self {
        self.extrude = Some(extrude);
        self
    }

    /// Check whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.geometry.is_none()
            && self.style.is_none()
            && self.attributes.is_none()
            && self.altitude_mode.is_none()
            && self.extrude.is_none()
    }

    /// Capabilities required to apply this update
    pub fn required_flags(&self) -> ModificationFlags {
        let mut flags = ModificationFlags::FEATURESET_FEATURE_UPDATE;
        if self.name.is_some() {
            flags |= ModificationFlags::FEATURE_NAME;
        }
        if self.geometry.is_some() || self.altitude_mode.is_some() || self.extrude.is_some() {
            flags |= ModificationFlags::FEATURE_GEOMETRY;
        }
        if self.style.is_some() {
            flags |= ModificationFlags::FEATURE_STYLE;
        }
        if self.attributes.is_some() {
            flags |= ModificationFlags::FEATURE_ATTRIBUTES;
        }
        flags
    }

    /// Apply to a feature and bump its version once
    pub fn apply(&self, feature: &mut Feature) {
        if let Some(name) = &self.name {
            feature.name = name.clone();
        }
        if let Some(geometry) = &self.geometry {
            feature.geometry = Some(normalize_geometry(geometry.clone()));
        }
        if let Some(style) = &self.style {
            feature.style = style.clone();
        }
        if let Some((attributes, mode)) = &self.attributes {
            match (mode, feature.attributes.as_mut()) {
                (AttributeUpdate::AddOrReplace, Some(existing)) => existing.merge(attributes),
                _ => feature.attributes = Some(attributes.clone()),
            }
        }
        if let Some(mode) = self.altitude_mode {
            feature.altitude_mode = mode;
        }
        if let Some(extrude) = self.extrude {
            feature.extrude = extrude;
        }
        feature.version += 1;
    }
}
