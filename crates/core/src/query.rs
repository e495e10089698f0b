//! Query parameter descriptors
//!
//! [`FeatureQueryParameters`] and [`FeatureSetQueryParameters`] are plain
//! values built with `with_*` methods and handed to a store by reference.
//! Every filter is optional; an absent filter does not constrain results,
//! while an empty set (for example `with_ids([])`) matches nothing.
//!
//! # Example
//!
//! ```ignore
//! let params = FeatureQueryParameters::new()
//!     .with_names(["main%"])
//!     .with_visible_only(true)
//!     .with_order(Order::FeatureName)
//!     .with_limit(10);
//! let cursor = store.query_features(&params)?;
//! ```

use std::collections::BTreeSet;

use geo_types::{Geometry, Point};

use crate::feature::{Feature, FeatureSet};
use crate::geometry::{distance_to_geometry, BBox, GeometryType};
use crate::lod::LodRange;
use crate::pattern;
use crate::types::{FeatureId, FeatureSetId};

// ============================================================================
// Spatial filter
// ============================================================================

/// Spatial constraint on feature geometry
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialFilter {
    /// Geometry envelope intersects the region; antimeridian-aware
    Region(BBox),
    /// Geometry lies within `meters` of `center` (great-circle distance)
    Radius {
        /// Circle center, longitude on x
        center: Point<f64>,
        /// Radius in meters
        meters: f64,
    },
}

impl SpatialFilter {
    /// Region filter from its edges
    pub fn region(north: f64, west: f64, south: f64, east: f64) -> Self {
        SpatialFilter::Region(BBox::new(west, south, east, north))
    }

    /// Radius filter around a point
    pub fn radius(center: Point<f64>, meters: f64) -> Self {
        SpatialFilter::Radius { center, meters }
    }

    /// Envelope of the filter in canonical longitudes
    pub fn envelope(&self) -> BBox {
        match self {
            SpatialFilter::Region(bbox) => *bbox,
            SpatialFilter::Radius { center, meters } => BBox::around(*center, *meters),
        }
    }

    /// Candidate boxes to probe in a spatial index
    pub fn index_boxes(&self) -> [BBox; 3] {
        self.envelope().wrapped()
    }

    /// Exact test against a stored geometry and its envelope
    pub fn matches(&self, geometry: &Geometry<f64>, envelope: &BBox) -> bool {
        match self {
            SpatialFilter::Region(bbox) => bbox.intersects_wrapped(envelope),
            SpatialFilter::Radius { center, meters } => {
                self.envelope().intersects_wrapped(envelope)
                    && distance_to_geometry(*center, geometry) <= *meters
            }
        }
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// One sort key of a feature query
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Order {
    /// Ascending feature id
    FeatureId,
    /// Ascending feature name (case-insensitive)
    FeatureName,
    /// Ascending distance from a point
    Distance(Point<f64>),
    /// Descending maximum resolution of the owning level-of-detail range
    Resolution,
}

// ============================================================================
// Ignored fields
// ============================================================================

/// Bitmask of feature fields a query may leave unpopulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IgnoredFields(u32);

impl IgnoredFields {
    /// Populate every field
    pub const NONE: Self = Self(0);
    /// Skip the name
    pub const NAME: Self = Self(1);
    /// Skip the geometry
    pub const GEOMETRY: Self = Self(2);
    /// Skip the style
    pub const STYLE: Self = Self(4);
    /// Skip the attributes
    pub const ATTRIBUTES: Self = Self(8);

    /// Build from raw bits
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0xF)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Check that every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two masks
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Clear ignored fields on a materialized feature
    pub fn strip(self, feature: &mut Feature) {
        if self.contains(Self::NAME) {
            feature.name = None;
        }
        if self.contains(Self::GEOMETRY) {
            feature.geometry = None;
        }
        if self.contains(Self::STYLE) {
            feature.style = None;
        }
        if self.contains(Self::ATTRIBUTES) {
            feature.attributes = None;
        }
    }
}

// ============================================================================
// Feature set parameters
// ============================================================================

/// Filter over feature sets
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSetQueryParameters {
    /// Explicit feature set ids
    pub ids: Option<BTreeSet<FeatureSetId>>,
    /// Name patterns
    pub names: Option<Vec<String>>,
    /// Type patterns
    pub types: Option<Vec<String>>,
    /// Provider patterns
    pub providers: Option<Vec<String>>,
    /// Coarsest resolution of interest, `NaN` for unbounded
    pub min_resolution: f64,
    /// Finest resolution of interest, `NaN` for unbounded
    pub max_resolution: f64,
    /// Only sets whose effective visibility is on
    pub visible_only: bool,
    /// Maximum number of results, 0 for unlimited
    pub limit: usize,
    /// Number of leading results to skip
    pub offset: usize,
}

impl Default for FeatureSetQueryParameters {
    fn default() -> Self {
        Self {
            ids: None,
            names: None,
            types: None,
            providers: None,
            min_resolution: f64::NAN,
            max_resolution: f64::NAN,
            visible_only: false,
            limit: 0,
            offset: 0,
        }
    }
}

impl FeatureSetQueryParameters {
    /// Parameters matching every feature set
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given ids
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = FeatureSetId>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    /// Restrict to names matching any pattern
    pub fn with_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to types matching any pattern
    pub fn with_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.types = Some(types.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to providers matching any pattern
    pub fn with_providers<S: Into<String>>(
        mut self,
        providers: impl IntoIterator<Item = S>,
    ) -> Self {
        self.providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to a resolution range
    pub fn with_resolution(mut self, min_resolution: f64, max_resolution: f64) -> Self {
        self.min_resolution = min_resolution;
        self.max_resolution = max_resolution;
        self
    }

    /// Restrict to visible sets
    pub fn with_visible_only(mut self, visible_only: bool) -> Self {
        self.visible_only = visible_only;
        self
    }

    /// Limit the number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skip leading results
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Level-of-detail bounds of the resolution range
    pub fn lod_range(&self) -> LodRange {
        LodRange::from_resolutions(self.min_resolution, self.max_resolution)
    }

    /// Check the set's descriptive fields (ids, names, types, providers, LOD)
    ///
    /// Visibility is evaluated separately by the store since it may depend
    /// on member features.
    pub fn matches_descriptor(&self, set: &FeatureSet) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&set.id) {
                return false;
            }
        }
        if let Some(names) = &self.names {
            if !pattern::matches_any(names, &set.name) {
                return false;
            }
        }
        if let Some(types) = &self.types {
            if !pattern::matches_any(types, &set.feature_type) {
                return false;
            }
        }
        if let Some(providers) = &self.providers {
            if !pattern::matches_any(providers, &set.provider) {
                return false;
            }
        }
        self.lod_range().matches(set.min_lod, set.max_lod)
    }
}

// ============================================================================
// Feature parameters
// ============================================================================

/// Filter, order and pagination over features
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQueryParameters {
    /// Explicit feature ids
    pub ids: Option<BTreeSet<FeatureId>>,
    /// Name patterns
    pub names: Option<Vec<String>>,
    /// Constraint on the owning feature sets
    pub feature_sets: Option<FeatureSetQueryParameters>,
    /// Spatial constraint
    pub spatial_filter: Option<SpatialFilter>,
    /// Coarsest resolution of interest, `NaN` for unbounded
    pub min_resolution: f64,
    /// Finest resolution of interest, `NaN` for unbounded
    pub max_resolution: f64,
    /// Geometry types of interest
    pub geometry_types: Option<BTreeSet<GeometryType>>,
    /// Only features whose effective visibility is on
    pub visible_only: bool,
    /// Sort keys, applied in sequence
    pub order: Vec<Order>,
    /// Maximum number of results, 0 for unlimited
    pub limit: usize,
    /// Number of leading results to skip
    pub offset: usize,
    /// Fields the caller does not need
    pub ignored_fields: IgnoredFields,
}

impl Default for FeatureQueryParameters {
    fn default() -> Self {
        Self {
            ids: None,
            names: None,
            feature_sets: None,
            spatial_filter: None,
            min_resolution: f64::NAN,
            max_resolution: f64::NAN,
            geometry_types: None,
            visible_only: false,
            order: Vec::new(),
            limit: 0,
            offset: 0,
            ignored_fields: IgnoredFields::NONE,
        }
    }
}

impl FeatureQueryParameters {
    /// Parameters matching every feature
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given ids
    pub fn with_ids(mut self, ids: impl IntoIterator<Item = FeatureId>) -> Self {
        self.ids = Some(ids.into_iter().collect());
        self
    }

    /// Restrict to names matching any pattern
    pub fn with_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict by owning feature set
    pub fn with_feature_sets(mut self, params: FeatureSetQueryParameters) -> Self {
        self.feature_sets = Some(params);
        self
    }

    /// Restrict to the given owning set ids
    pub fn with_feature_set_ids(self, ids: impl IntoIterator<Item = FeatureSetId>) -> Self {
        self.with_feature_sets(FeatureSetQueryParameters::new().with_ids(ids))
    }

    /// Restrict spatially
    pub fn with_spatial_filter(mut self, filter: SpatialFilter) -> Self {
        self.spatial_filter = Some(filter);
        self
    }

    /// Restrict to a resolution range
    pub fn with_resolution(mut self, min_resolution: f64, max_resolution: f64) -> Self {
        self.min_resolution = min_resolution;
        self.max_resolution = max_resolution;
        self
    }

    /// Restrict to geometry types
    pub fn with_geometry_types(mut self, types: impl IntoIterator<Item = GeometryType>) -> Self {
        self.geometry_types = Some(types.into_iter().collect());
        self
    }

    /// Restrict to visible features
    pub fn with_visible_only(mut self, visible_only: bool) -> Self {
        self.visible_only = visible_only;
        self
    }

    /// Append a sort key
    pub fn with_order(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    /// Limit the number of results
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Skip leading results
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Leave the given fields unpopulated
    pub fn with_ignored_fields(mut self, fields: IgnoredFields) -> Self {
        self.ignored_fields = self.ignored_fields.union(fields);
        self
    }

    /// Level-of-detail bounds of the resolution range
    pub fn lod_range(&self) -> LodRange {
        LodRange::from_resolutions(self.min_resolution, self.max_resolution)
    }

    /// Same filters without pagination
    pub fn without_pagination(&self) -> Self {
        let mut params = self.clone();
        params.limit = 0;
        params.offset = 0;
        params
    }

    /// Check if any name pattern uses a wildcard
    pub fn has_wildcard_names(&self) -> bool {
        self.names
            .as_ref()
            .map_or(false, |names| names.iter().any(|n| pattern::is_wildcard(n)))
    }
}
