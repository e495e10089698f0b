//! Core types and traits for featuredb
//!
//! This crate defines the foundational types shared by every backend:
//! - FeatureSet / Feature: the data model and its mutation payloads
//! - AttributeSet: typed, nestable attribute container
//! - FeatureQueryParameters / FeatureSetQueryParameters: query descriptors
//! - Cursor: lazy, closable result sequence
//! - ModifyLock: re-entrant single-writer lock with change notification
//! - FeatureDataStore: the store contract
//! - FeatureDbError: error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod capabilities;
pub mod cursor;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod lock;
pub mod lod;
pub mod pattern;
pub mod query;
pub mod style;
pub mod traits;
pub mod types;

pub use attributes::{AttributeSet, AttributeValue};
pub use capabilities::{ModificationFlags, VisibilityFlags};
pub use cursor::Cursor;
pub use error::{FeatureDbError, FeatureDbResult};
pub use feature::{
    AttributeUpdate, Feature, FeatureDefinition, FeatureSet, FeatureSetDefinition, FeatureUpdate,
};
pub use geometry::{BBox, GeometryType};
pub use lock::{BulkModification, ContentListener, ModifyGuard, ModifyLock};
pub use lod::{level_of_detail, resolution_of, LodRange, MAX_LOD};
pub use query::{
    FeatureQueryParameters, FeatureSetQueryParameters, IgnoredFields, Order, SpatialFilter,
};
pub use style::Style;
pub use traits::FeatureDataStore;
pub use types::{
    AltitudeMode, FeatureId, FeatureSetId, FEATURESET_ID_NONE, FEATURE_ID_NONE,
    FEATURE_VERSION_NONE, TIMESTAMP_NONE,
};
