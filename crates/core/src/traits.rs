//! The feature data store contract
//!
//! [`FeatureDataStore`] is the only interface the rest of a system should
//! use. The persistent (SQLite) and in-memory backends implement it with
//! identical query semantics, so callers can swap one for the other.
//!
//! Lookups and mutations addressed to unknown ids are routine: they return
//! `None` / `false` rather than an error. Errors are reserved for capability
//! violations, disposed stores and storage failures.

use std::sync::Arc;

use crate::capabilities::{ModificationFlags, VisibilityFlags};
use crate::cursor::Cursor;
use crate::error::FeatureDbResult;
use crate::feature::{Feature, FeatureDefinition, FeatureSet, FeatureSetDefinition, FeatureUpdate};
use crate::lock::{BulkModification, ContentListener, ModifyGuard};
use crate::query::{FeatureQueryParameters, FeatureSetQueryParameters};
use crate::types::{FeatureId, FeatureSetId};

/// Pluggable geospatial feature store
///
/// Thread safety: all methods may be called concurrently. Mutations and
/// index reads serialize on the store's modify lock; cursors returned by
/// queries do not hold it.
pub trait FeatureDataStore: Send + Sync {
    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Features matching `params`, filtered, ordered and paginated
    fn query_features(&self, params: &FeatureQueryParameters) -> FeatureDbResult<Cursor<Feature>>;

    /// Number of features `query_features` would return
    fn query_features_count(&self, params: &FeatureQueryParameters) -> FeatureDbResult<usize>;

    /// Feature sets matching `params`, ordered by id
    fn query_feature_sets(
        &self,
        params: &FeatureSetQueryParameters,
    ) -> FeatureDbResult<Cursor<FeatureSet>>;

    /// Number of feature sets `query_feature_sets` would return
    fn query_feature_sets_count(&self, params: &FeatureSetQueryParameters) -> FeatureDbResult<usize>;

    /// Fetch one feature
    fn get_feature(&self, id: FeatureId) -> FeatureDbResult<Option<Feature>>;

    /// Fetch one feature set
    fn get_feature_set(&self, id: FeatureSetId) -> FeatureDbResult<Option<FeatureSet>>;

    // ------------------------------------------------------------------
    // Visibility
    // ------------------------------------------------------------------

    /// Effective visibility of a feature; `false` if unknown
    fn is_feature_visible(&self, id: FeatureId) -> FeatureDbResult<bool>;

    /// Whether a set or any of its features is visible; `false` if unknown
    fn is_feature_set_visible(&self, id: FeatureSetId) -> FeatureDbResult<bool>;

    /// Set one feature's visibility; `false` if the feature is unknown
    fn set_feature_visible(&self, id: FeatureId, visible: bool) -> FeatureDbResult<bool>;

    /// Set visibility of every feature matching `params`
    fn set_features_visible(
        &self,
        params: &FeatureQueryParameters,
        visible: bool,
    ) -> FeatureDbResult<()>;

    /// Set a whole set's visibility, clearing feature deviations
    fn set_feature_set_visible(&self, id: FeatureSetId, visible: bool) -> FeatureDbResult<bool>;

    /// Set visibility of every set matching `params`
    fn set_feature_sets_visible(
        &self,
        params: &FeatureSetQueryParameters,
        visible: bool,
    ) -> FeatureDbResult<()>;

    // ------------------------------------------------------------------
    // Capabilities and locking
    // ------------------------------------------------------------------

    /// Mutations this store accepts
    fn modification_flags(&self) -> ModificationFlags;

    /// Visibility settings this store accepts
    fn visibility_flags(&self) -> VisibilityFlags;

    /// Block until the modify lock is held
    fn acquire_modify_lock(&self, bulk: bool) -> FeatureDbResult<ModifyGuard<'_>>;

    /// Take the modify lock if it is free; `Ok(None)` when contended
    fn try_acquire_modify_lock(&self, bulk: bool) -> FeatureDbResult<Option<ModifyGuard<'_>>>;

    /// Open a bulk modification session
    fn begin_bulk_modification(&self) -> FeatureDbResult<BulkModification<'_>>;

    // ------------------------------------------------------------------
    // Feature set mutations
    // ------------------------------------------------------------------

    /// Insert a feature set
    fn insert_feature_set(&self, definition: &FeatureSetDefinition) -> FeatureDbResult<FeatureSet>;

    /// Rename a feature set
    fn update_feature_set_name(&self, id: FeatureSetId, name: &str) -> FeatureDbResult<bool>;

    /// Change a feature set's resolution thresholds
    fn update_feature_set_resolution(
        &self,
        id: FeatureSetId,
        min_resolution: f64,
        max_resolution: f64,
    ) -> FeatureDbResult<bool>;

    /// Rename and change thresholds in one step
    fn update_feature_set(
        &self,
        id: FeatureSetId,
        name: &str,
        min_resolution: f64,
        max_resolution: f64,
    ) -> FeatureDbResult<bool> {
        let _guard = self.acquire_modify_lock(false)?;
        if !self.update_feature_set_name(id, name)? {
            return Ok(false);
        }
        self.update_feature_set_resolution(id, min_resolution, max_resolution)
    }

    /// Delete a feature set and all its features
    fn delete_feature_set(&self, id: FeatureSetId) -> FeatureDbResult<bool>;

    /// Delete every set matching `params`; returns how many were deleted
    fn delete_feature_sets(&self, params: &FeatureSetQueryParameters) -> FeatureDbResult<usize>;

    /// Delete every set
    fn delete_all_feature_sets(&self) -> FeatureDbResult<usize> {
        self.delete_feature_sets(&FeatureSetQueryParameters::new())
    }

    // ------------------------------------------------------------------
    // Feature mutations
    // ------------------------------------------------------------------

    /// Insert a feature into a set
    fn insert_feature(
        &self,
        feature_set_id: FeatureSetId,
        definition: &FeatureDefinition,
    ) -> FeatureDbResult<Feature>;

    /// Insert several features into a set
    fn insert_features(
        &self,
        feature_set_id: FeatureSetId,
        definitions: &[FeatureDefinition],
    ) -> FeatureDbResult<Vec<Feature>>;

    /// Apply a field-by-field update; `false` if the feature is unknown
    fn update_feature(&self, id: FeatureId, update: &FeatureUpdate) -> FeatureDbResult<bool>;

    /// Delete one feature
    fn delete_feature(&self, id: FeatureId) -> FeatureDbResult<bool>;

    /// Delete every feature matching `params`; returns how many were deleted
    fn delete_features(&self, params: &FeatureQueryParameters) -> FeatureDbResult<usize>;

    /// Delete every feature of a set, keeping the set
    fn delete_all_features(&self, feature_set_id: FeatureSetId) -> FeatureDbResult<usize> {
        self.delete_features(&FeatureQueryParameters::new().with_feature_set_ids([feature_set_id]))
    }

    // ------------------------------------------------------------------
    // Lifecycle and metadata
    // ------------------------------------------------------------------

    /// Invalidate cached aggregate state
    fn refresh(&self) -> FeatureDbResult<()>;

    /// Release all resources; every later call fails with not-available
    fn dispose(&self);

    /// Opaque identity string
    fn uri(&self) -> String;

    /// Whether any feature carries a timestamp
    fn has_time_reference(&self) -> FeatureDbResult<bool> {
        Ok(self.minimum_timestamp()?.is_some())
    }

    /// Earliest feature timestamp
    fn minimum_timestamp(&self) -> FeatureDbResult<Option<i64>>;

    /// Latest feature timestamp
    fn maximum_timestamp(&self) -> FeatureDbResult<Option<i64>>;

    /// Subscribe to content changes
    fn add_content_listener(&self, listener: Arc<dyn ContentListener>);

    /// Unsubscribe from content changes
    fn remove_content_listener(&self, listener: &Arc<dyn ContentListener>);
}
