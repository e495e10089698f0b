//! In-memory feature data store
//!
//! All state lives in one [`MemoryState`] behind a `parking_lot::RwLock`,
//! and every access additionally holds the store's modify lock, so index
//! reads never observe a half-applied mutation. Queries are planned with the
//! shared [`QueryPlanner`]: the cheapest index is materialized, every other
//! filter runs as a [`FilterChain`] over its candidates, and the survivors
//! are sorted and paginated before the lock is released. Returned cursors
//! therefore own their rows and need no lock.
//!
//! There is no rollback: a bulk modification that ends unsuccessfully keeps
//! whatever it already applied.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use featuredb_core::pattern;
use featuredb_core::{
    level_of_detail, BBox, BulkModification, ContentListener, Cursor, Feature, FeatureDataStore,
    FeatureDbError, FeatureDbResult, FeatureDefinition, FeatureId, FeatureQueryParameters,
    FeatureSet, FeatureSetDefinition, FeatureSetId, FeatureSetQueryParameters, FeatureUpdate,
    GeometryType, ModificationFlags, ModifyGuard, VisibilityFlags, FEATURE_ID_NONE,
};
use featuredb_engine::{
    Dimension, FilterChain, MemoryConfig, QueryPlan, QueryPlanner, SelectivityEstimator, SortKey,
    StoreBase, VisibilityChange, VisibilityTracker,
};
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use crate::index::{name_key, BucketIndex};
use crate::quadtree::Quadtree;

static NEXT_STORE: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Records
// ============================================================================

#[derive(Debug)]
struct FeatureRecord {
    feature: Feature,
    envelope: Option<BBox>,
}

impl FeatureRecord {
    fn new(feature: Feature) -> Self {
        let envelope = feature.envelope();
        Self { feature, envelope }
    }
}

#[derive(Debug)]
struct SetRecord {
    set: FeatureSet,
    tracker: VisibilityTracker,
    members: FxHashSet<FeatureId>,
}

impl SetRecord {
    /// Descriptor with visibility state stamped on
    fn descriptor(&self) -> FeatureSet {
        let mut set = self.set.clone();
        self.tracker.stamp(&mut set);
        set
    }

    fn any_visible(&self) -> bool {
        self.tracker.any_visible(self.members.len())
    }

    fn matches(&self, params: &FeatureSetQueryParameters) -> bool {
        params.matches_descriptor(&self.set) && (!params.visible_only || self.any_visible())
    }

    fn visible_members(&self) -> Vec<FeatureId> {
        if self.tracker.baseline() {
            self.members
                .iter()
                .copied()
                .filter(|fid| self.tracker.is_visible(*fid))
                .collect()
        } else {
            self.tracker.deviations().collect()
        }
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug)]
struct MemoryState {
    next_feature_id: FeatureId,
    next_set_id: FeatureSetId,
    features: FxHashMap<FeatureId, FeatureRecord>,
    sets: BTreeMap<FeatureSetId, SetRecord>,
    names: BucketIndex<String, FeatureId>,
    geometry_types: BucketIndex<GeometryType, FeatureId>,
    set_names: BucketIndex<String, FeatureSetId>,
    spatial: Quadtree,
    timestamps: BTreeMap<i64, usize>,
}

impl MemoryState {
    fn new(config: &MemoryConfig) -> Self {
        Self {
            next_feature_id: 1,
            next_set_id: 1,
            features: FxHashMap::default(),
            sets: BTreeMap::new(),
            names: BucketIndex::new(),
            geometry_types: BucketIndex::new(),
            set_names: BucketIndex::new(),
            spatial: Quadtree::new(config.quadtree_node_capacity, config.quadtree_max_depth),
            timestamps: BTreeMap::new(),
        }
    }

    fn clear(&mut self) {
        self.features.clear();
        self.sets.clear();
        self.names.clear();
        self.geometry_types.clear();
        self.set_names.clear();
        self.spatial.clear();
        self.timestamps.clear();
    }

    // ------------------------------------------------------------------
    // Secondary index maintenance
    // ------------------------------------------------------------------

    fn index(&mut self, record: &FeatureRecord) {
        let feature = &record.feature;
        if let Some(name) = &feature.name {
            self.names.insert(name_key(name), feature.id);
        }
        if let Some(ty) = feature.geometry_type() {
            self.geometry_types.insert(ty, feature.id);
        }
        if let Some(envelope) = record.envelope {
            self.spatial.insert(feature.id, envelope);
        }
        if let Some(ts) = feature.timestamp {
            *self.timestamps.entry(ts).or_default() += 1;
        }
    }

    fn unindex(&mut self, record: &FeatureRecord) {
        let feature = &record.feature;
        if let Some(name) = &feature.name {
            self.names.remove(&name_key(name), &feature.id);
        }
        if let Some(ty) = feature.geometry_type() {
            self.geometry_types.remove(&ty, &feature.id);
        }
        if let Some(envelope) = &record.envelope {
            let removed = self.spatial.remove(feature.id, envelope);
            debug_assert!(removed, "feature {} missing from quadtree", feature.id);
        }
        if let Some(ts) = feature.timestamp {
            if let Some(count) = self.timestamps.get_mut(&ts) {
                *count -= 1;
                if *count == 0 {
                    self.timestamps.remove(&ts);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Feature sets
    // ------------------------------------------------------------------

    fn insert_set(&mut self, definition: &FeatureSetDefinition) -> FeatureSet {
        let id = self.next_set_id;
        self.next_set_id += 1;
        let (min_lod, max_lod) = definition.lod_range();
        let set = FeatureSet {
            id,
            name: definition.name.clone(),
            feature_type: definition.feature_type.clone(),
            provider: definition.provider.clone(),
            min_lod,
            max_lod,
            visible: true,
            visible_check: false,
            lod_check: false,
            name_version: 1,
            visible_version: 1,
            lod_version: 1,
        };
        self.set_names.insert(name_key(&set.name), id);
        let record = SetRecord {
            set,
            tracker: VisibilityTracker::new(true),
            members: FxHashSet::default(),
        };
        let descriptor = record.descriptor();
        self.sets.insert(id, record);
        descriptor
    }

    fn rename_set(&mut self, id: FeatureSetId, name: &str) -> bool {
        let Some(record) = self.sets.get_mut(&id) else {
            return false;
        };
        self.set_names.remove(&name_key(&record.set.name), &id);
        record.set.name = name.to_string();
        record.set.name_version += 1;
        self.set_names.insert(name_key(name), id);
        true
    }

    fn set_resolution(&mut self, id: FeatureSetId, min_resolution: f64, max_resolution: f64) -> bool {
        let Some(record) = self.sets.get_mut(&id) else {
            return false;
        };
        record.set.min_lod = level_of_detail(min_resolution);
        record.set.max_lod = level_of_detail(max_resolution);
        record.set.lod_version += 1;
        true
    }

    fn remove_set(&mut self, id: FeatureSetId) -> bool {
        let Some(record) = self.sets.remove(&id) else {
            return false;
        };
        for fid in &record.members {
            if let Some(feature) = self.features.remove(fid) {
                self.unindex(&feature);
            }
        }
        self.set_names.remove(&name_key(&record.set.name), &id);
        true
    }

    /// Sets matching `params`, in id order, before pagination
    fn matching_sets(&self, params: &FeatureSetQueryParameters) -> Vec<&SetRecord> {
        let exact_names = params
            .names
            .as_ref()
            .filter(|names| !names.iter().any(|n| pattern::is_wildcard(n)));

        let mut sets: Vec<&SetRecord> = if let Some(ids) = &params.ids {
            ids.iter().filter_map(|id| self.sets.get(id)).collect()
        } else if let Some(names) = exact_names {
            let ids: FxHashSet<FeatureSetId> = names
                .iter()
                .filter_map(|n| self.set_names.get(&name_key(n)))
                .flatten()
                .copied()
                .collect();
            let mut sets: Vec<&SetRecord> =
                ids.iter().filter_map(|id| self.sets.get(id)).collect();
            sets.sort_by_key(|s| s.set.id);
            sets
        } else {
            self.sets.values().collect()
        };
        sets.retain(|s| s.matches(params));
        sets
    }

    // ------------------------------------------------------------------
    // Features
    // ------------------------------------------------------------------

    fn check_insert(
        &self,
        feature_set_id: FeatureSetId,
        definitions: &[FeatureDefinition],
    ) -> FeatureDbResult<()> {
        if !self.sets.contains_key(&feature_set_id) {
            return Err(FeatureDbError::invalid_argument(format!(
                "feature set {} does not exist",
                feature_set_id
            )));
        }
        let mut requested = FxHashSet::default();
        for definition in definitions {
            if definition.id == FEATURE_ID_NONE {
                continue;
            }
            if self.features.contains_key(&definition.id) || !requested.insert(definition.id) {
                return Err(FeatureDbError::invalid_argument(format!(
                    "feature id {} already in use",
                    definition.id
                )));
            }
        }
        Ok(())
    }

    /// Insert a validated definition
    fn insert_feature(&mut self, feature_set_id: FeatureSetId, definition: &FeatureDefinition) -> Feature {
        let id = if definition.id == FEATURE_ID_NONE {
            let mut id = self.next_feature_id;
            while self.features.contains_key(&id) {
                id += 1;
            }
            id
        } else {
            definition.id
        };
        self.next_feature_id = self.next_feature_id.max(id + 1);

        let feature = definition.clone().into_feature(id, feature_set_id);
        let record = FeatureRecord::new(feature.clone());
        self.index(&record);
        self.features.insert(id, record);
        if let Some(set) = self.sets.get_mut(&feature_set_id) {
            set.members.insert(id);
        }
        feature
    }

    fn update_feature(&mut self, id: FeatureId, update: &FeatureUpdate) -> bool {
        let Some(mut record) = self.features.remove(&id) else {
            return false;
        };
        if !update.is_empty() {
            self.unindex(&record);
            update.apply(&mut record.feature);
            record.envelope = record.feature.envelope();
            self.index(&record);
        }
        self.features.insert(id, record);
        true
    }

    fn remove_feature(&mut self, id: FeatureId) -> bool {
        let Some(record) = self.features.remove(&id) else {
            return false;
        };
        self.unindex(&record);
        if let Some(set) = self.sets.get_mut(&record.feature.feature_set_id) {
            set.members.remove(&id);
            if set.tracker.forget(id, set.members.len()) == VisibilityChange::Collapsed {
                debug!(target: "featuredb::memory", set = set.set.id, "visibility collapsed after delete");
            }
        }
        true
    }

    fn is_visible(&self, feature: &Feature) -> bool {
        self.sets
            .get(&feature.feature_set_id)
            .map_or(false, |set| set.tracker.is_visible(feature.id))
    }

    fn set_feature_visible(&mut self, id: FeatureId, visible: bool) -> Option<VisibilityChange> {
        let fsid = self.features.get(&id)?.feature.feature_set_id;
        let set = self.sets.get_mut(&fsid)?;
        Some(set.tracker.set_feature_visible(id, visible, set.members.len()))
    }

    // ------------------------------------------------------------------
    // Query execution
    // ------------------------------------------------------------------

    /// Ordered, paginated rows matching `params`
    fn select(&self, params: &FeatureQueryParameters, planner: &QueryPlanner) -> Vec<&FeatureRecord> {
        let mut rows = self.filter(params, planner);
        let mut keyed: Vec<(SortKey, &FeatureRecord)> = rows
            .drain(..)
            .map(|record| {
                let max_lod = self
                    .sets
                    .get(&record.feature.feature_set_id)
                    .map_or(0, |s| s.set.max_lod);
                (SortKey::for_feature(&params.order, &record.feature, max_lod), record)
            })
            .collect();
        keyed.sort_by(|(a, _), (b, _)| a.compare(b, &params.order));

        let limit = if params.limit == 0 { usize::MAX } else { params.limit };
        keyed
            .into_iter()
            .skip(params.offset)
            .take(limit)
            .map(|(_, record)| record)
            .collect()
    }

    /// Unordered rows matching every filter of `params`
    fn filter(&self, params: &FeatureQueryParameters, planner: &QueryPlanner) -> Vec<&FeatureRecord> {
        let plan = planner.plan(params, &Estimator { state: self });
        let chain = self.filter_chain(&plan, params);
        debug!(target: "featuredb::memory", driver = ?plan.driver, filters = ?chain, "executing plan");
        self.candidates(plan.driver, params)
            .into_iter()
            .filter_map(|id| self.features.get(&id))
            .filter(|record| chain.accept(record))
            .collect()
    }

    /// Materialize the driving index
    fn candidates(&self, driver: Option<Dimension>, params: &FeatureQueryParameters) -> Vec<FeatureId> {
        match driver {
            None => self.features.keys().copied().collect(),
            Some(Dimension::FeatureIds) => params
                .ids
                .iter()
                .flatten()
                .copied()
                .filter(|id| self.features.contains_key(id))
                .collect(),
            Some(Dimension::FeatureSets) => match &params.feature_sets {
                Some(set_params) => self
                    .matching_sets(set_params)
                    .into_iter()
                    .flat_map(|set| set.members.iter().copied())
                    .collect(),
                None => Vec::new(),
            },
            Some(Dimension::Spatial) => match &params.spatial_filter {
                Some(filter) => {
                    let mut ids = FxHashSet::default();
                    for region in filter.index_boxes() {
                        ids.extend(self.spatial.query(&region));
                    }
                    ids.into_iter().collect()
                }
                None => Vec::new(),
            },
            Some(Dimension::Visibility) => self
                .sets
                .values()
                .flat_map(SetRecord::visible_members)
                .collect(),
            Some(Dimension::GeometryTypes) => params
                .geometry_types
                .iter()
                .flatten()
                .filter_map(|ty| self.geometry_types.get(ty))
                .flatten()
                .copied()
                .collect(),
            Some(Dimension::Names) => {
                let mut ids = FxHashSet::default();
                for pat in params.names.iter().flatten() {
                    if pattern::is_wildcard(pat) {
                        for (key, bucket) in self.names.iter() {
                            if pattern::matches(pat, key) {
                                ids.extend(bucket.iter().copied());
                            }
                        }
                    } else if let Some(bucket) = self.names.get(&name_key(pat)) {
                        ids.extend(bucket.iter().copied());
                    }
                }
                ids.into_iter().collect()
            }
        }
    }

    /// Residual predicates plus the checks no index covers
    fn filter_chain<'a>(
        &'a self,
        plan: &QueryPlan,
        params: &'a FeatureQueryParameters,
    ) -> FilterChain<'a, FeatureRecord> {
        let mut chain: FilterChain<'a, FeatureRecord> = FilterChain::new();
        for dimension in &plan.residual {
            match dimension {
                Dimension::FeatureIds => {
                    if let Some(ids) = &params.ids {
                        chain.push("ids", move |r: &FeatureRecord| ids.contains(&r.feature.id));
                    }
                }
                Dimension::FeatureSets => {
                    if let Some(set_params) = &params.feature_sets {
                        chain.push("feature_sets", move |r: &FeatureRecord| {
                            self.sets
                                .get(&r.feature.feature_set_id)
                                .map_or(false, |set| set.matches(set_params))
                        });
                    }
                }
                // exact test below; the quadtree only narrows by envelope
                Dimension::Spatial => {}
                Dimension::Visibility => {
                    chain.push("visible", move |r: &FeatureRecord| self.is_visible(&r.feature));
                }
                Dimension::GeometryTypes => {
                    if let Some(types) = &params.geometry_types {
                        chain.push("geometry_types", move |r: &FeatureRecord| {
                            r.feature.geometry_type().map_or(false, |ty| types.contains(&ty))
                        });
                    }
                }
                Dimension::Names => {
                    if let Some(names) = &params.names {
                        chain.push("names", move |r: &FeatureRecord| {
                            r.feature
                                .name
                                .as_deref()
                                .map_or(false, |name| pattern::matches_any(names, name))
                        });
                    }
                }
            }
        }
        if let Some(filter) = &params.spatial_filter {
            chain.push("spatial", move |r: &FeatureRecord| {
                match (&r.feature.geometry, &r.envelope) {
                    (Some(geometry), Some(envelope)) => filter.matches(geometry, envelope),
                    _ => false,
                }
            });
        }
        let lod = params.lod_range();
        if !lod.is_unbounded() {
            chain.push("lod", move |r: &FeatureRecord| {
                self.sets
                    .get(&r.feature.feature_set_id)
                    .map_or(false, |set| lod.matches(set.set.min_lod, set.set.max_lod))
            });
        }
        chain
    }
}

// ============================================================================
// Estimation
// ============================================================================

struct Estimator<'a> {
    state: &'a MemoryState,
}

impl SelectivityEstimator for Estimator<'_> {
    fn total(&self) -> usize {
        self.state.features.len()
    }

    fn estimate(&self, dimension: Dimension, params: &FeatureQueryParameters) -> usize {
        let state = self.state;
        match dimension {
            Dimension::FeatureIds => params.ids.as_ref().map_or(self.total(), |ids| ids.len()),
            Dimension::FeatureSets => params.feature_sets.as_ref().map_or(self.total(), |p| {
                state
                    .sets
                    .values()
                    .filter(|set| p.matches_descriptor(&set.set))
                    .map(|set| set.members.len())
                    .sum()
            }),
            Dimension::Spatial => params.spatial_filter.as_ref().map_or(self.total(), |f| {
                f.index_boxes()
                    .iter()
                    .map(|region| state.spatial.estimate(region))
                    .sum()
            }),
            Dimension::Visibility => state
                .sets
                .values()
                .map(|set| set.tracker.visible_count(set.members.len()))
                .sum(),
            Dimension::GeometryTypes => params.geometry_types.as_ref().map_or(self.total(), |types| {
                types
                    .iter()
                    .map(|ty| state.geometry_types.bucket_len(ty))
                    .sum()
            }),
            Dimension::Names => match &params.names {
                Some(_) if params.has_wildcard_names() => self.total(),
                Some(names) => names
                    .iter()
                    .map(|n| state.names.bucket_len(&name_key(n)))
                    .sum(),
                None => self.total(),
            },
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Feature data store held entirely in memory
///
/// # Example
///
/// ```ignore
/// let store = MemoryFeatureDataStore::new();
/// let roads = store.insert_feature_set(&FeatureSetDefinition::new("roads", "osm"))?;
/// store.insert_feature(roads.id, &FeatureDefinition::new("Main St", point!(x: 1.0, y: 2.0)))?;
/// ```
pub struct MemoryFeatureDataStore {
    base: StoreBase,
    planner: QueryPlanner,
    config: MemoryConfig,
    state: RwLock<MemoryState>,
}

impl MemoryFeatureDataStore {
    /// Empty store accepting every modification
    pub fn new() -> Self {
        Self::with_config(&MemoryConfig::default())
    }

    /// Empty store with explicit index parameters
    pub fn with_config(config: &MemoryConfig) -> Self {
        let uri = format!("memory:0x{:08x}", NEXT_STORE.fetch_add(1, Ordering::Relaxed));
        info!(target: "featuredb::memory", uri = %uri, "opened in-memory data store");
        Self {
            base: StoreBase::new(uri, ModificationFlags::ALL, VisibilityFlags::ALL),
            planner: QueryPlanner::new(),
            config: config.clone(),
            state: RwLock::new(MemoryState::new(config)),
        }
    }

    /// Restrict the accepted modifications and visibility settings
    pub fn with_capabilities(
        mut self,
        modification_flags: ModificationFlags,
        visibility_flags: VisibilityFlags,
    ) -> Self {
        self.base = StoreBase::new(self.base.uri(), modification_flags, visibility_flags);
        self
    }

    /// Replace the index-selection strategy
    pub fn with_planner(mut self, planner: QueryPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Index parameters in use
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn feature_ids(&self, state: &MemoryState, params: &FeatureQueryParameters) -> Vec<FeatureId> {
        state
            .select(params, &self.planner)
            .into_iter()
            .map(|r| r.feature.id)
            .collect()
    }

    fn set_ids(state: &MemoryState, params: &FeatureSetQueryParameters) -> Vec<FeatureSetId> {
        paginate_slice(state.matching_sets(params), params.offset, params.limit)
            .map(|s| s.set.id)
            .collect()
    }
}

impl Default for MemoryFeatureDataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate_slice<T>(rows: Vec<T>, offset: usize, limit: usize) -> impl Iterator<Item = T> {
    let limit = if limit == 0 { usize::MAX } else { limit };
    rows.into_iter().skip(offset).take(limit)
}

fn paginated_count(total: usize, offset: usize, limit: usize) -> usize {
    let remaining = total.saturating_sub(offset);
    if limit == 0 {
        remaining
    } else {
        remaining.min(limit)
    }
}

impl FeatureDataStore for MemoryFeatureDataStore {
    fn query_features(&self, params: &FeatureQueryParameters) -> FeatureDbResult<Cursor<Feature>> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        let rows: Vec<Feature> = state
            .select(params, &self.planner)
            .into_iter()
            .map(|record| {
                let mut feature = record.feature.clone();
                params.ignored_fields.strip(&mut feature);
                feature
            })
            .collect();
        Ok(Cursor::from_vec(rows))
    }

    fn query_features_count(&self, params: &FeatureQueryParameters) -> FeatureDbResult<usize> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        let total = state.filter(params, &self.planner).len();
        Ok(paginated_count(total, params.offset, params.limit))
    }

    fn query_feature_sets(
        &self,
        params: &FeatureSetQueryParameters,
    ) -> FeatureDbResult<Cursor<FeatureSet>> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        let rows: Vec<FeatureSet> =
            paginate_slice(state.matching_sets(params), params.offset, params.limit)
                .map(SetRecord::descriptor)
                .collect();
        Ok(Cursor::from_vec(rows))
    }

    fn query_feature_sets_count(&self, params: &FeatureSetQueryParameters) -> FeatureDbResult<usize> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        let total = state.matching_sets(params).len();
        Ok(paginated_count(total, params.offset, params.limit))
    }

    fn get_feature(&self, id: FeatureId) -> FeatureDbResult<Option<Feature>> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        Ok(state.features.get(&id).map(|r| r.feature.clone()))
    }

    fn get_feature_set(&self, id: FeatureSetId) -> FeatureDbResult<Option<FeatureSet>> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        Ok(state.sets.get(&id).map(SetRecord::descriptor))
    }

    fn is_feature_visible(&self, id: FeatureId) -> FeatureDbResult<bool> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        Ok(state
            .features
            .get(&id)
            .map_or(false, |r| state.is_visible(&r.feature)))
    }

    fn is_feature_set_visible(&self, id: FeatureSetId) -> FeatureDbResult<bool> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        Ok(state.sets.get(&id).map_or(false, SetRecord::any_visible))
    }

    fn set_feature_visible(&self, id: FeatureId, visible: bool) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify_visibility(VisibilityFlags::FEATURE, "set feature visible")?;
        let mut state = self.state.write();
        match state.set_feature_visible(id, visible) {
            Some(change) => {
                if change.is_change() {
                    guard.mark_changed();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_features_visible(
        &self,
        params: &FeatureQueryParameters,
        visible: bool,
    ) -> FeatureDbResult<()> {
        let guard = self
            .base
            .modify_visibility(VisibilityFlags::FEATURE, "set features visible")?;
        let mut state = self.state.write();
        let ids = self.feature_ids(&state, params);
        let mut changed = 0usize;
        for id in ids {
            if state
                .set_feature_visible(id, visible)
                .map_or(false, VisibilityChange::is_change)
            {
                changed += 1;
            }
        }
        if changed > 0 {
            guard.mark_changed();
        }
        debug!(target: "featuredb::memory", changed, visible, "set features visible");
        Ok(())
    }

    fn set_feature_set_visible(&self, id: FeatureSetId, visible: bool) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify_visibility(VisibilityFlags::FEATURESET, "set feature set visible")?;
        let mut state = self.state.write();
        let Some(set) = state.sets.get_mut(&id) else {
            return Ok(false);
        };
        set.tracker.set_visible(visible);
        guard.mark_changed();
        Ok(true)
    }

    fn set_feature_sets_visible(
        &self,
        params: &FeatureSetQueryParameters,
        visible: bool,
    ) -> FeatureDbResult<()> {
        let guard = self
            .base
            .modify_visibility(VisibilityFlags::FEATURESET, "set feature sets visible")?;
        let mut state = self.state.write();
        let ids = Self::set_ids(&state, params);
        for id in &ids {
            if let Some(set) = state.sets.get_mut(id) {
                set.tracker.set_visible(visible);
            }
        }
        if !ids.is_empty() {
            guard.mark_changed();
        }
        Ok(())
    }

    fn modification_flags(&self) -> ModificationFlags {
        self.base.modification_flags()
    }

    fn visibility_flags(&self) -> VisibilityFlags {
        self.base.visibility_flags()
    }

    fn acquire_modify_lock(&self, bulk: bool) -> FeatureDbResult<ModifyGuard<'_>> {
        self.base.acquire(bulk)
    }

    fn try_acquire_modify_lock(&self, bulk: bool) -> FeatureDbResult<Option<ModifyGuard<'_>>> {
        self.base.try_acquire(bulk)
    }

    fn begin_bulk_modification(&self) -> FeatureDbResult<BulkModification<'_>> {
        let guard = self.base.acquire(true)?;
        let uri = self.base.uri().to_string();
        Ok(BulkModification::new(guard, move |success| {
            if success {
                debug!(target: "featuredb::memory", uri = %uri, "bulk modification committed");
            } else {
                warn!(target: "featuredb::memory", uri = %uri, "bulk modification ended unsuccessfully; in-memory changes are kept");
            }
            Ok(())
        }))
    }

    fn insert_feature_set(&self, definition: &FeatureSetDefinition) -> FeatureDbResult<FeatureSet> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_INSERT, "insert feature set")?;
        let mut state = self.state.write();
        let set = state.insert_set(definition);
        guard.mark_changed();
        debug!(target: "featuredb::memory", id = set.id, name = %set.name, "inserted feature set");
        Ok(set)
    }

    fn update_feature_set_name(&self, id: FeatureSetId, name: &str) -> FeatureDbResult<bool> {
        let guard = self.base.modify(
            ModificationFlags::FEATURESET_UPDATE | ModificationFlags::FEATURESET_NAME,
            "update feature set name",
        )?;
        let mut state = self.state.write();
        let updated = state.rename_set(id, name);
        if updated {
            guard.mark_changed();
        }
        Ok(updated)
    }

    fn update_feature_set_resolution(
        &self,
        id: FeatureSetId,
        min_resolution: f64,
        max_resolution: f64,
    ) -> FeatureDbResult<bool> {
        let guard = self.base.modify(
            ModificationFlags::FEATURESET_UPDATE | ModificationFlags::FEATURESET_DISPLAY_THRESHOLDS,
            "update feature set resolution",
        )?;
        let mut state = self.state.write();
        let updated = state.set_resolution(id, min_resolution, max_resolution);
        if updated {
            guard.mark_changed();
        }
        Ok(updated)
    }

    fn delete_feature_set(&self, id: FeatureSetId) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_DELETE, "delete feature set")?;
        let mut state = self.state.write();
        let deleted = state.remove_set(id);
        if deleted {
            guard.mark_changed();
        }
        Ok(deleted)
    }

    fn delete_feature_sets(&self, params: &FeatureSetQueryParameters) -> FeatureDbResult<usize> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_DELETE, "delete feature sets")?;
        let mut state = self.state.write();
        let ids = Self::set_ids(&state, params);
        let deleted = ids.into_iter().filter(|id| state.remove_set(*id)).count();
        if deleted > 0 {
            guard.mark_changed();
        }
        debug!(target: "featuredb::memory", deleted, "deleted feature sets");
        Ok(deleted)
    }

    fn insert_feature(
        &self,
        feature_set_id: FeatureSetId,
        definition: &FeatureDefinition,
    ) -> FeatureDbResult<Feature> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_FEATURE_INSERT, "insert feature")?;
        let mut state = self.state.write();
        state.check_insert(feature_set_id, std::slice::from_ref(definition))?;
        let feature = state.insert_feature(feature_set_id, definition);
        guard.mark_changed();
        Ok(feature)
    }

    fn insert_features(
        &self,
        feature_set_id: FeatureSetId,
        definitions: &[FeatureDefinition],
    ) -> FeatureDbResult<Vec<Feature>> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_FEATURE_INSERT, "insert features")?;
        let mut state = self.state.write();
        state.check_insert(feature_set_id, definitions)?;
        let features: Vec<Feature> = definitions
            .iter()
            .map(|definition| state.insert_feature(feature_set_id, definition))
            .collect();
        if !features.is_empty() {
            guard.mark_changed();
        }
        debug!(target: "featuredb::memory", set = feature_set_id, count = features.len(), "inserted features");
        Ok(features)
    }

    fn update_feature(&self, id: FeatureId, update: &FeatureUpdate) -> FeatureDbResult<bool> {
        let guard = self.base.modify(update.required_flags(), "update feature")?;
        let mut state = self.state.write();
        let updated = state.update_feature(id, update);
        if updated && !update.is_empty() {
            guard.mark_changed();
        }
        Ok(updated)
    }

    fn delete_feature(&self, id: FeatureId) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_FEATURE_DELETE, "delete feature")?;
        let mut state = self.state.write();
        let deleted = state.remove_feature(id);
        if deleted {
            guard.mark_changed();
        }
        Ok(deleted)
    }

    fn delete_features(&self, params: &FeatureQueryParameters) -> FeatureDbResult<usize> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_FEATURE_DELETE, "delete features")?;
        let mut state = self.state.write();
        let ids = self.feature_ids(&state, params);
        let deleted = ids.into_iter().filter(|id| state.remove_feature(*id)).count();
        if deleted > 0 {
            guard.mark_changed();
        }
        debug!(target: "featuredb::memory", deleted, "deleted features");
        Ok(deleted)
    }

    fn refresh(&self) -> FeatureDbResult<()> {
        self.base.check_open()?;
        debug!(target: "featuredb::memory", uri = %self.base.uri(), "refresh");
        Ok(())
    }

    fn dispose(&self) {
        if self.base.dispose() {
            self.state.write().clear();
        }
    }

    fn uri(&self) -> String {
        self.base.uri().to_string()
    }

    fn minimum_timestamp(&self) -> FeatureDbResult<Option<i64>> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        Ok(state.timestamps.keys().next().copied())
    }

    fn maximum_timestamp(&self) -> FeatureDbResult<Option<i64>> {
        let _guard = self.base.lock()?;
        let state = self.state.read();
        Ok(state.timestamps.keys().next_back().copied())
    }

    fn add_content_listener(&self, listener: Arc<dyn ContentListener>) {
        self.base.modify_lock().add_listener(listener);
    }

    fn remove_content_listener(&self, listener: &Arc<dyn ContentListener>) {
        self.base.modify_lock().remove_listener(listener);
    }
}
