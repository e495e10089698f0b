//! SQLite feature data store
//!
//! [`SqliteFeatureDataStore`] keeps one connection behind a mutex and, like
//! the in-memory backend, takes the store's modify lock around every call.
//! Query rows are read completely while both are held, so returned cursors
//! own their rows and need neither.
//!
//! ## Writes
//!
//! Every mutation runs inside a savepoint. Outside a bulk modification the
//! savepoint is its own transaction; inside one it nests in the bulk
//! `BEGIN IMMEDIATE` transaction, so a failed call only undoes itself. After
//! any rollback the attribute schema registry is reloaded from
//! `attribs_schema`, since ids registered by the undone writes are gone.
//!
//! ## Visibility
//!
//! Feature overrides follow the stamp protocol of the triggers in
//! [`crate::schema`]. After a feature toggle or delete the owning set is
//! settled: with no deviating member its check flag is cleared, and when
//! every member deviates the baseline flips.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use featuredb_core::geometry::normalize_geometry;
use featuredb_core::types::timestamp_to_raw;
use featuredb_core::{
    AttributeSet, AttributeUpdate, BBox, BulkModification, ContentListener, Cursor, Feature,
    FeatureDataStore, FeatureDbError, FeatureDbResult, FeatureDefinition, FeatureId,
    FeatureQueryParameters, FeatureSet, FeatureSetDefinition, FeatureSetId,
    FeatureSetQueryParameters, FeatureUpdate, GeometryType, IgnoredFields, ModificationFlags,
    ModifyGuard, SpatialFilter, Style, VisibilityFlags, FEATURE_ID_NONE, TIMESTAMP_NONE,
    level_of_detail,
};
use featuredb_engine::{
    paginate, Dimension, FeatureDbConfig, KeyedSource, MergeCursor, QueryConfig, QueryPlan,
    QueryPlanner, SelectivityEstimator, StoreBase,
};
use geo_types::Geometry;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard, RwLock};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, warn};

use crate::codec::style::MSGPACK_CODEC_ID;
use crate::codec::{attributes, style_codec, wkb, AttributeSchema};
use crate::connection::open_connection;
use crate::error::StorageResultExt;
use crate::row::{feature_set_from_row, FeatureRow};
use crate::schema::ensure_schema;
use crate::sql::{self, Projection, SetScope, Statement, WhereClause, Window};

// ============================================================================
// Cached state
// ============================================================================

/// Aggregates recomputed lazily after a mutation or refresh
#[derive(Debug, Default)]
struct AggregateCache {
    timestamps: Option<(Option<i64>, Option<i64>)>,
    set_counts: Option<Arc<FxHashMap<FeatureSetId, usize>>>,
}

#[derive(Debug, Default)]
struct BulkState {
    depth: usize,
    failed: bool,
}

// ============================================================================
// Store
// ============================================================================

/// Feature data store persisted in a SQLite database file
///
/// # Example
///
/// ```ignore
/// let store = SqliteFeatureDataStore::open(dir.path().join("features.sqlite"))?;
/// let roads = store.insert_feature_set(&FeatureSetDefinition::new("roads", "osm"))?;
/// store.insert_feature(roads.id, &FeatureDefinition::new("Main St", point!(x: 1.0, y: 2.0)))?;
/// ```
pub struct SqliteFeatureDataStore {
    base: StoreBase,
    planner: QueryPlanner,
    query_config: QueryConfig,
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
    schema: RwLock<AttributeSchema>,
    cache: Mutex<AggregateCache>,
    bulk: Mutex<BulkState>,
}

impl SqliteFeatureDataStore {
    /// Open (creating if needed) the database at `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> FeatureDbResult<Self> {
        Self::open_with_config(path, &FeatureDbConfig::default())
    }

    /// Open the database at `path` with the `[sqlite]` and `[query]`
    /// settings and capabilities of `config`
    pub fn open_with_config(path: impl AsRef<Path>, config: &FeatureDbConfig) -> FeatureDbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut conn = open_connection(&path, &config.sqlite)?;
        let created = ensure_schema(&mut conn)?;
        let schema = load_attribute_schema(&conn)?;
        let uri = format!("sqlite:{}", path.display());
        info!(
            target: "featuredb::sqlite",
            uri = %uri,
            created,
            attribute_keys = schema.len(),
            read_only = config.read_only,
            "opened SQLite data store"
        );
        Ok(Self {
            base: StoreBase::new(uri, config.modification_flags(), config.visibility_flags()),
            planner: QueryPlanner::new(),
            query_config: config.query.clone(),
            path,
            conn: Mutex::new(Some(conn)),
            schema: RwLock::new(schema),
            cache: Mutex::new(AggregateCache::default()),
            bulk: Mutex::new(BulkState::default()),
        })
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

    /// Database file backing this store
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> FeatureDbResult<MappedMutexGuard<'_, Connection>> {
        MutexGuard::try_map(self.conn.lock(), Option::as_mut).map_err(|_| {
            FeatureDbError::not_available(format!("data store {} has been disposed", self.base.uri()))
        })
    }

    fn invalidate(&self) {
        *self.cache.lock() = AggregateCache::default();
    }

    /// Run `f` in a savepoint; roll back and resynchronize on failure
    fn transact<T, F>(&self, operation: &str, f: F) -> FeatureDbResult<T>
    where
        F: FnOnce(&Connection, &mut AttributeSchema) -> FeatureDbResult<T>,
    {
        let mut conn = self.connection()?;
        let mut schema = self.schema.write();
        let result = in_savepoint(&mut conn, operation, |tx| f(tx, &mut *schema));
        if let Err(e) = &result {
            warn!(target: "featuredb::sqlite", operation, error = %e, "write rolled back");
            self.resync(&conn, &mut schema);
        }
        result
    }

    /// Reload the schema registry and drop cached aggregates
    fn resync(&self, conn: &Connection, schema: &mut AttributeSchema) {
        match load_attribute_schema(conn) {
            Ok(loaded) => *schema = loaded,
            Err(e) => {
                error!(target: "featuredb::sqlite", error = %e, "failed to reload attribute schema")
            }
        }
        self.invalidate();
    }

    // ------------------------------------------------------------------
    // Bulk transactions
    // ------------------------------------------------------------------

    fn begin_bulk(&self) -> FeatureDbResult<()> {
        let conn = self.connection()?;
        let mut bulk = self.bulk.lock();
        if bulk.depth == 0 {
            conn.execute_batch("BEGIN IMMEDIATE")
                .storage("begin bulk modification")?;
            bulk.failed = false;
            debug!(target: "featuredb::sqlite", uri = %self.base.uri(), "bulk transaction started");
        }
        bulk.depth += 1;
        Ok(())
    }

    fn end_bulk(&self, success: bool) -> FeatureDbResult<()> {
        let conn = match self.connection() {
            Ok(conn) => conn,
            Err(e) => {
                *self.bulk.lock() = BulkState::default();
                return Err(e);
            }
        };
        let failed = {
            let mut bulk = self.bulk.lock();
            bulk.depth = bulk.depth.saturating_sub(1);
            bulk.failed |= !success;
            if bulk.depth > 0 {
                return Ok(());
            }
            std::mem::take(&mut bulk.failed)
        };

        if !failed {
            return match conn.execute_batch("COMMIT") {
                Ok(()) => {
                    debug!(target: "featuredb::sqlite", uri = %self.base.uri(), "bulk transaction committed");
                    Ok(())
                }
                Err(e) => {
                    warn!(target: "featuredb::sqlite", error = %e, "bulk commit failed");
                    self.rollback_bulk(&conn)?;
                    Err(FeatureDbError::storage(format!("commit bulk modification: {}", e)))
                }
            };
        }
        warn!(target: "featuredb::sqlite", uri = %self.base.uri(), "bulk modification rolled back");
        self.rollback_bulk(&conn)
    }

    fn rollback_bulk(&self, conn: &Connection) -> FeatureDbResult<()> {
        let result = conn
            .execute_batch("ROLLBACK")
            .storage("roll back bulk modification");
        let mut schema = self.schema.write();
        self.resync(conn, &mut schema);
        result
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    fn set_counts(&self, conn: &Connection) -> FeatureDbResult<Arc<FxHashMap<FeatureSetId, usize>>> {
        let mut cache = self.cache.lock();
        if let Some(counts) = &cache.set_counts {
            return Ok(Arc::clone(counts));
        }
        let mut stmt = conn
            .prepare_cached("SELECT fsid, COUNT(*) FROM features GROUP BY fsid")
            .storage("prepare set counts")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))
            .storage("count features per set")?;
        let mut counts = FxHashMap::default();
        for row in rows {
            let (fsid, count) = row.storage("read set count")?;
            counts.insert(fsid, count.max(0) as usize);
        }
        let counts = Arc::new(counts);
        cache.set_counts = Some(Arc::clone(&counts));
        Ok(counts)
    }

    fn timestamps(&self, conn: &Connection) -> FeatureDbResult<(Option<i64>, Option<i64>)> {
        let mut cache = self.cache.lock();
        if let Some(range) = cache.timestamps {
            return Ok(range);
        }
        let range: (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT MIN(timestamp), MAX(timestamp) FROM features WHERE timestamp != ?1",
                [TIMESTAMP_NONE],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .storage("aggregate timestamps")?;
        cache.timestamps = Some(range);
        Ok(range)
    }

    // ------------------------------------------------------------------
    // Query execution
    // ------------------------------------------------------------------

    fn plan(&self, conn: &Connection, params: &FeatureQueryParameters) -> FeatureDbResult<QueryPlan> {
        let counts = self.set_counts(conn)?;
        let estimator = SqlEstimator {
            conn,
            set_counts: &counts,
        };
        Ok(self.planner.plan(params, &estimator))
    }

    /// Ordered, paginated rows matching `params`
    fn select_rows(
        &self,
        conn: &Connection,
        params: &FeatureQueryParameters,
        projection: Projection,
    ) -> FeatureDbResult<Vec<FeatureRow>> {
        let scopes = set_scopes(conn, params)?;
        if scopes.is_empty() {
            return Ok(Vec::new());
        }
        let plan = self.plan(conn, params)?;
        if let [scope] = scopes.as_slice() {
            let stmt = sql::select_features(
                params,
                &plan,
                scope,
                projection,
                Window::page(params.offset, params.limit),
            );
            return run_rows(conn, &stmt, sql::distance_count(&params.order));
        }
        merge_rows(conn, params, &plan, &scopes, projection)
    }

    /// Ids of the rows `select_rows` would return, in the same order
    fn select_ids(&self, conn: &Connection, params: &FeatureQueryParameters) -> FeatureDbResult<Vec<FeatureId>> {
        let scopes = set_scopes(conn, params)?;
        if scopes.is_empty() {
            return Ok(Vec::new());
        }
        let plan = self.plan(conn, params)?;
        if let [scope] = scopes.as_slice() {
            let stmt = sql::select_features(
                params,
                &plan,
                scope,
                Projection::Ids,
                Window::page(params.offset, params.limit),
            );
            return query_ids(conn, &stmt);
        }
        Ok(merge_rows(conn, params, &plan, &scopes, Projection::Keys)?
            .into_iter()
            .map(|row| row.fid)
            .collect())
    }

    fn count_rows(&self, conn: &Connection, params: &FeatureQueryParameters) -> FeatureDbResult<usize> {
        let scopes = set_scopes(conn, params)?;
        if scopes.is_empty() {
            return Ok(0);
        }
        let plan = self.plan(conn, params)?;
        if let [scope] = scopes.as_slice() {
            let stmt = sql::count_features(params, &plan, scope, Window::page(params.offset, params.limit));
            return query_count(conn, &stmt);
        }
        if params.limit > 0
            && params.offset > 0
            && scopes.len() > self.query_config.count_fallback_threshold
        {
            warn!(
                target: "featuredb::sqlite",
                sub_queries = scopes.len(),
                offset = params.offset,
                limit = params.limit,
                "counting through merged cursor"
            );
            return Ok(merge_rows(conn, params, &plan, &scopes, Projection::Keys)?.len());
        }
        let mut total = 0;
        for scope in &scopes {
            total += query_count(conn, &sql::count_features(params, &plan, scope, Window::All))?;
        }
        Ok(paginated_count(total, params.offset, params.limit))
    }
}

// ============================================================================
// Estimation
// ============================================================================

/// Candidate counts from per-set counts and index lookups
struct SqlEstimator<'a> {
    conn: &'a Connection,
    set_counts: &'a FxHashMap<FeatureSetId, usize>,
}

impl SqlEstimator<'_> {
    fn count(&self, sql: &str, values: &[Value]) -> Option<usize> {
        match self
            .conn
            .query_row(sql, params_from_iter(values.iter()), |row| row.get::<_, i64>(0))
        {
            Ok(n) => Some(n.max(0) as usize),
            Err(e) => {
                debug!(target: "featuredb::planner", error = %e, "estimate failed");
                None
            }
        }
    }

    fn set_members(&self, params: &FeatureSetQueryParameters) -> Option<usize> {
        let clause = sql::feature_set_filter(params);
        let ids = query_ids(
            self.conn,
            &Statement {
                sql: format!("SELECT featuresets.id FROM featuresets{}", clause.sql()),
                params: clause.params().to_vec(),
            },
        )
        .ok()?;
        Some(ids.iter().filter_map(|id| self.set_counts.get(id)).sum())
    }

    fn spatial(&self, filter: &SpatialFilter) -> Option<usize> {
        let mut terms = Vec::with_capacity(3);
        let mut values = Vec::with_capacity(12);
        for b in filter.index_boxes() {
            terms.push("(xmin <= ? AND xmax >= ? AND ymin <= ? AND ymax >= ?)");
            values.extend([
                Value::Real(b.max_lng),
                Value::Real(b.min_lng),
                Value::Real(b.max_lat),
                Value::Real(b.min_lat),
            ]);
        }
        self.count(
            &format!("SELECT COUNT(*) FROM idx_features_geometry WHERE {}", terms.join(" OR ")),
            &values,
        )
    }

    fn visible(&self) -> Option<usize> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id, visible, visible_check FROM featuresets")
            .ok()?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, bool>(1)?, row.get::<_, bool>(2)?))
            })
            .ok()?;
        let mut total = 0;
        for row in rows {
            let (id, visible, check) = row.ok()?;
            let members = self.set_counts.get(&id).copied().unwrap_or(0);
            total += match (visible, check) {
                (_, true) => members / 2,
                (true, false) => members,
                (false, false) => 0,
            };
        }
        Some(total)
    }

    fn in_list(&self, column: &str, values: Vec<Value>) -> Option<usize> {
        if values.is_empty() {
            return Some(0);
        }
        self.count(
            &format!(
                "SELECT COUNT(*) FROM features WHERE {} IN ({})",
                column,
                sql::placeholders(values.len())
            ),
            &values,
        )
    }
}

impl SelectivityEstimator for SqlEstimator<'_> {
    fn total(&self) -> usize {
        self.set_counts.values().sum()
    }

    fn estimate(&self, dimension: Dimension, params: &FeatureQueryParameters) -> usize {
        let estimate = match dimension {
            Dimension::FeatureIds => params.ids.as_ref().map(|ids| ids.len()),
            Dimension::FeatureSets => params.feature_sets.as_ref().and_then(|p| self.set_members(p)),
            Dimension::Spatial => params.spatial_filter.as_ref().and_then(|f| self.spatial(f)),
            Dimension::Visibility => self.visible(),
            Dimension::GeometryTypes => params.geometry_types.as_ref().and_then(|types| {
                self.in_list(
                    "geometry_type",
                    types.iter().map(|t| Value::Integer(*t as i64)).collect(),
                )
            }),
            Dimension::Names => match &params.names {
                Some(_) if params.has_wildcard_names() => None,
                Some(names) => self.in_list(
                    "name",
                    names.iter().map(|n| Value::Text(n.clone())).collect(),
                ),
                None => None,
            },
        };
        estimate.unwrap_or_else(|| self.total())
    }
}

// ============================================================================
// Statement helpers
// ============================================================================

fn in_savepoint<T, F>(conn: &mut Connection, operation: &str, f: F) -> FeatureDbResult<T>
where
    F: FnOnce(&Connection) -> FeatureDbResult<T>,
{
    let sp = conn.savepoint().storage(operation)?;
    let value = f(&sp)?;
    sp.commit().storage(operation)?;
    Ok(value)
}

fn run_rows(conn: &Connection, stmt: &Statement, distances: usize) -> FeatureDbResult<Vec<FeatureRow>> {
    debug!(target: "featuredb::sqlite", sql = %stmt.sql, "feature query");
    let mut prepared = conn.prepare_cached(&stmt.sql).storage("prepare feature query")?;
    let rows = prepared
        .query_map(params_from_iter(stmt.params.iter()), |row| {
            FeatureRow::from_row(row, distances)
        })
        .storage("query features")?;
    rows.collect::<Result<Vec<_>, _>>().storage("read feature row")
}

fn query_ids(conn: &Connection, stmt: &Statement) -> FeatureDbResult<Vec<i64>> {
    debug!(target: "featuredb::sqlite", sql = %stmt.sql, "id query");
    let mut prepared = conn.prepare_cached(&stmt.sql).storage("prepare id query")?;
    let rows = prepared
        .query_map(params_from_iter(stmt.params.iter()), |row| row.get::<_, i64>(0))
        .storage("query ids")?;
    rows.collect::<Result<Vec<_>, _>>().storage("read id")
}

fn query_count(conn: &Connection, stmt: &Statement) -> FeatureDbResult<usize> {
    debug!(target: "featuredb::sqlite", sql = %stmt.sql, "count query");
    let n: i64 = conn
        .query_row(&stmt.sql, params_from_iter(stmt.params.iter()), |row| row.get(0))
        .storage("count")?;
    Ok(n.max(0) as usize)
}

fn query_sets(conn: &Connection, stmt: &Statement) -> FeatureDbResult<Vec<FeatureSet>> {
    let mut prepared = conn.prepare_cached(&stmt.sql).storage("prepare feature set query")?;
    let rows = prepared
        .query_map(params_from_iter(stmt.params.iter()), feature_set_from_row)
        .storage("query feature sets")?;
    rows.collect::<Result<Vec<_>, _>>().storage("read feature set")
}

fn load_set(conn: &Connection, id: FeatureSetId) -> FeatureDbResult<Option<FeatureSet>> {
    conn.query_row(
        &format!("SELECT {} FROM featuresets WHERE id = ?1", sql::FEATURE_SET_COLUMNS),
        [id],
        feature_set_from_row,
    )
    .optional()
    .storage("load feature set")
}

fn load_attribute_schema(conn: &Connection) -> FeatureDbResult<AttributeSchema> {
    let mut stmt = conn
        .prepare("SELECT id, name, coding FROM attribs_schema")
        .storage("prepare attribute schema")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, String>(1)?, row.get::<_, i32>(2)?))
        })
        .storage("load attribute schema")?;
    let mut schema = AttributeSchema::new();
    for row in rows {
        let (id, key, type_code) = row.storage("read attribute schema")?;
        schema.register(id, key, type_code);
    }
    Ok(schema)
}

/// Each sub-query ordered and cut to `offset + limit` rows, then merged and
/// paginated
fn merge_rows(
    conn: &Connection,
    params: &FeatureQueryParameters,
    plan: &QueryPlan,
    scopes: &[SetScope],
    projection: Projection,
) -> FeatureDbResult<Vec<FeatureRow>> {
    let head = if params.limit == 0 {
        Window::All
    } else {
        Window::Page {
            offset: 0,
            limit: params.offset + params.limit,
        }
    };
    let distances = sql::distance_count(&params.order);
    let mut sources: Vec<KeyedSource<FeatureRow>> = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let rows = run_rows(conn, &sql::select_features(params, plan, scope, projection, head), distances)?;
        sources.push(Box::new(rows.into_iter().map(|row| (row.sort_key(), row))));
    }
    let merged = Cursor::new(MergeCursor::new(params.order.clone(), sources));
    Ok(paginate(merged, params.offset, params.limit).collect())
}

/// Split the sets a feature query can touch into sub-query scopes
///
/// Sets whose flags already decide the query are either dropped or pooled
/// into one `fsid IN` scope; sets with per-feature overrides that matter get
/// a checked scope each. An empty result means nothing can match.
fn set_scopes(conn: &Connection, params: &FeatureQueryParameters) -> FeatureDbResult<Vec<SetScope>> {
    let lod = params.lod_range();
    if params.feature_sets.is_none() && !params.visible_only && lod.is_unbounded() {
        return Ok(vec![SetScope::All]);
    }
    let clause = match &params.feature_sets {
        Some(set_params) => sql::feature_set_filter(set_params),
        None => WhereClause::new(),
    };
    let sets = query_sets(
        conn,
        &Statement {
            sql: format!(
                "SELECT {} FROM featuresets{} ORDER BY featuresets.id",
                sql::FEATURE_SET_COLUMNS,
                clause.sql()
            ),
            params: clause.params().to_vec(),
        },
    )?;

    let lod_bounded = !lod.is_unbounded();
    let mut plain = Vec::new();
    let mut checked = Vec::new();
    let mut dropped = false;
    for set in sets {
        if params.visible_only && !set.visible_check && !set.visible {
            dropped = true;
            continue;
        }
        if lod_bounded && !set.lod_check && !lod.matches(set.min_lod, set.max_lod) {
            dropped = true;
            continue;
        }
        if (params.visible_only && set.visible_check) || (lod_bounded && set.lod_check) {
            checked.push(SetScope::Checked(set));
        } else {
            plain.push(set.id);
        }
    }

    let mut scopes = Vec::with_capacity(checked.len() + 1);
    if params.feature_sets.is_none() && !dropped && checked.is_empty() {
        scopes.push(SetScope::All);
    } else if !plain.is_empty() {
        scopes.push(SetScope::Sets(plain));
    }
    scopes.extend(checked);
    Ok(scopes)
}

fn paginated_count(total: usize, offset: usize, limit: usize) -> usize {
    let remaining = total.saturating_sub(offset);
    if limit == 0 {
        remaining
    } else {
        remaining.min(limit)
    }
}

// ============================================================================
// Feature writes
// ============================================================================

const INSERT_FEATURE: &str = "INSERT INTO features (fid, fsid, name, geometry, geometry_type, \
     xmin, xmax, ymin, ymax, style_id, attribs_id, altitude_mode, extrude, timestamp) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)";

/// Derived geometry columns of a feature row
struct GeometryColumns {
    wkb: Option<Vec<u8>>,
    kind: Option<i64>,
    envelope: Option<BBox>,
}

impl GeometryColumns {
    fn of(geometry: Option<&Geometry<f64>>) -> FeatureDbResult<Self> {
        Ok(match geometry {
            Some(g) => Self {
                wkb: Some(wkb::encode(g)?),
                kind: Some(GeometryType::from_geometry(g) as i64),
                envelope: BBox::from_geometry(g),
            },
            None => Self {
                wkb: None,
                kind: None,
                envelope: None,
            },
        })
    }

    /// `(xmin, xmax, ymin, ymax)`, all NULL for empty geometry
    fn bounds(&self) -> [Option<f64>; 4] {
        match &self.envelope {
            Some(b) => [Some(b.min_lng), Some(b.max_lng), Some(b.min_lat), Some(b.max_lat)],
            None => [None; 4],
        }
    }
}

fn feature_exists(conn: &Connection, fid: FeatureId) -> FeatureDbResult<bool> {
    conn.query_row("SELECT 1 FROM features WHERE fid = ?1", [fid], |_| Ok(()))
        .optional()
        .storage("look up feature")
        .map(|found| found.is_some())
}

fn check_insert(
    conn: &Connection,
    feature_set_id: FeatureSetId,
    definitions: &[FeatureDefinition],
) -> FeatureDbResult<()> {
    if load_set(conn, feature_set_id)?.is_none() {
        return Err(FeatureDbError::invalid_argument(format!(
            "feature set {} does not exist",
            feature_set_id
        )));
    }
    let mut requested = BTreeSet::new();
    for definition in definitions {
        if definition.id == FEATURE_ID_NONE {
            continue;
        }
        if !requested.insert(definition.id) || feature_exists(conn, definition.id)? {
            return Err(FeatureDbError::invalid_argument(format!(
                "feature id {} already in use",
                definition.id
            )));
        }
    }
    Ok(())
}

fn insert_style(conn: &Connection, style: &Style) -> FeatureDbResult<i64> {
    let codec = style_codec(MSGPACK_CODEC_ID)?;
    let bytes = codec.encode(style)?;
    insert_style_bytes(conn, codec.codec_id(), &bytes)
}

fn insert_style_bytes(conn: &Connection, coding: &str, bytes: &[u8]) -> FeatureDbResult<i64> {
    conn.prepare_cached("INSERT INTO styles (coding, value) VALUES (?1, ?2)")
        .storage("prepare style insert")?
        .execute(params![coding, bytes])
        .storage("insert style")?;
    Ok(conn.last_insert_rowid())
}

/// Register unseen `(key, type)` pairs, then encode
fn encode_attributes(
    conn: &Connection,
    schema: &mut AttributeSchema,
    attrs: &AttributeSet,
) -> FeatureDbResult<Vec<u8>> {
    for (key, type_code) in schema.unregistered(attrs) {
        conn.prepare_cached("INSERT INTO attribs_schema (name, coding) VALUES (?1, ?2)")
            .storage("prepare schema insert")?
            .execute(params![key, type_code])
            .storage("register attribute key")?;
        let id = i32::try_from(conn.last_insert_rowid())
            .map_err(|_| FeatureDbError::storage("attribute schema id out of range"))?;
        debug!(target: "featuredb::codec", id, key = %key, type_code, "registered attribute key");
        schema.register(id, key, type_code);
    }
    Ok(attributes::encode(attrs, schema)?)
}

fn insert_attributes(conn: &Connection, schema: &mut AttributeSchema, attrs: &AttributeSet) -> FeatureDbResult<i64> {
    let bytes = encode_attributes(conn, schema, attrs)?;
    conn.prepare_cached("INSERT INTO attributes (value) VALUES (?1)")
        .storage("prepare attribute insert")?
        .execute([bytes])
        .storage("insert attributes")?;
    Ok(conn.last_insert_rowid())
}

/// Stored attributes of a row; an undecodable blob reads as empty
fn load_attributes(conn: &Connection, schema: &AttributeSchema, attribs_id: i64) -> FeatureDbResult<AttributeSet> {
    let blob: Option<Vec<u8>> = conn
        .query_row("SELECT value FROM attributes WHERE id = ?1", [attribs_id], |row| row.get(0))
        .optional()
        .storage("load attributes")?;
    Ok(match blob.map(|bytes| attributes::decode(&bytes, schema)) {
        Some(Ok(attrs)) => attrs,
        Some(Err(e)) => {
            error!(target: "featuredb::codec", attribs_id, error = %e, "stored attributes undecodable; merging into empty set");
            AttributeSet::new()
        }
        None => AttributeSet::new(),
    })
}

fn insert_rows(
    conn: &Connection,
    schema: &mut AttributeSchema,
    feature_set_id: FeatureSetId,
    definitions: &[FeatureDefinition],
) -> FeatureDbResult<Vec<Feature>> {
    check_insert(conn, feature_set_id, definitions)?;
    let codec = style_codec(MSGPACK_CODEC_ID)?;
    // identical styles within one batch share a row
    let mut styles: FxHashMap<Vec<u8>, i64> = FxHashMap::default();
    let mut features = Vec::with_capacity(definitions.len());
    for definition in definitions {
        let mut feature = definition.clone().into_feature(definition.id, feature_set_id);
        let style_id = match &feature.style {
            Some(style) => {
                let bytes = codec.encode(style)?;
                match styles.get(&bytes) {
                    Some(id) => Some(*id),
                    None => {
                        let id = insert_style_bytes(conn, codec.codec_id(), &bytes)?;
                        styles.insert(bytes, id);
                        Some(id)
                    }
                }
            }
            None => None,
        };
        let attribs_id = match &feature.attributes {
            Some(attrs) => Some(insert_attributes(conn, schema, attrs)?),
            None => None,
        };
        let geometry = GeometryColumns::of(feature.geometry.as_ref())?;
        let [xmin, xmax, ymin, ymax] = geometry.bounds();
        let fid = (definition.id != FEATURE_ID_NONE).then_some(definition.id);
        conn.prepare_cached(INSERT_FEATURE)
            .storage("prepare feature insert")?
            .execute(params![
                fid,
                feature_set_id,
                feature.name,
                geometry.wkb,
                geometry.kind,
                xmin,
                xmax,
                ymin,
                ymax,
                style_id,
                attribs_id,
                feature.altitude_mode.code(),
                feature.extrude,
                timestamp_to_raw(feature.timestamp),
            ])
            .storage("insert feature")?;
        feature.id = conn.last_insert_rowid();
        features.push(feature);
    }
    Ok(features)
}

fn update_row(
    conn: &Connection,
    schema: &mut AttributeSchema,
    fid: FeatureId,
    update: &FeatureUpdate,
) -> FeatureDbResult<bool> {
    let current: Option<(Option<i64>, Option<i64>)> = conn
        .query_row(
            "SELECT style_id, attribs_id FROM features WHERE fid = ?1",
            [fid],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .storage("load feature")?;
    let Some((old_style, attribs_id)) = current else {
        return Ok(false);
    };
    if update.is_empty() {
        return Ok(true);
    }

    let mut assignments: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();
    let mut assign = |column: &'static str, value: Value| {
        assignments.push(column);
        values.push(value);
    };

    if let Some(name) = &update.name {
        assign("name = ?", name.clone().map_or(Value::Null, Value::Text));
    }
    if let Some(geometry) = &update.geometry {
        let normalized = normalize_geometry(geometry.clone());
        let columns = GeometryColumns::of(Some(&normalized))?;
        let [xmin, xmax, ymin, ymax] = columns.bounds();
        assign("geometry = ?", columns.wkb.map_or(Value::Null, Value::Blob));
        assign("geometry_type = ?", columns.kind.map_or(Value::Null, Value::Integer));
        assign("xmin = ?", xmin.map_or(Value::Null, Value::Real));
        assign("xmax = ?", xmax.map_or(Value::Null, Value::Real));
        assign("ymin = ?", ymin.map_or(Value::Null, Value::Real));
        assign("ymax = ?", ymax.map_or(Value::Null, Value::Real));
    }
    let mut replaced_style = None;
    if let Some(style) = &update.style {
        let style_id = match style {
            Some(style) => Some(insert_style(conn, style)?),
            None => None,
        };
        assign("style_id = ?", style_id.map_or(Value::Null, Value::Integer));
        replaced_style = old_style;
    }
    if let Some((attrs, mode)) = &update.attributes {
        let merged = match (mode, attribs_id) {
            (AttributeUpdate::AddOrReplace, Some(id)) => {
                let mut existing = load_attributes(conn, schema, id)?;
                existing.merge(attrs);
                existing
            }
            _ => attrs.clone(),
        };
        match attribs_id {
            Some(id) => {
                let bytes = encode_attributes(conn, schema, &merged)?;
                conn.execute("UPDATE attributes SET value = ?1 WHERE id = ?2", params![bytes, id])
                    .storage("update attributes")?;
            }
            None => {
                let id = insert_attributes(conn, schema, &merged)?;
                assign("attribs_id = ?", Value::Integer(id));
            }
        }
    }
    if let Some(mode) = update.altitude_mode {
        assign("altitude_mode = ?", Value::Integer(mode.code()));
    }
    if let Some(extrude) = update.extrude {
        assign("extrude = ?", Value::Real(extrude));
    }

    let mut sets = assignments.join(", ");
    if !sets.is_empty() {
        sets.push_str(", ");
    }
    values.push(Value::Integer(fid));
    conn.execute(
        &format!("UPDATE features SET {}version = version + 1 WHERE fid = ?", sets),
        params_from_iter(values.iter()),
    )
    .storage("update feature")?;

    if let Some(old) = replaced_style {
        conn.execute(
            "DELETE FROM styles WHERE id = ?1 AND NOT EXISTS (SELECT 1 FROM features WHERE style_id = ?1)",
            [old],
        )
        .storage("drop unused style")?;
    }
    Ok(true)
}

/// Delete one feature; returns its set when it existed
fn delete_row(conn: &Connection, fid: FeatureId) -> FeatureDbResult<Option<FeatureSetId>> {
    let fsid: Option<FeatureSetId> = conn
        .query_row("SELECT fsid FROM features WHERE fid = ?1", [fid], |row| row.get(0))
        .optional()
        .storage("load feature")?;
    let Some(fsid) = fsid else {
        return Ok(None);
    };
    conn.execute("DELETE FROM features WHERE fid = ?1", [fid])
        .storage("delete feature")?;
    settle_visibility(conn, fsid)?;
    Ok(Some(fsid))
}

// ============================================================================
// Visibility writes
// ============================================================================

/// Set and effective visibility of a feature
fn effective_visibility(conn: &Connection, fid: FeatureId) -> FeatureDbResult<Option<(FeatureSetId, bool)>> {
    conn.query_row(
        "SELECT features.fsid, CASE WHEN features.visible_version = featuresets.visible_version \
         THEN features.visible ELSE featuresets.visible END \
         FROM features JOIN featuresets ON featuresets.id = features.fsid WHERE features.fid = ?1",
        [fid],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .storage("load feature visibility")
}

/// Write a feature override; `Some((set, changed))` for known features
///
/// The caller settles the set afterwards.
fn toggle_feature(conn: &Connection, fid: FeatureId, visible: bool) -> FeatureDbResult<Option<(FeatureSetId, bool)>> {
    let Some((fsid, current)) = effective_visibility(conn, fid)? else {
        return Ok(None);
    };
    if current == visible {
        return Ok(Some((fsid, false)));
    }
    conn.execute("UPDATE features SET visible = ?1 WHERE fid = ?2", params![visible, fid])
        .storage("set feature visible")?;
    Ok(Some((fsid, true)))
}

/// Clear a stale check flag, or flip the baseline once every member deviates
///
/// Returns `true` when the baseline flipped.
fn settle_visibility(conn: &Connection, fsid: FeatureSetId) -> FeatureDbResult<bool> {
    let state: Option<(bool, bool)> = conn
        .query_row(
            "SELECT visible, visible_check FROM featuresets WHERE id = ?1",
            [fsid],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .storage("load set visibility")?;
    let Some((visible, true)) = state else {
        return Ok(false);
    };
    let (members, deviations): (i64, i64) = conn
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(features.visible_version = featuresets.visible_version \
             AND features.visible != featuresets.visible), 0) \
             FROM features JOIN featuresets ON featuresets.id = features.fsid WHERE features.fsid = ?1",
            [fsid],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .storage("count visibility deviations")?;

    if deviations == 0 {
        conn.execute("UPDATE featuresets SET visible_check = 0 WHERE id = ?1", [fsid])
            .storage("clear visibility check")?;
        Ok(false)
    } else if deviations >= members {
        // the trigger bumps visible_version and clears the check flag
        conn.execute("UPDATE featuresets SET visible = ?1 WHERE id = ?2", params![!visible, fsid])
            .storage("flip set visibility")?;
        debug!(target: "featuredb::sqlite", set = fsid, visible = !visible, "visibility collapsed");
        Ok(true)
    } else {
        Ok(false)
    }
}

// ============================================================================
// FeatureDataStore
// ============================================================================

impl FeatureDataStore for SqliteFeatureDataStore {
    fn query_features(&self, params: &FeatureQueryParameters) -> FeatureDbResult<Cursor<Feature>> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        let ignored = params.ignored_fields;
        let projection = Projection::Features {
            geometry: !ignored.contains(IgnoredFields::GEOMETRY),
            style: !ignored.contains(IgnoredFields::STYLE),
            attributes: !ignored.contains(IgnoredFields::ATTRIBUTES),
        };
        let rows = self.select_rows(&conn, params, projection)?;
        let schema = self.schema.read();
        let features: Vec<Feature> = rows
            .into_iter()
            .map(|row| row.decode(&schema, ignored))
            .collect();
        Ok(Cursor::from_vec(features))
    }

    fn query_features_count(&self, params: &FeatureQueryParameters) -> FeatureDbResult<usize> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        self.count_rows(&conn, params)
    }

    fn query_feature_sets(
        &self,
        params: &FeatureSetQueryParameters,
    ) -> FeatureDbResult<Cursor<FeatureSet>> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        let sets = query_sets(&conn, &sql::select_feature_sets(params))?;
        Ok(Cursor::from_vec(sets))
    }

    fn query_feature_sets_count(&self, params: &FeatureSetQueryParameters) -> FeatureDbResult<usize> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        query_count(&conn, &sql::count_feature_sets(params))
    }

    fn get_feature(&self, id: FeatureId) -> FeatureDbResult<Option<Feature>> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        let params = FeatureQueryParameters::new().with_ids([id]);
        let plan = QueryPlan {
            driver: Some(Dimension::FeatureIds),
            residual: Vec::new(),
            estimates: Vec::new(),
        };
        let stmt = sql::select_features(
            &params,
            &plan,
            &SetScope::All,
            Projection::Features {
                geometry: true,
                style: true,
                attributes: true,
            },
            Window::All,
        );
        let rows = run_rows(&conn, &stmt, 0)?;
        let schema = self.schema.read();
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.decode(&schema, IgnoredFields::NONE)))
    }

    fn get_feature_set(&self, id: FeatureSetId) -> FeatureDbResult<Option<FeatureSet>> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        load_set(&conn, id)
    }

    fn is_feature_visible(&self, id: FeatureId) -> FeatureDbResult<bool> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        Ok(effective_visibility(&conn, id)?.map_or(false, |(_, visible)| visible))
    }

    fn is_feature_set_visible(&self, id: FeatureSetId) -> FeatureDbResult<bool> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        let visible: Option<bool> = conn
            .query_row(
                &format!("SELECT {} FROM featuresets WHERE featuresets.id = ?1", sql::SET_ANY_VISIBLE),
                [id],
                |row| row.get(0),
            )
            .optional()
            .storage("load set visibility")?;
        Ok(visible.unwrap_or(false))
    }

    fn set_feature_visible(&self, id: FeatureId, visible: bool) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify_visibility(VisibilityFlags::FEATURE, "set feature visible")?;
        let toggled = self.transact("set feature visible", |conn, _| {
            let toggled = toggle_feature(conn, id, visible)?;
            if let Some((fsid, true)) = toggled {
                settle_visibility(conn, fsid)?;
            }
            Ok(toggled)
        })?;
        match toggled {
            Some((_, changed)) => {
                if changed {
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
        let changed = self.transact("set features visible", |conn, _| {
            let ids = self.select_ids(conn, params)?;
            let mut touched = BTreeSet::new();
            for id in ids {
                if let Some((fsid, true)) = toggle_feature(conn, id, visible)? {
                    touched.insert(fsid);
                }
            }
            // toggles all go the same direction, so settling once per set
            // ends in the same state as settling after each one
            for fsid in &touched {
                settle_visibility(conn, *fsid)?;
            }
            Ok(!touched.is_empty())
        })?;
        if changed {
            guard.mark_changed();
        }
        debug!(target: "featuredb::sqlite", changed, visible, "set features visible");
        Ok(())
    }

    fn set_feature_set_visible(&self, id: FeatureSetId, visible: bool) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify_visibility(VisibilityFlags::FEATURESET, "set feature set visible")?;
        let updated = self.transact("set feature set visible", |conn, _| {
            conn.execute("UPDATE featuresets SET visible = ?1 WHERE id = ?2", params![visible, id])
                .storage("set feature set visible")
        })?;
        if updated > 0 {
            guard.mark_changed();
        }
        Ok(updated > 0)
    }

    fn set_feature_sets_visible(
        &self,
        params: &FeatureSetQueryParameters,
        visible: bool,
    ) -> FeatureDbResult<()> {
        let guard = self
            .base
            .modify_visibility(VisibilityFlags::FEATURESET, "set feature sets visible")?;
        let updated = self.transact("set feature sets visible", |conn, _| {
            let sets = query_sets(conn, &sql::select_feature_sets(params))?;
            for set in &sets {
                conn.execute("UPDATE featuresets SET visible = ?1 WHERE id = ?2", params![visible, set.id])
                    .storage("set feature set visible")?;
            }
            Ok(sets.len())
        })?;
        if updated > 0 {
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
        self.begin_bulk()?;
        Ok(BulkModification::new(guard, move |success| self.end_bulk(success)))
    }

    fn insert_feature_set(&self, definition: &FeatureSetDefinition) -> FeatureDbResult<FeatureSet> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_INSERT, "insert feature set")?;
        let set = self.transact("insert feature set", |conn, _| {
            let (min_lod, max_lod) = definition.lod_range();
            conn.execute(
                "INSERT INTO featuresets (name, min_lod, max_lod, type, provider) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    definition.name,
                    min_lod,
                    max_lod,
                    definition.feature_type,
                    definition.provider
                ],
            )
            .storage("insert feature set")?;
            let id = conn.last_insert_rowid();
            load_set(conn, id)?
                .ok_or_else(|| FeatureDbError::storage(format!("feature set {} vanished after insert", id)))
        })?;
        guard.mark_changed();
        debug!(target: "featuredb::sqlite", id = set.id, name = %set.name, "inserted feature set");
        Ok(set)
    }

    fn update_feature_set_name(&self, id: FeatureSetId, name: &str) -> FeatureDbResult<bool> {
        let guard = self.base.modify(
            ModificationFlags::FEATURESET_UPDATE | ModificationFlags::FEATURESET_NAME,
            "update feature set name",
        )?;
        let updated = self.transact("update feature set name", |conn, _| {
            conn.execute("UPDATE featuresets SET name = ?1 WHERE id = ?2", params![name, id])
                .storage("rename feature set")
        })?;
        if updated > 0 {
            guard.mark_changed();
        }
        Ok(updated > 0)
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
        let (min_lod, max_lod) = (level_of_detail(min_resolution), level_of_detail(max_resolution));
        let updated = self.transact("update feature set resolution", |conn, _| {
            conn.execute(
                "UPDATE featuresets SET min_lod = ?1, max_lod = ?2 WHERE id = ?3",
                params![min_lod, max_lod, id],
            )
            .storage("update feature set thresholds")
        })?;
        if updated > 0 {
            guard.mark_changed();
        }
        Ok(updated > 0)
    }

    fn delete_feature_set(&self, id: FeatureSetId) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_DELETE, "delete feature set")?;
        let deleted = self.transact("delete feature set", |conn, _| {
            conn.execute("DELETE FROM featuresets WHERE id = ?1", [id])
                .storage("delete feature set")
        })?;
        self.invalidate();
        if deleted > 0 {
            guard.mark_changed();
        }
        Ok(deleted > 0)
    }

    fn delete_feature_sets(&self, params: &FeatureSetQueryParameters) -> FeatureDbResult<usize> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_DELETE, "delete feature sets")?;
        let deleted = self.transact("delete feature sets", |conn, _| {
            let sets = query_sets(conn, &sql::select_feature_sets(params))?;
            let mut deleted = 0;
            for set in &sets {
                deleted += conn
                    .execute("DELETE FROM featuresets WHERE id = ?1", [set.id])
                    .storage("delete feature set")?;
            }
            Ok(deleted)
        })?;
        self.invalidate();
        if deleted > 0 {
            guard.mark_changed();
        }
        debug!(target: "featuredb::sqlite", deleted, "deleted feature sets");
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
        let mut features = self.transact("insert feature", |conn, schema| {
            insert_rows(conn, schema, feature_set_id, std::slice::from_ref(definition))
        })?;
        self.invalidate();
        guard.mark_changed();
        features
            .pop()
            .ok_or_else(|| FeatureDbError::storage("insert produced no feature"))
    }

    fn insert_features(
        &self,
        feature_set_id: FeatureSetId,
        definitions: &[FeatureDefinition],
    ) -> FeatureDbResult<Vec<Feature>> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_FEATURE_INSERT, "insert features")?;
        let features = self.transact("insert features", |conn, schema| {
            insert_rows(conn, schema, feature_set_id, definitions)
        })?;
        self.invalidate();
        if !features.is_empty() {
            guard.mark_changed();
        }
        debug!(target: "featuredb::sqlite", set = feature_set_id, count = features.len(), "inserted features");
        Ok(features)
    }

    fn update_feature(&self, id: FeatureId, update: &FeatureUpdate) -> FeatureDbResult<bool> {
        let guard = self.base.modify(update.required_flags(), "update feature")?;
        let updated = self.transact("update feature", |conn, schema| update_row(conn, schema, id, update))?;
        if updated && !update.is_empty() {
            guard.mark_changed();
        }
        Ok(updated)
    }

    fn delete_feature(&self, id: FeatureId) -> FeatureDbResult<bool> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_FEATURE_DELETE, "delete feature")?;
        let deleted = self.transact("delete feature", |conn, _| delete_row(conn, id))?;
        self.invalidate();
        if deleted.is_some() {
            guard.mark_changed();
        }
        Ok(deleted.is_some())
    }

    fn delete_features(&self, params: &FeatureQueryParameters) -> FeatureDbResult<usize> {
        let guard = self
            .base
            .modify(ModificationFlags::FEATURESET_FEATURE_DELETE, "delete features")?;
        let deleted = self.transact("delete features", |conn, _| {
            let ids = self.select_ids(conn, params)?;
            let mut deleted = 0;
            for id in ids {
                if delete_row(conn, id)?.is_some() {
                    deleted += 1;
                }
            }
            Ok(deleted)
        })?;
        self.invalidate();
        if deleted > 0 {
            guard.mark_changed();
        }
        debug!(target: "featuredb::sqlite", deleted, "deleted features");
        Ok(deleted)
    }

    fn refresh(&self) -> FeatureDbResult<()> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        let mut schema = self.schema.write();
        *schema = load_attribute_schema(&conn)?;
        self.invalidate();
        debug!(target: "featuredb::sqlite", uri = %self.base.uri(), attribute_keys = schema.len(), "refresh");
        Ok(())
    }

    fn dispose(&self) {
        if !self.base.dispose() {
            return;
        }
        if let Some(conn) = self.conn.lock().take() {
            if let Err((_, e)) = conn.close() {
                warn!(target: "featuredb::sqlite", error = %e, "closing connection failed");
            }
        }
        *self.bulk.lock() = BulkState::default();
        self.schema.write().clear();
        self.invalidate();
    }

    fn uri(&self) -> String {
        self.base.uri().to_string()
    }

    fn minimum_timestamp(&self) -> FeatureDbResult<Option<i64>> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        Ok(self.timestamps(&conn)?.0)
    }

    fn maximum_timestamp(&self) -> FeatureDbResult<Option<i64>> {
        let _guard = self.base.lock()?;
        let conn = self.connection()?;
        Ok(self.timestamps(&conn)?.1)
    }

    fn add_content_listener(&self, listener: Arc<dyn ContentListener>) {
        self.base.modify_lock().add_listener(listener);
    }

    fn remove_content_listener(&self, listener: &Arc<dyn ContentListener>) {
        self.base.modify_lock().remove_listener(listener);
    }
}
