//! SQL text builders
//!
//! Feature queries run as one sub-query per [`SetScope`]:
//!
//! - [`SetScope::All`]: no set restriction at all
//! - [`SetScope::Sets`]: sets whose check flags are clear, so the set's own
//!   visibility and thresholds hold for every member and the query only
//!   needs `fsid IN (...)`
//! - [`SetScope::Checked`]: one set whose members may override visibility or
//!   thresholds; each override only counts while the feature's stamp equals
//!   the set's counter, so the fragment compares stamps
//!
//! The planner's driver dimension is written as a plain, index-eligible
//! predicate. Every residual predicate on an indexed column is written with
//! SQLite's unary `+`, which keeps the column's collation but stops the
//! optimizer from using its index.

use featuredb_core::pattern;
use featuredb_core::{
    BBox, FeatureQueryParameters, FeatureSet, FeatureSetId, FeatureSetQueryParameters,
    LodRange, Order, SpatialFilter,
};
use featuredb_engine::{Dimension, QueryPlan};
use rusqlite::types::Value;

// ============================================================================
// WHERE clause
// ============================================================================

/// AND-joined terms with their positional parameters
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    terms: Vec<String>,
    params: Vec<Value>,
}

impl WhereClause {
    /// Empty clause (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one term; `params` bind its `?` placeholders in order
    pub fn push(&mut self, term: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.terms.push(term.into());
        self.params.extend(params);
    }

    /// Check if no term was added
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// `" WHERE a AND b"`, or nothing when empty
    pub fn sql(&self) -> String {
        if self.terms.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.terms.join(" AND "))
        }
    }

    /// Parameters in placeholder order
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// A complete statement and its parameters
#[derive(Debug, Clone)]
pub struct Statement {
    /// SQL text with `?` placeholders
    pub sql: String,
    /// Values for the placeholders, in order
    pub params: Vec<Value>,
}

/// `?, ?, ?` with `n` placeholders
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn int_values<'a>(ids: impl IntoIterator<Item = &'a i64>) -> Vec<Value> {
    ids.into_iter().map(|id| Value::Integer(*id)).collect()
}

/// `column IN (...)`, or a false term for an empty list
fn in_list(column: &str, values: Vec<Value>) -> (String, Vec<Value>) {
    if values.is_empty() {
        ("0".to_string(), values)
    } else {
        (format!("{} IN ({})", column, placeholders(values.len())), values)
    }
}

/// OR of case-insensitive pattern matches on `column`
///
/// With `exact_equality`, patterns without a wildcard compare with `=`,
/// which relies on the column's `NOCASE` collation and stays index-eligible.
fn pattern_term(column: &str, patterns: &[String], exact_equality: bool) -> (String, Vec<Value>) {
    if patterns.is_empty() {
        return ("0".to_string(), Vec::new());
    }
    let mut terms = Vec::with_capacity(patterns.len());
    let mut params = Vec::with_capacity(patterns.len());
    for p in patterns {
        if exact_equality && !pattern::is_wildcard(p) {
            terms.push(format!("{} = ?", column));
            params.push(Value::Text(p.clone()));
        } else {
            terms.push(format!("{} LIKE ? ESCAPE '\\'", column));
            params.push(Value::Text(pattern::to_sql_like(p)));
        }
    }
    (format!("({})", terms.join(" OR ")), params)
}

/// Envelope-intersection term over the three wrapped copies of `bbox`
fn envelope_term(prefix: &str, bbox: &BBox) -> (String, Vec<Value>) {
    let mut terms = Vec::with_capacity(3);
    let mut params = Vec::with_capacity(12);
    for b in bbox.wrapped() {
        terms.push(format!(
            "({p}xmin <= ? AND {p}xmax >= ? AND {p}ymin <= ? AND {p}ymax >= ?)",
            p = prefix
        ));
        params.extend([
            Value::Real(b.max_lng),
            Value::Real(b.min_lng),
            Value::Real(b.max_lat),
            Value::Real(b.min_lat),
        ]);
    }
    (format!("({})", terms.join(" OR ")), params)
}

// ============================================================================
// Feature sets
// ============================================================================

/// Columns read by [`crate::row::feature_set_from_row`]
pub const FEATURE_SET_COLUMNS: &str = "featuresets.id, featuresets.name, featuresets.type, \
     featuresets.provider, featuresets.min_lod, featuresets.max_lod, featuresets.visible, \
     featuresets.visible_check, featuresets.lod_check, featuresets.name_version, \
     featuresets.visible_version, featuresets.lod_version";

/// True when the set is visible or has at least one visible member
pub const SET_ANY_VISIBLE: &str = "(featuresets.visible = 1 OR (featuresets.visible_check = 1 \
     AND EXISTS (SELECT 1 FROM features AS member WHERE member.fsid = featuresets.id \
     AND member.visible_version = featuresets.visible_version AND member.visible = 1)))";

/// WHERE clause of a feature-set query, pagination excluded
pub fn feature_set_filter(params: &FeatureSetQueryParameters) -> WhereClause {
    let mut clause = WhereClause::new();
    if let Some(ids) = &params.ids {
        let (term, values) = in_list("featuresets.id", int_values(ids));
        clause.push(term, values);
    }
    if let Some(names) = &params.names {
        let (term, values) = pattern_term("featuresets.name", names, false);
        clause.push(term, values);
    }
    if let Some(types) = &params.types {
        let (term, values) = pattern_term("featuresets.type", types, false);
        clause.push(term, values);
    }
    if let Some(providers) = &params.providers {
        let (term, values) = pattern_term("featuresets.provider", providers, false);
        clause.push(term, values);
    }
    let lod = params.lod_range();
    if let Some(min) = lod.min {
        clause.push("featuresets.max_lod >= ?", [Value::Integer(min.into())]);
    }
    if let Some(max) = lod.max {
        clause.push("featuresets.min_lod <= ?", [Value::Integer(max.into())]);
    }
    if params.visible_only {
        clause.push(SET_ANY_VISIBLE, []);
    }
    clause
}

/// Paginated feature-set rows in id order
pub fn select_feature_sets(params: &FeatureSetQueryParameters) -> Statement {
    let clause = feature_set_filter(params);
    let mut sql = format!(
        "SELECT {} FROM featuresets{} ORDER BY featuresets.id",
        FEATURE_SET_COLUMNS,
        clause.sql()
    );
    let mut values = clause.params().to_vec();
    push_window(&mut sql, &mut values, Window::page(params.offset, params.limit));
    Statement { sql, params: values }
}

/// Paginated count of feature sets
pub fn count_feature_sets(params: &FeatureSetQueryParameters) -> Statement {
    let clause = feature_set_filter(params);
    let mut inner = format!("SELECT featuresets.id FROM featuresets{}", clause.sql());
    let mut values = clause.params().to_vec();
    push_window(&mut inner, &mut values, Window::page(params.offset, params.limit));
    Statement {
        sql: format!("SELECT COUNT(*) FROM ({})", inner),
        params: values,
    }
}

// ============================================================================
// Feature scopes
// ============================================================================

/// Set restriction of one feature sub-query
#[derive(Debug, Clone, PartialEq)]
pub enum SetScope {
    /// Every feature
    All,
    /// Members of sets whose flags hold for every member
    Sets(Vec<FeatureSetId>),
    /// Members of one set with possible per-feature overrides
    Checked(FeatureSet),
}

/// Version-guarded visibility fragment of a checked set
fn visible_fragment(p: &str, set: &FeatureSet) -> (String, Vec<Value>) {
    let version = Value::Integer(set.visible_version);
    if set.visible {
        (
            format!("({p}visible_version != ? OR {p}visible = 1)", p = p),
            vec![version],
        )
    } else {
        (
            format!("({p}visible_version = ? AND {p}visible = 1)", p = p),
            vec![version],
        )
    }
}

/// Version-guarded threshold fragments of a checked set
fn lod_fragments(p: &str, set: &FeatureSet, lod: &LodRange) -> Vec<(String, Vec<Value>)> {
    let version = Value::Integer(set.lod_version);
    let mut terms = Vec::new();
    if let Some(min) = lod.min {
        let bound = Value::Integer(min.into());
        let term = if set.max_lod >= min {
            format!("({p}lod_version != ? OR {p}max_lod >= ?)", p = p)
        } else {
            format!("({p}lod_version = ? AND {p}max_lod >= ?)", p = p)
        };
        terms.push((term, vec![version.clone(), bound]));
    }
    if let Some(max) = lod.max {
        let bound = Value::Integer(max.into());
        let term = if set.min_lod <= max {
            format!("({p}lod_version != ? OR {p}min_lod <= ?)", p = p)
        } else {
            format!("({p}lod_version = ? AND {p}min_lod <= ?)", p = p)
        };
        terms.push((term, vec![version, bound]));
    }
    terms
}

// ============================================================================
// Feature queries
// ============================================================================

/// Which columns a feature sub-query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Everything needed to materialize a [`featuredb_core::Feature`]
    Features {
        /// Read the geometry blob
        geometry: bool,
        /// Read the style row
        style: bool,
        /// Read the attribute blob
        attributes: bool,
    },
    /// Sort keys only
    Keys,
    /// Feature ids, plus distance columns when ordered by distance
    Ids,
}

/// Row window applied to a sub-query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    /// Every row
    All,
    /// Skip `offset`, then at most `limit` (0 = unlimited)
    Page {
        /// Rows to skip
        offset: usize,
        /// Maximum rows
        limit: usize,
    },
}

impl Window {
    /// Page window, collapsing the no-op case
    pub fn page(offset: usize, limit: usize) -> Self {
        if offset == 0 && limit == 0 {
            Window::All
        } else {
            Window::Page { offset, limit }
        }
    }
}

fn push_window(sql: &mut String, params: &mut Vec<Value>, window: Window) {
    if let Window::Page { offset, limit } = window {
        sql.push_str(" LIMIT ? OFFSET ?");
        let limit = if limit == 0 { -1 } else { limit as i64 };
        params.push(Value::Integer(limit));
        params.push(Value::Integer(offset as i64));
    }
}

/// Effective maximum level of detail of a feature row
const EFFECTIVE_MAX_LOD: &str = "CASE WHEN features.lod_version = featuresets.lod_version \
     THEN features.max_lod ELSE featuresets.max_lod END";

/// Number of distance columns a query with `orders` returns
pub fn distance_count(orders: &[Order]) -> usize {
    orders.iter().filter(|o| matches!(o, Order::Distance(_))).count()
}

/// Build one feature sub-query
pub fn select_features(
    params: &FeatureQueryParameters,
    plan: &QueryPlan,
    scope: &SetScope,
    projection: Projection,
    window: Window,
) -> Statement {
    let mut values: Vec<Value> = Vec::new();
    let mut columns: Vec<String> = Vec::new();
    let mut joins = String::new();

    let fields = match projection {
        Projection::Ids => None,
        Projection::Keys => Some((false, false, false)),
        Projection::Features {
            geometry,
            style,
            attributes,
        } => Some((geometry, style, attributes)),
    };
    match fields {
        None => columns.push("features.fid".to_string()),
        Some((geometry, style, attributes)) => {
            columns.extend(
                [
                    "features.fid",
                    "features.fsid",
                    "features.name",
                    if geometry { "features.geometry" } else { "NULL" },
                    if style { "styles.coding" } else { "NULL" },
                    if style { "styles.value" } else { "NULL" },
                    if attributes { "attributes.value" } else { "NULL" },
                    "features.altitude_mode",
                    "features.extrude",
                    "features.timestamp",
                    "features.version",
                ]
                .map(str::to_string),
            );
            columns.push(format!("{} AS effective_max_lod", EFFECTIVE_MAX_LOD));
            if style {
                joins.push_str(" LEFT JOIN styles ON styles.id = features.style_id");
            }
            if attributes {
                joins.push_str(" LEFT JOIN attributes ON attributes.id = features.attribs_id");
            }
        }
    }

    // ORDER BY refers to these by alias, so every projection carries them
    for (i, (lng, lat)) in params.order.iter().filter_map(distance_center).enumerate() {
        columns.push(format!("fdb_distance(features.geometry, ?, ?) AS distance_{}", i));
        values.extend([Value::Real(lng), Value::Real(lat)]);
    }

    let clause = feature_filter(params, plan, scope);
    values.extend_from_slice(clause.params());

    let mut sql = format!(
        "SELECT {} FROM features JOIN featuresets ON featuresets.id = features.fsid{}{}",
        columns.join(", "),
        joins,
        clause.sql()
    );
    sql.push_str(&order_by(&params.order));
    push_window(&mut sql, &mut values, window);
    Statement { sql, params: values }
}

/// Count rows of one feature sub-query under `window`
pub fn count_features(
    params: &FeatureQueryParameters,
    plan: &QueryPlan,
    scope: &SetScope,
    window: Window,
) -> Statement {
    let clause = feature_filter(params, plan, scope);
    let mut inner = format!(
        "SELECT features.fid FROM features JOIN featuresets ON featuresets.id = features.fsid{}",
        clause.sql()
    );
    let mut values = clause.params().to_vec();
    push_window(&mut inner, &mut values, window);
    Statement {
        sql: format!("SELECT COUNT(*) FROM ({})", inner),
        params: values,
    }
}

fn distance_center(order: &Order) -> Option<(f64, f64)> {
    match order {
        Order::Distance(point) => Some((point.x(), point.y())),
        _ => None,
    }
}

fn order_by(orders: &[Order]) -> String {
    let mut keys = Vec::with_capacity(orders.len() + 1);
    let mut distance = 0;
    for order in orders {
        match order {
            Order::FeatureId => keys.push("features.fid ASC".to_string()),
            Order::FeatureName => keys.push("features.name ASC".to_string()),
            Order::Distance(_) => {
                keys.push(format!("distance_{} ASC", distance));
                distance += 1;
            }
            Order::Resolution => keys.push(format!("{} DESC", EFFECTIVE_MAX_LOD)),
        }
    }
    keys.push("features.fid ASC".to_string());
    format!(" ORDER BY {}", keys.join(", "))
}

/// Every filter of `params` restricted to `scope`
fn feature_filter(params: &FeatureQueryParameters, plan: &QueryPlan, scope: &SetScope) -> WhereClause {
    // unary plus for residual predicates on indexed columns
    let col = |dimension: Dimension| {
        if plan.driver == Some(dimension) {
            "features."
        } else {
            "+features."
        }
    };
    let mut clause = WhereClause::new();

    if let Some(ids) = &params.ids {
        let column = format!("{}fid", col(Dimension::FeatureIds));
        let (term, values) = in_list(&column, int_values(ids));
        clause.push(term, values);
    }

    let p = col(Dimension::FeatureSets);
    match scope {
        SetScope::All => {}
        SetScope::Sets(ids) => {
            let (term, values) = in_list(&format!("{}fsid", p), int_values(ids));
            clause.push(term, values);
        }
        SetScope::Checked(set) => {
            clause.push(format!("{}fsid = ?", p), [Value::Integer(set.id)]);
            if params.visible_only && set.visible_check {
                let (term, values) = visible_fragment("features.", set);
                clause.push(term, values);
            }
            let lod = params.lod_range();
            if set.lod_check {
                for (term, values) in lod_fragments("features.", set, &lod) {
                    clause.push(term, values);
                }
            }
        }
    }

    if let Some(filter) = &params.spatial_filter {
        if plan.driver == Some(Dimension::Spatial) {
            let mut boxes = Vec::with_capacity(3);
            let mut values = Vec::with_capacity(12);
            for b in filter.index_boxes() {
                boxes.push("(xmin <= ? AND xmax >= ? AND ymin <= ? AND ymax >= ?)");
                values.extend([
                    Value::Real(b.max_lng),
                    Value::Real(b.min_lng),
                    Value::Real(b.max_lat),
                    Value::Real(b.min_lat),
                ]);
            }
            clause.push(
                format!(
                    "features.fid IN (SELECT pkid FROM idx_features_geometry WHERE {})",
                    boxes.join(" OR ")
                ),
                values,
            );
        }
        // the R*Tree stores single precision, so the exact test always runs
        let (term, values) = envelope_term("features.", &filter.envelope());
        clause.push(term, values);
        if let SpatialFilter::Radius { center, meters } = filter {
            clause.push(
                "fdb_distance(features.geometry, ?, ?) <= ?",
                [Value::Real(center.x()), Value::Real(center.y()), Value::Real(*meters)],
            );
        }
    }

    if let Some(types) = &params.geometry_types {
        let column = format!("{}geometry_type", col(Dimension::GeometryTypes));
        let values = types.iter().map(|t| Value::Integer(*t as i64)).collect();
        let (term, values) = in_list(&column, values);
        clause.push(term, values);
    }

    if let Some(names) = &params.names {
        let column = format!("{}name", col(Dimension::Names));
        let (term, values) = pattern_term(&column, names, true);
        clause.push(term, values);
    }

    clause
}
