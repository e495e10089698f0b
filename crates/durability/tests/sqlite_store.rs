//! Behavioural tests for the SQLite feature data store

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use featuredb_core::{
    resolution_of, AttributeSet, AttributeValue, ContentListener, FeatureDataStore,
    FeatureDefinition, FeatureQueryParameters, FeatureSetDefinition, FeatureSetQueryParameters,
    FeatureUpdate, GeometryType, ModificationFlags, Order, SpatialFilter, Style, VisibilityFlags,
};
use featuredb_durability::SqliteFeatureDataStore;
use featuredb_engine::FeatureDbConfig;
use geo_types::{line_string, point, polygon};
use rusqlite::Connection;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

fn open() -> (TempDir, SqliteFeatureDataStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteFeatureDataStore::open(dir.path().join("features.sqlite")).unwrap();
    (dir, store)
}

fn ids(store: &SqliteFeatureDataStore, params: &FeatureQueryParameters) -> Vec<i64> {
    store.query_features(params).unwrap().map(|f| f.id).collect()
}

fn names(store: &SqliteFeatureDataStore, params: &FeatureQueryParameters) -> Vec<String> {
    store
        .query_features(params)
        .unwrap()
        .filter_map(|f| f.name)
        .collect()
}

#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

impl ContentListener for CountingListener {
    fn on_content_changed(&self, _uri: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_insert_then_update_attributes() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("poi", "survey"))
        .unwrap();
    let mut attrs = AttributeSet::new();
    attrs.set_int("floors", 3);
    attrs.set_string("kind", Some("library".to_string()));
    let feature = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("Library", point!(x: 4.0, y: 52.0)).with_attributes(attrs),
        )
        .unwrap();
    assert_eq!(feature.version, 1);

    let mut replacement = AttributeSet::new();
    replacement.set_int("floors", 4);
    assert!(store
        .update_feature(feature.id, &FeatureUpdate::new().attributes(replacement))
        .unwrap());

    let stored = store.get_feature(feature.id).unwrap().unwrap();
    assert_eq!(stored.version, 2);
    let attrs = stored.attributes.unwrap();
    assert_eq!(attrs.get_int("floors"), Some(4));
    assert!(!attrs.contains_key("kind"));
}

#[test]
fn test_scenario_feature_and_set_visibility() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("trees", "city"))
        .unwrap();
    let features = store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("oak", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("elm", point!(x: 1.0, y: 0.0)),
                FeatureDefinition::new("ash", point!(x: 2.0, y: 0.0)),
            ],
        )
        .unwrap();
    let (first, second, third) = (features[0].id, features[1].id, features[2].id);
    let visible = FeatureQueryParameters::new().with_visible_only(true);

    assert!(store.set_feature_visible(second, false).unwrap());
    assert_eq!(ids(&store, &visible), vec![first, third]);
    assert!(!store.is_feature_visible(second).unwrap());

    // a set toggle clears the deviation on #2
    assert!(store.set_feature_set_visible(set.id, false).unwrap());
    assert!(ids(&store, &visible).is_empty());
    assert!(!store.is_feature_set_visible(set.id).unwrap());

    assert!(store.set_feature_visible(second, true).unwrap());
    assert_eq!(ids(&store, &visible), vec![second]);
    assert!(store.is_feature_set_visible(set.id).unwrap());
}

#[test]
fn test_scenario_pagination_across_sets() {
    let (_dir, store) = open();
    let a = store
        .insert_feature_set(&FeatureSetDefinition::new("a", "p"))
        .unwrap();
    let b = store
        .insert_feature_set(&FeatureSetDefinition::new("b", "p"))
        .unwrap();
    store
        .insert_features(
            a.id,
            &[
                FeatureDefinition::new("delta", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("alpha", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();
    store
        .insert_features(
            b.id,
            &[
                FeatureDefinition::new("Charlie", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("bravo", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();

    let params = FeatureQueryParameters::new()
        .with_feature_set_ids([a.id, b.id])
        .with_order(Order::FeatureName)
        .with_limit(2)
        .with_offset(1);
    assert_eq!(names(&store, &params), vec!["bravo", "Charlie"]);
    assert_eq!(store.query_features_count(&params).unwrap(), 2);
}

#[test]
fn test_pagination_merges_checked_sets() {
    let (_dir, store) = open();
    let a = store
        .insert_feature_set(&FeatureSetDefinition::new("a", "p"))
        .unwrap();
    let b = store
        .insert_feature_set(&FeatureSetDefinition::new("b", "p"))
        .unwrap();
    let a_rows = store
        .insert_features(
            a.id,
            &[
                FeatureDefinition::new("delta", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("alpha", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("hidden", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();
    store
        .insert_features(
            b.id,
            &[
                FeatureDefinition::new("Charlie", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("bravo", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();
    store.set_feature_visible(a_rows[2].id, false).unwrap();

    // set a carries an override, so the query splits into two sub-queries
    let params = FeatureQueryParameters::new()
        .with_visible_only(true)
        .with_order(Order::FeatureName)
        .with_limit(2)
        .with_offset(1);
    assert_eq!(names(&store, &params), vec!["bravo", "Charlie"]);
    assert_eq!(store.query_features_count(&params).unwrap(), 2);

    let all_visible = FeatureQueryParameters::new().with_visible_only(true);
    assert_eq!(store.query_features_count(&all_visible).unwrap(), 4);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_contents_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.sqlite");
    let (set_id, fid) = {
        let store = SqliteFeatureDataStore::open(&path).unwrap();
        let set = store
            .insert_feature_set(
                &FeatureSetDefinition::new("roads", "osm").with_resolution(resolution_of(3), resolution_of(17)),
            )
            .unwrap();
        let mut attrs = AttributeSet::new();
        attrs.set_long("osm_id", 1 << 40);
        let mut nested = AttributeSet::new();
        nested.set_double("width", 7.5);
        attrs.set_attributes("profile", nested);
        let feature = store
            .insert_feature(
                set.id,
                &FeatureDefinition::new("Main St", line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)])
                    .with_style(Style::Stroke {
                        color: 0xff00_00ff,
                        width: 2.0,
                    })
                    .with_attributes(attrs)
                    .with_timestamp(1_700_000_000_000),
            )
            .unwrap();
        store.set_feature_visible(feature.id, false).unwrap();
        store.dispose();
        (set.id, feature.id)
    };

    let store = SqliteFeatureDataStore::open(&path).unwrap();
    let set = store.get_feature_set(set_id).unwrap().unwrap();
    assert_eq!((set.min_lod, set.max_lod), (3, 17));
    let feature = store.get_feature(fid).unwrap().unwrap();
    assert_eq!(feature.name.as_deref(), Some("Main St"));
    assert_eq!(
        feature.geometry,
        Some(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into())
    );
    assert_eq!(
        feature.style,
        Some(Style::Stroke {
            color: 0xff00_00ff,
            width: 2.0
        })
    );
    let attrs = feature.attributes.unwrap();
    assert_eq!(attrs.get_long("osm_id"), Some(1 << 40));
    assert_eq!(attrs.get_attributes("profile").unwrap().get_double("width"), Some(7.5));
    assert_eq!(feature.timestamp, Some(1_700_000_000_000));
    assert!(!store.is_feature_visible(fid).unwrap());
    assert!(store.has_time_reference().unwrap());
}

#[test]
fn test_ids_are_never_reused() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let first = store
        .insert_feature(set.id, &FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)))
        .unwrap();
    assert!(store.delete_feature(first.id).unwrap());
    let second = store
        .insert_feature(set.id, &FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)))
        .unwrap();
    assert!(second.id > first.id);

    assert!(store.delete_feature_set(set.id).unwrap());
    let next = store
        .insert_feature_set(&FeatureSetDefinition::new("t", "p"))
        .unwrap();
    assert!(next.id > set.id);
}

#[test]
fn test_requested_ids_are_honoured_and_checked() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let feature = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)).with_id(500),
        )
        .unwrap();
    assert_eq!(feature.id, 500);

    let err = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)).with_id(500),
        )
        .unwrap_err();
    assert!(!err.is_storage());
    assert!(store
        .insert_feature(999, &FeatureDefinition::new("c", point!(x: 0.0, y: 0.0)))
        .is_err());
}

#[test]
fn test_identical_styles_share_a_row_and_replaced_styles_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.sqlite");
    let store = SqliteFeatureDataStore::open(&path).unwrap();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let style = Style::Fill { color: 0x00ff_00ff };
    let rows = store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)).with_style(style.clone()),
                FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)).with_style(style.clone()),
                FeatureDefinition::new("c", point!(x: 0.0, y: 0.0)).with_style(Style::Fill { color: 1 }),
            ],
        )
        .unwrap();
    let style_rows = |conn: &Connection| -> i64 {
        conn.query_row("SELECT COUNT(*) FROM styles", [], |r| r.get(0))
            .unwrap()
    };
    let peek = Connection::open(&path).unwrap();
    assert_eq!(style_rows(&peek), 2);

    // the shared row stays while a second feature references it
    store
        .update_feature(rows[0].id, &FeatureUpdate::new().style(None))
        .unwrap();
    assert_eq!(style_rows(&peek), 2);
    store
        .update_feature(rows[2].id, &FeatureUpdate::new().style(Some(style.clone())))
        .unwrap();
    assert_eq!(style_rows(&peek), 2);
    assert_eq!(store.get_feature(rows[0].id).unwrap().unwrap().style, None);
    assert_eq!(store.get_feature(rows[2].id).unwrap().unwrap().style, Some(style));
}

#[test]
fn test_merge_attributes_keeps_existing_keys() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let mut attrs = AttributeSet::new();
    attrs.set_int("lanes", 2);
    attrs.set_string("surface", Some("asphalt".to_string()));
    let feature = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("road", point!(x: 0.0, y: 0.0)).with_attributes(attrs),
        )
        .unwrap();

    let mut patch = AttributeSet::new();
    patch.set_int("lanes", 4);
    patch.set(
        "tags",
        AttributeValue::StringArray(Some(vec![Some("one".to_string()), None])),
    );
    assert!(store
        .update_feature(feature.id, &FeatureUpdate::new().merge_attributes(patch))
        .unwrap());

    let merged = store.get_feature(feature.id).unwrap().unwrap().attributes.unwrap();
    assert_eq!(merged.get_int("lanes"), Some(4));
    assert_eq!(merged.get_string("surface"), Some("asphalt"));
    assert_eq!(
        merged.get("tags"),
        Some(&AttributeValue::StringArray(Some(vec![Some("one".to_string()), None])))
    );
}

#[test]
fn test_same_key_with_two_types() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let mut as_int = AttributeSet::new();
    as_int.set_int("height", 12);
    let mut as_text = AttributeSet::new();
    as_text.set_string("height", Some("tall".to_string()));
    let rows = store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)).with_attributes(as_int),
                FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)).with_attributes(as_text),
            ],
        )
        .unwrap();
    let a = store.get_feature(rows[0].id).unwrap().unwrap();
    let b = store.get_feature(rows[1].id).unwrap().unwrap();
    assert_eq!(a.attributes.unwrap().get_int("height"), Some(12));
    assert_eq!(b.attributes.unwrap().get_string("height"), Some("tall"));
}

#[test]
fn test_corrupt_attribute_blob_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.sqlite");
    let store = SqliteFeatureDataStore::open(&path).unwrap();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let mut attrs = AttributeSet::new();
    attrs.set_int("lanes", 2);
    let feature = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("road", point!(x: 0.0, y: 0.0)).with_attributes(attrs),
        )
        .unwrap();

    Connection::open(&path)
        .unwrap()
        .execute("UPDATE attributes SET value = x'00000009ff'", [])
        .unwrap();

    let stored = store.get_feature(feature.id).unwrap().unwrap();
    assert!(stored.attributes.is_none());
    assert_eq!(stored.name.as_deref(), Some("road"));
}

#[test]
fn test_timestamps() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    store
        .insert_feature(set.id, &FeatureDefinition::new("untimed", point!(x: 0.0, y: 0.0)))
        .unwrap();
    assert!(!store.has_time_reference().unwrap());
    assert_eq!(store.minimum_timestamp().unwrap(), None);

    store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)).with_timestamp(300),
                FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)).with_timestamp(100),
            ],
        )
        .unwrap();
    assert!(store.has_time_reference().unwrap());
    assert_eq!(store.minimum_timestamp().unwrap(), Some(100));
    assert_eq!(store.maximum_timestamp().unwrap(), Some(300));
}

// ============================================================================
// Visibility
// ============================================================================

#[test]
fn test_hiding_every_member_flips_the_set() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let rows = store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();
    store.set_feature_visible(rows[0].id, false).unwrap();
    let partial = store.get_feature_set(set.id).unwrap().unwrap();
    assert!(partial.visible);
    assert!(partial.visible_check);

    store.set_feature_visible(rows[1].id, false).unwrap();
    let collapsed = store.get_feature_set(set.id).unwrap().unwrap();
    assert!(!collapsed.visible);
    assert!(!collapsed.visible_check);
    assert_eq!(collapsed.visible_version, partial.visible_version + 1);
    assert!(!store.is_feature_set_visible(set.id).unwrap());

    // showing one again deviates from the new baseline
    store.set_feature_visible(rows[0].id, true).unwrap();
    assert!(store.is_feature_visible(rows[0].id).unwrap());
    assert!(!store.is_feature_visible(rows[1].id).unwrap());
    assert!(store.is_feature_set_visible(set.id).unwrap());
}

#[test]
fn test_deleting_the_last_visible_member_flips_the_set() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let rows = store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();
    store.set_feature_visible(rows[0].id, false).unwrap();
    assert!(store.delete_feature(rows[1].id).unwrap());

    let set = store.get_feature_set(set.id).unwrap().unwrap();
    assert!(!set.visible);
    assert!(!set.visible_check);
    assert!(!store.is_feature_visible(rows[0].id).unwrap());
}

#[test]
fn test_set_features_visible_by_params() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("a1", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("a2", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("b1", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();
    store
        .set_features_visible(&FeatureQueryParameters::new().with_names(["a%"]), false)
        .unwrap();
    let visible = FeatureQueryParameters::new().with_visible_only(true);
    assert_eq!(names(&store, &visible), vec!["b1"]);

    store
        .set_features_visible(&FeatureQueryParameters::new().with_names(["b1"]), false)
        .unwrap();
    assert!(names(&store, &visible).is_empty());
    assert!(!store.get_feature_set(set.id).unwrap().unwrap().visible);
}

#[test]
fn test_set_feature_sets_visible_by_params() {
    let (_dir, store) = open();
    for (name, provider) in [("roads", "osm"), ("rails", "osm"), ("rivers", "usgs")] {
        let set = store
            .insert_feature_set(&FeatureSetDefinition::new(name, provider))
            .unwrap();
        store
            .insert_feature(set.id, &FeatureDefinition::new(name, point!(x: 0.0, y: 0.0)))
            .unwrap();
    }
    store
        .set_feature_sets_visible(&FeatureSetQueryParameters::new().with_providers(["osm"]), false)
        .unwrap();
    let visible = FeatureQueryParameters::new().with_visible_only(true);
    assert_eq!(names(&store, &visible), vec!["rivers"]);
    let visible_sets = FeatureSetQueryParameters::new().with_visible_only(true);
    assert_eq!(store.query_feature_sets_count(&visible_sets).unwrap(), 1);
}

// ============================================================================
// Spatial
// ============================================================================

#[test]
fn test_antimeridian_region() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("ferries", "p"))
        .unwrap();
    let crossing = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("crossing", line_string![(x: 179.0, y: 0.0), (x: 181.0, y: 0.0)]),
        )
        .unwrap();

    let east = FeatureQueryParameters::new()
        .with_spatial_filter(SpatialFilter::region(1.0, -179.5, -1.0, -178.5));
    assert_eq!(ids(&store, &east), vec![crossing.id]);

    let west = FeatureQueryParameters::new()
        .with_spatial_filter(SpatialFilter::region(1.0, 179.2, -1.0, 179.8));
    assert_eq!(ids(&store, &west), vec![crossing.id]);

    let far = FeatureQueryParameters::new()
        .with_spatial_filter(SpatialFilter::region(1.0, 10.0, -1.0, 20.0));
    assert!(ids(&store, &far).is_empty());
}

#[test]
fn test_radius_and_distance_order() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("stops", "p"))
        .unwrap();
    let near = store
        .insert_feature(set.id, &FeatureDefinition::new("near", point!(x: 0.001, y: 0.0)))
        .unwrap();
    let mid = store
        .insert_feature(set.id, &FeatureDefinition::new("mid", point!(x: 0.005, y: 0.0)))
        .unwrap();
    store
        .insert_feature(set.id, &FeatureDefinition::new("far", point!(x: 1.0, y: 0.0)))
        .unwrap();

    let origin = point!(x: 0.0, y: 0.0);
    let params = FeatureQueryParameters::new()
        .with_spatial_filter(SpatialFilter::radius(origin, 1_000.0))
        .with_order(Order::Distance(origin));
    assert_eq!(ids(&store, &params), vec![near.id, mid.id]);
    assert_eq!(store.query_features_count(&params).unwrap(), 2);

    let farthest_first = FeatureQueryParameters::new().with_order(Order::Distance(point!(x: 1.0, y: 0.0)));
    assert_eq!(ids(&store, &farthest_first)[2], near.id);
}

#[test]
fn test_geometry_update_moves_the_index_entry() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let feature = store
        .insert_feature(set.id, &FeatureDefinition::new("mover", point!(x: 0.0, y: 0.0)))
        .unwrap();
    store
        .update_feature(feature.id, &FeatureUpdate::new().geometry(point!(x: 50.0, y: 50.0)))
        .unwrap();

    let old_spot = FeatureQueryParameters::new()
        .with_spatial_filter(SpatialFilter::region(1.0, -1.0, -1.0, 1.0));
    let new_spot = FeatureQueryParameters::new()
        .with_spatial_filter(SpatialFilter::region(51.0, 49.0, 49.0, 51.0));
    assert!(ids(&store, &old_spot).is_empty());
    assert_eq!(ids(&store, &new_spot), vec![feature.id]);
}

#[test]
fn test_geometry_type_filter() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("mixed", "p"))
        .unwrap();
    store
        .insert_feature(set.id, &FeatureDefinition::new("pt", point!(x: 0.0, y: 0.0)))
        .unwrap();
    let area = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new(
                "area",
                polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)],
            ),
        )
        .unwrap();
    let params = FeatureQueryParameters::new().with_geometry_types([GeometryType::Polygon]);
    assert_eq!(ids(&store, &params), vec![area.id]);
}

#[test]
fn test_ignored_fields_are_omitted() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("x", point!(x: 0.0, y: 0.0)).with_style(Style::Fill { color: 7 }),
        )
        .unwrap();
    let params = FeatureQueryParameters::new().with_ignored_fields(
        featuredb_core::IgnoredFields::GEOMETRY.union(featuredb_core::IgnoredFields::STYLE),
    );
    let feature = store.query_features(&params).unwrap().next().unwrap();
    assert!(feature.geometry.is_none());
    assert!(feature.style.is_none());
    assert_eq!(feature.name.as_deref(), Some("x"));
}

// ============================================================================
// Feature sets and levels of detail
// ============================================================================

#[test]
fn test_resolution_filter_and_order() {
    let (_dir, store) = open();
    let coarse = store
        .insert_feature_set(
            &FeatureSetDefinition::new("coarse", "p").with_resolution(resolution_of(0), resolution_of(8)),
        )
        .unwrap();
    let fine = store
        .insert_feature_set(
            &FeatureSetDefinition::new("fine", "p").with_resolution(resolution_of(6), resolution_of(18)),
        )
        .unwrap();
    let c = store
        .insert_feature(coarse.id, &FeatureDefinition::new("c", point!(x: 0.0, y: 0.0)))
        .unwrap();
    let f = store
        .insert_feature(fine.id, &FeatureDefinition::new("f", point!(x: 0.0, y: 0.0)))
        .unwrap();

    let detailed = FeatureQueryParameters::new().with_resolution(resolution_of(12), f64::NAN);
    assert_eq!(ids(&store, &detailed), vec![f.id]);

    let by_resolution = FeatureQueryParameters::new().with_order(Order::Resolution);
    assert_eq!(ids(&store, &by_resolution), vec![f.id, c.id]);
}

#[test]
fn test_feature_set_updates_bump_versions() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("parks", "p"))
        .unwrap();
    assert_eq!(set.version(), 1);

    assert!(store.update_feature_set_name(set.id, "Parks").unwrap());
    assert!(store
        .update_feature_set_resolution(set.id, resolution_of(2), resolution_of(14))
        .unwrap());
    let updated = store.get_feature_set(set.id).unwrap().unwrap();
    assert_eq!(updated.name, "Parks");
    assert_eq!(updated.name_version, 2);
    assert_eq!(updated.lod_version, 2);
    assert_eq!((updated.min_lod, updated.max_lod), (2, 14));
    assert_eq!(updated.version(), 3);

    assert!(!store.update_feature_set_name(999, "nope").unwrap());
    assert!(!store.update_feature_set(999, "nope", 1.0, 0.0).unwrap());
}

#[test]
fn test_feature_set_queries() {
    let (_dir, store) = open();
    for (name, provider) in [("roads", "osm"), ("rails", "osm"), ("rivers", "usgs")] {
        store
            .insert_feature_set(&FeatureSetDefinition::new(name, provider))
            .unwrap();
    }
    let osm = FeatureSetQueryParameters::new().with_providers(["OSM"]);
    assert_eq!(store.query_feature_sets_count(&osm).unwrap(), 2);

    let names: Vec<String> = store
        .query_feature_sets(&FeatureSetQueryParameters::new().with_names(["r%s"]).with_offset(1))
        .unwrap()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["rails", "rivers"]);

    assert_eq!(store.delete_feature_sets(&osm).unwrap(), 2);
    assert_eq!(
        store
            .query_feature_sets_count(&FeatureSetQueryParameters::new())
            .unwrap(),
        1
    );
    assert_eq!(store.delete_all_feature_sets().unwrap(), 1);
}

#[test]
fn test_deleting_a_set_removes_its_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.sqlite");
    let store = SqliteFeatureDataStore::open(&path).unwrap();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let mut attrs = AttributeSet::new();
    attrs.set_int("n", 1);
    let feature = store
        .insert_feature(
            set.id,
            &FeatureDefinition::new("x", point!(x: 0.0, y: 0.0))
                .with_attributes(attrs)
                .with_style(Style::Fill { color: 3 }),
        )
        .unwrap();
    assert!(store.delete_feature_set(set.id).unwrap());
    assert!(store.get_feature(feature.id).unwrap().is_none());
    assert_eq!(store.query_features_count(&FeatureQueryParameters::new()).unwrap(), 0);

    let peek = Connection::open(&path).unwrap();
    for table in ["styles", "attributes", "idx_features_geometry"] {
        let rows: i64 = peek
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0, "{} not emptied", table);
    }
}

#[test]
fn test_delete_all_features_keeps_the_set() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    store
        .insert_features(
            set.id,
            &[
                FeatureDefinition::new("a", point!(x: 0.0, y: 0.0)),
                FeatureDefinition::new("b", point!(x: 0.0, y: 0.0)),
            ],
        )
        .unwrap();
    assert_eq!(store.delete_all_features(set.id).unwrap(), 2);
    assert!(store.get_feature_set(set.id).unwrap().is_some());
}

// ============================================================================
// Bulk modifications
// ============================================================================

#[test]
fn test_combined_set_update_notifies_once() {
    let (_dir, store) = open();
    let listener = Arc::new(CountingListener::default());
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    store.add_content_listener(listener.clone());

    assert!(store
        .update_feature_set(set.id, "renamed", resolution_of(2), resolution_of(9))
        .unwrap());
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    let updated = store.get_feature_set(set.id).unwrap().unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!((updated.min_lod, updated.max_lod), (2, 9));
}

#[test]
fn test_bulk_modification_commits_and_notifies_once() {
    let (_dir, store) = open();
    let listener = Arc::new(CountingListener::default());
    store.add_content_listener(listener.clone());

    let bulk = store.begin_bulk_modification().unwrap();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    for i in 0..5 {
        store
            .insert_feature(
                set.id,
                &FeatureDefinition::new(format!("f{}", i), point!(x: 0.0, y: 0.0)),
            )
            .unwrap();
    }
    assert_eq!(listener.calls.load(Ordering::SeqCst), 0);
    bulk.commit().unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.query_features_count(&FeatureQueryParameters::new()).unwrap(), 5);
}

#[test]
fn test_dropped_bulk_modification_rolls_back() {
    let (_dir, store) = open();
    let kept = store
        .insert_feature_set(&FeatureSetDefinition::new("kept", "p"))
        .unwrap();
    {
        let _bulk = store.begin_bulk_modification().unwrap();
        let set = store
            .insert_feature_set(&FeatureSetDefinition::new("lost", "p"))
            .unwrap();
        let mut attrs = AttributeSet::new();
        attrs.set_int("fresh_key", 1);
        store
            .insert_feature(
                set.id,
                &FeatureDefinition::new("x", point!(x: 0.0, y: 0.0)).with_attributes(attrs),
            )
            .unwrap();
    }
    let sets: Vec<i64> = store
        .query_feature_sets(&FeatureSetQueryParameters::new())
        .unwrap()
        .map(|s| s.id)
        .collect();
    assert_eq!(sets, vec![kept.id]);
    assert_eq!(store.query_features_count(&FeatureQueryParameters::new()).unwrap(), 0);

    // the key registered inside the rolled back session is registered again
    let mut attrs = AttributeSet::new();
    attrs.set_int("fresh_key", 2);
    let feature = store
        .insert_feature(
            kept.id,
            &FeatureDefinition::new("y", point!(x: 0.0, y: 0.0)).with_attributes(attrs),
        )
        .unwrap();
    let stored = store.get_feature(feature.id).unwrap().unwrap();
    assert_eq!(stored.attributes.unwrap().get_int("fresh_key"), Some(2));
}

#[test]
fn test_explicit_rollback_keeps_earlier_data() {
    let (_dir, store) = open();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    let bulk = store.begin_bulk_modification().unwrap();
    store
        .insert_feature(set.id, &FeatureDefinition::new("x", point!(x: 0.0, y: 0.0)))
        .unwrap();
    bulk.rollback().unwrap();
    assert!(store.get_feature_set(set.id).unwrap().is_some());
    assert_eq!(store.query_features_count(&FeatureQueryParameters::new()).unwrap(), 0);
}

// ============================================================================
// Capabilities and lifecycle
// ============================================================================

#[test]
fn test_capability_gating() {
    let (_dir, store) = open();
    let store = store.with_capabilities(ModificationFlags::FEATURESET_INSERT, VisibilityFlags::NONE);
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    assert!(store
        .insert_feature(set.id, &FeatureDefinition::new("x", point!(x: 0.0, y: 0.0)))
        .unwrap_err()
        .is_unsupported());
    assert!(store.set_feature_set_visible(set.id, false).unwrap_err().is_unsupported());
    assert!(store.begin_bulk_modification().err().unwrap().is_unsupported());
    assert!(store.delete_feature_set(set.id).unwrap_err().is_unsupported());
}

#[test]
fn test_read_only_config_keeps_visibility_adjustable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.sqlite");
    let set_id = {
        let store = SqliteFeatureDataStore::open(&path).unwrap();
        let set = store
            .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
            .unwrap();
        store.dispose();
        set.id
    };
    let config = FeatureDbConfig {
        read_only: true,
        ..FeatureDbConfig::default()
    };
    let store = SqliteFeatureDataStore::open_with_config(&path, &config).unwrap();
    assert_eq!(store.modification_flags(), ModificationFlags::NONE);
    assert!(store
        .insert_feature_set(&FeatureSetDefinition::new("t", "p"))
        .unwrap_err()
        .is_unsupported());
    assert!(store.set_feature_set_visible(set_id, false).unwrap());
}

#[test]
fn test_disposed_store_is_not_available() {
    let (_dir, store) = open();
    store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    store.dispose();
    store.dispose();
    assert!(store
        .query_features(&FeatureQueryParameters::new())
        .err()
        .unwrap()
        .is_not_available());
    assert!(store.get_feature_set(1).unwrap_err().is_not_available());
    assert!(store
        .insert_feature_set(&FeatureSetDefinition::new("t", "p"))
        .unwrap_err()
        .is_not_available());
    assert!(store.refresh().unwrap_err().is_not_available());
}

#[test]
fn test_unknown_ids_are_not_errors() {
    let (_dir, store) = open();
    assert!(store.get_feature(42).unwrap().is_none());
    assert!(store.get_feature_set(42).unwrap().is_none());
    assert!(!store.delete_feature(42).unwrap());
    assert!(!store.delete_feature_set(42).unwrap());
    assert!(!store.update_feature(42, &FeatureUpdate::new().name("x")).unwrap());
    assert!(!store.set_feature_visible(42, false).unwrap());
    assert!(!store.set_feature_set_visible(42, false).unwrap());
    assert!(!store.is_feature_visible(42).unwrap());
    assert!(!store.is_feature_set_visible(42).unwrap());
}

#[test]
fn test_listener_notified_once_per_change() {
    let (_dir, store) = open();
    let listener = Arc::new(CountingListener::default());
    let as_dyn: Arc<dyn ContentListener> = listener.clone();
    store.add_content_listener(as_dyn.clone());

    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    let f = store
        .insert_feature(set.id, &FeatureDefinition::new("x", point!(x: 0.0, y: 0.0)))
        .unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);

    store.set_feature_visible(f.id, true).unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);

    // a failed write changes nothing
    assert!(store
        .insert_feature(set.id, &FeatureDefinition::new("y", point!(x: 0.0, y: 0.0)).with_id(f.id))
        .is_err());
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);

    store.remove_content_listener(&as_dyn);
    store.delete_feature(f.id).unwrap();
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_refresh_sees_external_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("features.sqlite");
    let store = SqliteFeatureDataStore::open(&path).unwrap();
    let set = store
        .insert_feature_set(&FeatureSetDefinition::new("s", "p"))
        .unwrap();
    store
        .insert_feature(set.id, &FeatureDefinition::new("x", point!(x: 0.0, y: 0.0)))
        .unwrap();
    assert_eq!(store.maximum_timestamp().unwrap(), None);

    Connection::open(&path)
        .unwrap()
        .execute("UPDATE features SET timestamp = 42", [])
        .unwrap();
    assert_eq!(store.maximum_timestamp().unwrap(), None);
    store.refresh().unwrap();
    assert_eq!(store.maximum_timestamp().unwrap(), Some(42));
}
