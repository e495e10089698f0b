//! Both backends give identical answers for the same history of mutations
//!
//! A seeded random workload is applied to a SQLite store and an in-memory
//! store side by side; after every step a fixed battery of queries must
//! return equal features, sets, counts and visibility.

use featuredb::{
    resolution_of, AttributeSet, Feature, FeatureDataStore, FeatureDefinition, FeatureQueryParameters,
    FeatureSet, FeatureSetDefinition, FeatureSetQueryParameters, FeatureUpdate, GeometryType,
    MemoryFeatureDataStore, Order, SpatialFilter, SqliteFeatureDataStore, Style,
};
use geo_types::{line_string, point, Geometry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const NAMES: [&str; 5] = ["Harbor", "harbor east", "Mill", "mill_2", "Quay"];

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn random_geometry(rng: &mut StdRng) -> Geometry<f64> {
    let lng = rng.gen_range(-181.0..181.0);
    let lat = rng.gen_range(-60.0..60.0);
    if rng.gen_bool(0.6) {
        point!(x: lng, y: lat).into()
    } else {
        line_string![(x: lng, y: lat), (x: lng + 2.0, y: lat + 1.0)].into()
    }
}

fn random_definition(rng: &mut StdRng, n: usize) -> FeatureDefinition {
    let mut definition = FeatureDefinition::new(NAMES[rng.gen_range(0..NAMES.len())], random_geometry(rng));
    if rng.gen_bool(0.3) {
        let mut attrs = AttributeSet::new();
        attrs.set_int("rank", rng.gen_range(0..10));
        attrs.set_string("label", Some(format!("n{}", n)));
        definition = definition.with_attributes(attrs);
    }
    if rng.gen_bool(0.3) {
        definition = definition.with_style(Style::Fill {
            color: rng.gen_range(0..4),
        });
    }
    if rng.gen_bool(0.2) {
        definition = definition.with_timestamp(rng.gen_range(0..1_000_000));
    }
    definition
}

/// One mutation applied identically to both stores
fn step(rng: &mut StdRng, n: usize, stores: &[&dyn FeatureDataStore]) {
    let set_ids: Vec<i64> = stores[0]
        .query_feature_sets(&FeatureSetQueryParameters::new())
        .unwrap()
        .map(|s| s.id)
        .collect();
    let max_fid = stores[0]
        .query_features(&FeatureQueryParameters::new().with_order(Order::FeatureId))
        .unwrap()
        .map(|f| f.id)
        .last()
        .unwrap_or(1);

    let choice = if set_ids.is_empty() { 0 } else { rng.gen_range(0..12) };
    match choice {
        0 => {
            let min_lod = rng.gen_range(0..12);
            let definition = FeatureSetDefinition::new(format!("set{}", n), if n % 2 == 0 { "osm" } else { "usgs" })
                .with_resolution(resolution_of(min_lod), resolution_of(min_lod + rng.gen_range(0..20)));
            for store in stores {
                store.insert_feature_set(&definition).unwrap();
            }
        }
        1..=3 => {
            let set = set_ids[rng.gen_range(0..set_ids.len())];
            let batch: Vec<FeatureDefinition> = (0..rng.gen_range(1..5))
                .map(|i| random_definition(rng, n * 10 + i))
                .collect();
            for store in stores {
                store.insert_features(set, &batch).unwrap();
            }
        }
        4 | 5 => {
            let fid = rng.gen_range(1..=max_fid);
            let visible = rng.gen_bool(0.4);
            let results: Vec<bool> = stores
                .iter()
                .map(|store| store.set_feature_visible(fid, visible).unwrap())
                .collect();
            assert_eq!(results[0], results[1], "set_feature_visible({})", fid);
        }
        6 => {
            let set = set_ids[rng.gen_range(0..set_ids.len())];
            let visible = rng.gen_bool(0.5);
            for store in stores {
                store.set_feature_set_visible(set, visible).unwrap();
            }
        }
        7 => {
            let fid = rng.gen_range(1..=max_fid);
            let mut attrs = AttributeSet::new();
            attrs.set_int("rank", 99);
            let update = match rng.gen_range(0..4) {
                0 => FeatureUpdate::new().name("renamed"),
                1 => FeatureUpdate::new().geometry(random_geometry(rng)),
                2 => FeatureUpdate::new().merge_attributes(attrs),
                _ => FeatureUpdate::new().style(None).extrude(3.0),
            };
            let results: Vec<bool> = stores
                .iter()
                .map(|store| store.update_feature(fid, &update).unwrap())
                .collect();
            assert_eq!(results[0], results[1], "update_feature({})", fid);
        }
        8 => {
            let fid = rng.gen_range(1..=max_fid);
            let results: Vec<bool> = stores
                .iter()
                .map(|store| store.delete_feature(fid).unwrap())
                .collect();
            assert_eq!(results[0], results[1], "delete_feature({})", fid);
        }
        9 => {
            let params = FeatureQueryParameters::new()
                .with_names(["mill%"])
                .with_limit(2);
            let visible = rng.gen_bool(0.5);
            for store in stores {
                store.set_features_visible(&params, visible).unwrap();
            }
        }
        10 => {
            let set = set_ids[rng.gen_range(0..set_ids.len())];
            let lod = rng.gen_range(0..15);
            for store in stores {
                store
                    .update_feature_set(set, &format!("renamed{}", n), resolution_of(lod), resolution_of(lod + 8))
                    .unwrap();
            }
        }
        _ => {
            if rng.gen_bool(0.3) {
                let set = set_ids[rng.gen_range(0..set_ids.len())];
                for store in stores {
                    store.delete_feature_set(set).unwrap();
                }
            }
        }
    }
}

fn battery() -> Vec<FeatureQueryParameters> {
    vec![
        FeatureQueryParameters::new(),
        FeatureQueryParameters::new().with_visible_only(true),
        FeatureQueryParameters::new()
            .with_visible_only(true)
            .with_order(Order::FeatureName)
            .with_limit(3)
            .with_offset(2),
        FeatureQueryParameters::new().with_names(["harbor%", "QUAY"]),
        FeatureQueryParameters::new().with_names(["mill_2"]),
        FeatureQueryParameters::new().with_spatial_filter(SpatialFilter::region(30.0, 170.0, -30.0, -170.0)),
        FeatureQueryParameters::new()
            .with_spatial_filter(SpatialFilter::radius(point!(x: 0.0, y: 0.0), 3_000_000.0))
            .with_order(Order::Distance(point!(x: 0.0, y: 0.0))),
        FeatureQueryParameters::new().with_geometry_types([GeometryType::LineString]),
        FeatureQueryParameters::new()
            .with_resolution(resolution_of(10), f64::NAN)
            .with_order(Order::Resolution),
        FeatureQueryParameters::new()
            .with_feature_sets(FeatureSetQueryParameters::new().with_providers(["osm"]).with_visible_only(true))
            .with_limit(4),
    ]
}

fn assert_same(sqlite: &SqliteFeatureDataStore, memory: &MemoryFeatureDataStore, step: usize) {
    for params in battery() {
        let a: Vec<Feature> = sqlite.query_features(&params).unwrap().collect();
        let b: Vec<Feature> = memory.query_features(&params).unwrap().collect();
        assert_eq!(a, b, "step {} query {:?}", step, params);
        assert_eq!(
            sqlite.query_features_count(&params).unwrap(),
            memory.query_features_count(&params).unwrap(),
            "step {} count {:?}",
            step,
            params
        );
    }
    let all_sets = FeatureSetQueryParameters::new();
    let a: Vec<FeatureSet> = sqlite.query_feature_sets(&all_sets).unwrap().collect();
    let b: Vec<FeatureSet> = memory.query_feature_sets(&all_sets).unwrap().collect();
    assert_eq!(a, b, "step {} sets", step);
    for set in &a {
        assert_eq!(
            sqlite.is_feature_set_visible(set.id).unwrap(),
            memory.is_feature_set_visible(set.id).unwrap(),
            "step {} set {} visibility",
            step,
            set.id
        );
    }
    assert_eq!(
        sqlite.minimum_timestamp().unwrap(),
        memory.minimum_timestamp().unwrap()
    );
    assert_eq!(
        sqlite.maximum_timestamp().unwrap(),
        memory.maximum_timestamp().unwrap()
    );
}

#[test]
fn test_random_workloads_agree() {
    init_logging();
    for seed in [1u64, 7, 42] {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = SqliteFeatureDataStore::open(dir.path().join("features.sqlite")).unwrap();
        let memory = MemoryFeatureDataStore::new();
        let mut rng = StdRng::seed_from_u64(seed);
        for n in 0..120 {
            step(&mut rng, n, &[&sqlite, &memory]);
            assert_same(&sqlite, &memory, n);
        }
    }
}

#[test]
fn test_scenarios_agree() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteFeatureDataStore::open(dir.path().join("features.sqlite")).unwrap();
    let memory = MemoryFeatureDataStore::new();
    let stores: [&dyn FeatureDataStore; 2] = [&sqlite, &memory];

    for store in stores {
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
                    FeatureDefinition::new("alpha", point!(x: 1.0, y: 0.0)),
                ],
            )
            .unwrap();
        store
            .insert_features(
                b.id,
                &[
                    FeatureDefinition::new("Charlie", point!(x: 2.0, y: 0.0)),
                    FeatureDefinition::new("bravo", point!(x: 3.0, y: 0.0)),
                ],
            )
            .unwrap();
        store.set_feature_visible(2, false).unwrap();
        store.set_feature_set_visible(b.id, false).unwrap();
        store.set_feature_visible(4, true).unwrap();
    }
    assert_same(&sqlite, &memory, 0);
}
