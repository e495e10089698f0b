//! featuredb - embedded geospatial feature data store
//!
//! featuredb keeps vector features (geometry, style and typed attributes)
//! grouped into feature sets, and answers filtered, ordered and paginated
//! queries over them. Two backends implement the same [`FeatureDataStore`]
//! contract with identical query semantics:
//!
//! - [`SqliteFeatureDataStore`]: persistent, a single SQLite file
//! - [`MemoryFeatureDataStore`]: volatile, quadtree and hash indices
//!
//! # Quick Start
//!
//! ```ignore
//! use featuredb::{FeatureDefinition, FeatureQueryParameters, FeatureSetDefinition};
//!
//! let store = featuredb::open("/var/data/features")?;
//! let roads = store.insert_feature_set(&FeatureSetDefinition::new("roads", "osm"))?;
//! store.insert_feature(roads.id, &FeatureDefinition::new("Main St", point!(x: 4.9, y: 52.4)))?;
//!
//! let named = FeatureQueryParameters::new().with_names(["main%"]);
//! for feature in store.query_features(&named)? {
//!     println!("{:?}", feature.name);
//! }
//! ```
//!
//! # Configuration
//!
//! A data directory holds a `featuredb.toml` next to the database file. The
//! first [`open`] writes a commented default; edit it and reopen to switch
//! backend, mark the store read-only or tune SQLite.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

pub use featuredb_core::*;
pub use featuredb_durability::SqliteFeatureDataStore;
pub use featuredb_engine::{BackendKind, FeatureDbConfig, QueryPlanner, CONFIG_FILE_NAME};
pub use featuredb_storage::MemoryFeatureDataStore;

/// Open the store described by `featuredb.toml` in `dir`
///
/// Creates the directory and a default config file when missing.
///
/// # Errors
///
/// Returns an error if the directory or config cannot be written or read,
/// the config names an unknown backend, or the database cannot be opened.
pub fn open(dir: impl AsRef<Path>) -> FeatureDbResult<Arc<dyn FeatureDataStore>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    let config_path = dir.join(CONFIG_FILE_NAME);
    FeatureDbConfig::write_default_if_missing(&config_path)?;
    let config = FeatureDbConfig::from_file(&config_path)?;
    open_with_config(dir, &config)
}

/// Open a store in `dir` with an explicit configuration
///
/// The config is written to `featuredb.toml` so later [`open`] calls pick up
/// the same settings.
pub fn open_with_config(
    dir: impl AsRef<Path>,
    config: &FeatureDbConfig,
) -> FeatureDbResult<Arc<dyn FeatureDataStore>> {
    let dir = dir.as_ref();
    let kind = config.backend_kind()?;
    std::fs::create_dir_all(dir)?;
    config.write_to_file(&dir.join(CONFIG_FILE_NAME))?;

    let store: Arc<dyn FeatureDataStore> = match kind {
        BackendKind::Sqlite => Arc::new(SqliteFeatureDataStore::open_with_config(
            dir.join(&config.database),
            config,
        )?),
        BackendKind::Memory => Arc::new(
            MemoryFeatureDataStore::with_config(&config.memory)
                .with_capabilities(config.modification_flags(), config.visibility_flags()),
        ),
    };
    info!(target: "featuredb::store", dir = %dir.display(), backend = ?kind, uri = %store.uri(), "opened data directory");
    Ok(store)
}
