//! Mapping of SQLite failures into the store error taxonomy

use featuredb_core::{FeatureDbError, FeatureDbResult};

/// Adapter turning `rusqlite` results into store results
pub trait StorageResultExt<T> {
    /// Map an engine error to [`FeatureDbError::Storage`], prefixed with
    /// what was being attempted
    fn storage(self, context: &str) -> FeatureDbResult<T>;
}

impl<T> StorageResultExt<T> for Result<T, rusqlite::Error> {
    fn storage(self, context: &str) -> FeatureDbResult<T> {
        self.map_err(|e| FeatureDbError::storage(format!("{}: {}", context, e)))
    }
}
