//! Durable database layout
//!
//! ## Tables
//!
//! - `featuresets`: one row per set with its baseline visibility, display
//!   thresholds, `*_check` flags and per-aspect version counters
//! - `features`: one row per feature; `visible`, `min_lod`, `max_lod` are
//!   feature-level overrides that only apply while the feature's stamp
//!   (`visible_version`, `lod_version`) equals the set's counter
//! - `styles`, `attributes`: encoded blobs referenced by id
//! - `attribs_schema`: the attribute schema registry
//! - `idx_features_geometry`: R*Tree over feature envelopes
//!
//! ## Triggers
//!
//! Writing a feature override marks the parent set as needing checks and
//! stamps the feature from the set's counter. Writing a set's visibility,
//! thresholds or name bumps that counter, which invalidates every existing
//! stamp at once, and clears the check flag. Deleting a set deletes its
//! features; deleting a feature drops its index entry and blobs.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use featuredb_core::FeatureDbResult;

use crate::error::StorageResultExt;

/// Value of `PRAGMA user_version` for this layout
pub const SCHEMA_VERSION: i32 = 1;

const TABLES: &str = "
CREATE TABLE featuresets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    name_version INTEGER NOT NULL DEFAULT 1,
    visible INTEGER NOT NULL DEFAULT 1,
    visible_version INTEGER NOT NULL DEFAULT 1,
    visible_check INTEGER NOT NULL DEFAULT 0,
    min_lod INTEGER NOT NULL,
    max_lod INTEGER NOT NULL,
    lod_version INTEGER NOT NULL DEFAULT 1,
    lod_check INTEGER NOT NULL DEFAULT 0,
    type TEXT NOT NULL,
    provider TEXT NOT NULL
);

CREATE TABLE features (
    fid INTEGER PRIMARY KEY AUTOINCREMENT,
    fsid INTEGER NOT NULL,
    name TEXT COLLATE NOCASE,
    geometry BLOB,
    geometry_type INTEGER,
    xmin REAL,
    xmax REAL,
    ymin REAL,
    ymax REAL,
    style_id INTEGER,
    attribs_id INTEGER,
    altitude_mode INTEGER NOT NULL DEFAULT 0,
    extrude REAL NOT NULL DEFAULT 0,
    timestamp INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    visible INTEGER NOT NULL DEFAULT 1,
    visible_version INTEGER NOT NULL DEFAULT 0,
    min_lod INTEGER NOT NULL DEFAULT 0,
    max_lod INTEGER NOT NULL DEFAULT 33,
    lod_version INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE styles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    coding TEXT NOT NULL,
    value BLOB NOT NULL
);

CREATE TABLE attributes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    value BLOB NOT NULL
);

CREATE TABLE attribs_schema (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    coding INTEGER NOT NULL
);

CREATE VIRTUAL TABLE idx_features_geometry USING rtree(pkid, xmin, xmax, ymin, ymax);

CREATE INDEX IdxFeaturesLevelOfDetail ON features(min_lod, max_lod);
CREATE INDEX IdxFeaturesName ON features(name);
CREATE INDEX IdxFeaturesFeatureSet ON features(fsid);
CREATE INDEX IdxFeaturesGeometryType ON features(geometry_type);
CREATE INDEX IdxFeaturesTimestamp ON features(timestamp);
CREATE INDEX IdxFeaturesStyle ON features(style_id);
";

const TRIGGERS: &str = "
CREATE TRIGGER features_visible_update AFTER UPDATE OF visible ON features
BEGIN
    UPDATE featuresets SET visible_check = 1 WHERE id = OLD.fsid;
    UPDATE features SET visible_version =
        (SELECT visible_version FROM featuresets WHERE id = OLD.fsid LIMIT 1)
        WHERE fid = OLD.fid;
END;

CREATE TRIGGER features_min_lod_update AFTER UPDATE OF min_lod ON features
BEGIN
    UPDATE featuresets SET lod_check = 1 WHERE id = OLD.fsid;
    UPDATE features SET lod_version =
        (SELECT lod_version FROM featuresets WHERE id = OLD.fsid LIMIT 1)
        WHERE fid = OLD.fid;
END;

CREATE TRIGGER features_max_lod_update AFTER UPDATE OF max_lod ON features
BEGIN
    UPDATE featuresets SET lod_check = 1 WHERE id = OLD.fsid;
    UPDATE features SET lod_version =
        (SELECT lod_version FROM featuresets WHERE id = OLD.fsid LIMIT 1)
        WHERE fid = OLD.fid;
END;

CREATE TRIGGER featuresets_visible_update AFTER UPDATE OF visible ON featuresets
BEGIN
    UPDATE featuresets SET visible_version = OLD.visible_version + 1, visible_check = 0
        WHERE id = OLD.id;
END;

CREATE TRIGGER featuresets_min_lod_update AFTER UPDATE OF min_lod ON featuresets
BEGIN
    UPDATE featuresets SET lod_version = OLD.lod_version + 1, lod_check = 0
        WHERE id = OLD.id;
END;

CREATE TRIGGER featuresets_max_lod_update AFTER UPDATE OF max_lod ON featuresets
BEGIN
    UPDATE featuresets SET lod_version = OLD.lod_version + 1, lod_check = 0
        WHERE id = OLD.id;
END;

CREATE TRIGGER featuresets_name_update AFTER UPDATE OF name ON featuresets
BEGIN
    UPDATE featuresets SET name_version = OLD.name_version + 1 WHERE id = OLD.id;
END;

CREATE TRIGGER featuresets_delete AFTER DELETE ON featuresets FOR EACH ROW
BEGIN
    DELETE FROM features WHERE fsid = OLD.id;
END;

CREATE TRIGGER features_geometry_insert AFTER INSERT ON features
WHEN NEW.xmin IS NOT NULL
BEGIN
    INSERT INTO idx_features_geometry (pkid, xmin, xmax, ymin, ymax)
        VALUES (NEW.fid, NEW.xmin, NEW.xmax, NEW.ymin, NEW.ymax);
END;

CREATE TRIGGER features_geometry_update AFTER UPDATE OF xmin, xmax, ymin, ymax ON features
BEGIN
    DELETE FROM idx_features_geometry WHERE pkid = OLD.fid;
    INSERT INTO idx_features_geometry (pkid, xmin, xmax, ymin, ymax)
        SELECT NEW.fid, NEW.xmin, NEW.xmax, NEW.ymin, NEW.ymax WHERE NEW.xmin IS NOT NULL;
END;

CREATE TRIGGER features_delete AFTER DELETE ON features
BEGIN
    DELETE FROM idx_features_geometry WHERE pkid = OLD.fid;
    DELETE FROM attributes WHERE id = OLD.attribs_id;
    DELETE FROM styles WHERE id = OLD.style_id
        AND NOT EXISTS (SELECT 1 FROM features WHERE style_id = OLD.style_id);
END;
";

/// Create the layout on an empty database, or verify an existing one
///
/// Returns `true` when the layout was created.
pub fn ensure_schema(conn: &mut Connection) -> FeatureDbResult<bool> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .storage("read schema version")?;
    match version {
        SCHEMA_VERSION => {
            verify(conn)?;
            Ok(false)
        }
        0 => {
            let tx = conn.transaction().storage("begin schema creation")?;
            tx.execute_batch(TABLES).storage("create tables")?;
            tx.execute_batch(TRIGGERS).storage("create triggers")?;
            tx.pragma_update(None, "user_version", SCHEMA_VERSION)
                .storage("set schema version")?;
            tx.commit().storage("commit schema creation")?;
            info!(target: "featuredb::sqlite", version = SCHEMA_VERSION, "created schema");
            Ok(true)
        }
        other => Err(featuredb_core::FeatureDbError::storage(format!(
            "unsupported schema version {} (expected {})",
            other, SCHEMA_VERSION
        ))),
    }
}

fn verify(conn: &Connection) -> FeatureDbResult<()> {
    for table in ["featuresets", "features", "styles", "attributes", "attribs_schema", "idx_features_geometry"] {
        let found: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE name = ?1",
                [table],
                |row| row.get(0),
            )
            .optional()
            .storage("inspect schema")?;
        if found.is_none() {
            return Err(featuredb_core::FeatureDbError::storage(format!(
                "database is missing table {}",
                table
            )));
        }
    }
    Ok(())
}
