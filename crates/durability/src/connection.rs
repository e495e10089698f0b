//! Connection setup: pragmas and SQL functions
//!
//! Every connection gets the `[sqlite]` pragmas from the store config and the
//! scalar function `fdb_distance(geometry, lng, lat)`, which returns the
//! great-circle distance in meters from a point to a WKB geometry (`+inf`
//! for NULL or undecodable geometry). Distance filters and distance ordering
//! use it, so SQL and the in-memory backend compute identical values.

use std::path::Path;

use featuredb_core::geometry::distance_to_geometry;
use featuredb_core::FeatureDbResult;
use featuredb_engine::SqliteConfig;
use geo_types::Point;
use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;
use tracing::debug;

use crate::codec::wkb;
use crate::error::StorageResultExt;

/// Name of the registered distance function
pub const DISTANCE_FUNCTION: &str = "fdb_distance";

/// Open (creating if needed) a database file and configure it
pub fn open_connection(path: &Path, config: &SqliteConfig) -> FeatureDbResult<Connection> {
    let conn = Connection::open(path).storage("open database")?;
    configure_connection(&conn, config)?;
    Ok(conn)
}

/// Apply pragmas and register SQL functions
pub fn configure_connection(conn: &Connection, config: &SqliteConfig) -> FeatureDbResult<()> {
    let journal_mode: String = conn
        .pragma_update_and_check(None, "journal_mode", &config.journal_mode, |row| row.get(0))
        .storage("set journal_mode")?;
    conn.pragma_update(None, "synchronous", &config.synchronous)
        .storage("set synchronous")?;
    // negative cache_size is in KiB
    conn.pragma_update(None, "cache_size", -i64::from(config.cache_size_kib))
        .storage("set cache_size")?;
    conn.pragma_update(None, "recursive_triggers", false)
        .storage("set recursive_triggers")?;
    register_functions(conn)?;
    debug!(
        target: "featuredb::sqlite",
        journal_mode = %journal_mode,
        synchronous = %config.synchronous,
        cache_size_kib = config.cache_size_kib,
        "configured connection"
    );
    Ok(())
}

fn register_functions(conn: &Connection) -> FeatureDbResult<()> {
    conn.create_scalar_function(
        DISTANCE_FUNCTION,
        3,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let blob: Option<Vec<u8>> = ctx.get(0)?;
            let lng: f64 = ctx.get(1)?;
            let lat: f64 = ctx.get(2)?;
            Ok(blob
                .and_then(|bytes| wkb::decode(&bytes).ok())
                .map_or(f64::INFINITY, |geometry| {
                    distance_to_geometry(Point::new(lng, lat), &geometry)
                }))
        },
    )
    .storage("register fdb_distance")
}
