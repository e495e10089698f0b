//! SQLite persistent backend for featuredb
//!
//! This crate stores feature sets and features in a single SQLite file:
//!
//! - Schema: tables, the geometry R-tree and the triggers that maintain
//!   visibility and threshold versions
//! - Codecs: attribute sets, WKB geometry and styles as stored blobs
//! - SQL generation: planner output rendered as parameterized statements
//! - Store: [`SqliteFeatureDataStore`], the `FeatureDataStore` implementation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod connection;
pub mod error;
pub mod row;
pub mod schema;
pub mod sql;
pub mod store;

pub use codec::{AttributeSchema, CodecError, StyleCodec};
pub use store::SqliteFeatureDataStore;
