//! Query engine shared by featuredb backends
//!
//! This crate holds everything the backends have in common:
//! - QueryPlanner: cost-based driver selection over backend estimates
//! - VisibilityTracker: baseline plus deviation-set visibility model
//! - SortKey / MergeCursor / paginate: ordering and pagination
//! - FilterChain: residual predicate evaluation
//! - StoreBase: lifecycle, modify lock and capability checks
//! - FeatureDbConfig: `featuredb.toml` handling

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cursor;
pub mod filter;
pub mod ordering;
pub mod planner;
pub mod store;
pub mod visibility;

pub use config::{BackendKind, FeatureDbConfig, MemoryConfig, QueryConfig, SqliteConfig, CONFIG_FILE_NAME};
pub use cursor::{paginate, KeyedSource, MergeCursor};
pub use filter::FilterChain;
pub use ordering::{compare_names, SortKey};
pub use planner::{Dimension, QueryPlan, QueryPlanner, SelectivityEstimator};
pub use store::StoreBase;
pub use visibility::{VisibilityChange, VisibilityTracker};
