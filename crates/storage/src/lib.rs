//! In-memory backend for featuredb
//!
//! This crate implements the volatile feature store with:
//! - Quadtree: envelope index over the canonical world bounds
//! - BucketIndex: hash indices for names, geometry types and set names
//! - MemoryFeatureDataStore: the `FeatureDataStore` implementation
//!
//! Queries go through the shared planner with estimates taken from index
//! sizes, so results match the persistent backend row for row.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod quadtree;
pub mod store;

pub use index::BucketIndex;
pub use quadtree::Quadtree;
pub use store::MemoryFeatureDataStore;
