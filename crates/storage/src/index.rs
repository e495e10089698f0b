//! Secondary indices for the in-memory backend
//!
//! Every hash index is a [`BucketIndex`]: key → set of ids. It backs
//! - names (lowercased) → feature ids
//! - geometry type → feature ids
//! - feature set name (lowercased) → feature set ids
//!
//! Empty buckets are dropped on removal so bucket counts stay usable as
//! planner estimates.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

/// Secondary index: key → ids
#[derive(Debug)]
pub struct BucketIndex<K, V> {
    index: FxHashMap<K, FxHashSet<V>>,
}

impl<K, V> Default for BucketIndex<K, V> {
    fn default() -> Self {
        Self {
            index: FxHashMap::default(),
        }
    }
}

impl<K: Hash + Eq, V: Hash + Eq + Copy> BucketIndex<K, V> {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` to the bucket for `key`, creating the bucket if needed
    pub fn insert(&mut self, key: K, id: V) {
        self.index.entry(key).or_default().insert(id);
    }

    /// Remove `id` from the bucket for `key`
    ///
    /// If the bucket becomes empty, removes the key entirely.
    pub fn remove(&mut self, key: &K, id: &V) {
        if let Some(ids) = self.index.get_mut(key) {
            ids.remove(id);
            if ids.is_empty() {
                self.index.remove(key);
            }
        }
    }

    /// Ids stored under `key`
    pub fn get(&self, key: &K) -> Option<&FxHashSet<V>> {
        self.index.get(key)
    }

    /// Size of the bucket for `key`
    pub fn bucket_len(&self, key: &K) -> usize {
        self.index.get(key).map_or(0, FxHashSet::len)
    }

    /// Every bucket
    pub fn iter(&self) -> impl Iterator<Item = (&K, &FxHashSet<V>)> {
        self.index.iter()
    }

    /// Drop every bucket
    pub fn clear(&mut self) {
        self.index.clear();
    }

    /// Check if the index is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Get the number of distinct keys in the index
    pub fn len(&self) -> usize {
        self.index.len()
    }
}

/// Case-insensitive index key of a name
pub fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}
