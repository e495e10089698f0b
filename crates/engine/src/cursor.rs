//! Cursor combinators
//!
//! - [`MergeCursor`]: ordered k-way merge of sub-cursors that are each
//!   already sorted under the same keys
//! - [`paginate`]: brute-force offset/limit over any cursor, used when no
//!   single source can paginate natively

use std::sync::Arc;

use featuredb_core::{Cursor, Order};

use crate::ordering::SortKey;

/// A sorted stream of keyed rows
pub type KeyedSource<T> = Box<dyn Iterator<Item = (SortKey, T)> + Send>;

/// Ordered merge of sorted sources
///
/// Each call to `next` compares the head of every source and yields the
/// smallest, so the output is sorted whenever each source is.
pub struct MergeCursor<T> {
    orders: Arc<[Order]>,
    sources: Vec<KeyedSource<T>>,
    heads: Vec<Option<(SortKey, T)>>,
    primed: bool,
}

impl<T> MergeCursor<T> {
    /// Merge `sources` under `orders`
    pub fn new(orders: Vec<Order>, sources: Vec<KeyedSource<T>>) -> Self {
        let heads = sources.iter().map(|_| None).collect();
        Self {
            orders: orders.into(),
            sources,
            heads,
            primed: false,
        }
    }

    fn prime(&mut self) {
        for (head, source) in self.heads.iter_mut().zip(self.sources.iter_mut()) {
            *head = source.next();
        }
        self.primed = true;
    }
}

impl<T> Iterator for MergeCursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if !self.primed {
            self.prime();
        }
        let mut best: Option<usize> = None;
        for (idx, head) in self.heads.iter().enumerate() {
            let Some((key, _)) = head else { continue };
            best = match best {
                Some(b) => {
                    let (best_key, _) = self.heads[b].as_ref()?;
                    if key.compare(best_key, &self.orders).is_lt() {
                        Some(idx)
                    } else {
                        Some(b)
                    }
                }
                None => Some(idx),
            };
        }
        let idx = best?;
        let next = self.sources[idx].next();
        let (_, item) = std::mem::replace(&mut self.heads[idx], next)?;
        Some(item)
    }
}

/// Skip `offset` rows then yield at most `limit` (0 = unlimited)
pub fn paginate<T: Send + 'static>(cursor: Cursor<T>, offset: usize, limit: usize) -> Cursor<T> {
    if offset == 0 && limit == 0 {
        return cursor;
    }
    let limit = if limit == 0 { usize::MAX } else { limit };
    Cursor::new(cursor.skip(offset).take(limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(rows: Vec<(i64, &'static str)>) -> KeyedSource<i64> {
        Box::new(rows.into_iter().map(|(id, name)| {
            (
                SortKey {
                    id,
                    name: Some(name.to_string()),
                    distances: vec![],
                    max_lod: 0,
                },
                id,
            )
        }))
    }

    #[test]
    fn test_merge_by_name() {
        let a = source(vec![(1, "alpha"), (4, "delta")]);
        let b = source(vec![(3, "bravo"), (2, "charlie"), (5, "echo")]);
        let merged: Vec<i64> = MergeCursor::new(vec![Order::FeatureName], vec![a, b]).collect();
        assert_eq!(merged, vec![1, 3, 2, 4, 5]);
    }

    #[test]
    fn test_merge_empty_sources() {
        let merged: Vec<i64> =
            MergeCursor::new(vec![], vec![source(vec![]), source(vec![(1, "x")])]).collect();
        assert_eq!(merged, vec![1]);
        assert_eq!(MergeCursor::<i64>::new(vec![], vec![]).count(), 0);
    }

    #[test]
    fn test_paginate() {
        let rows: Vec<i32> = paginate(Cursor::from_vec(vec![1, 2, 3, 4]), 1, 2).collect();
        assert_eq!(rows, vec![2, 3]);
        let rows: Vec<i32> = paginate(Cursor::from_vec(vec![1, 2, 3]), 2, 0).collect();
        assert_eq!(rows, vec![3]);
    }
}
