//! AND-chain of row predicates
//!
//! Predicates may borrow the index state they consult, so a chain lives no
//! longer than the read it was built for.

use std::fmt;

type Predicate<'a, T> = Box<dyn Fn(&T) -> bool + 'a>;

/// Conjunction of predicates evaluated in insertion order
pub struct FilterChain<'a, T> {
    predicates: Vec<(&'static str, Predicate<'a, T>)>,
}

impl<T> Default for FilterChain<'_, T> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }
}

impl<'a, T> FilterChain<'a, T> {
    /// Empty chain; accepts everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named predicate
    pub fn push<F>(&mut self, name: &'static str, predicate: F)
    where
        F: Fn(&T) -> bool + 'a,
    {
        self.predicates.push((name, Box::new(predicate)));
    }

    /// Check every predicate, stopping at the first rejection
    pub fn accept(&self, row: &T) -> bool {
        self.predicates.iter().all(|(_, p)| p(row))
    }

    /// Number of predicates
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Check whether the chain accepts everything
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl<T> fmt::Debug for FilterChain<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.predicates.iter().map(|(name, _)| name))
            .finish()
    }
}
