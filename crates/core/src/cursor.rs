//! Forward-only result cursors
//!
//! A [`Cursor`] is a lazy iterator over query results that owns whatever the
//! backend needs to produce them. Resources are released by [`Cursor::close`]
//! or, on every other exit path, when the cursor is dropped. A closed cursor
//! yields nothing.

use std::fmt;

/// Lazy, closable, forward-only sequence of query results
pub struct Cursor<T> {
    inner: Option<Box<dyn Iterator<Item = T> + Send>>,
}

impl<T> Cursor<T> {
    /// Wrap an iterator
    pub fn new<I>(iter: I) -> Self
    where
        I: Iterator<Item = T> + Send + 'static,
    {
        Self {
            inner: Some(Box::new(iter)),
        }
    }

    /// Cursor with no rows
    pub fn empty() -> Self {
        Self { inner: None }
    }

    /// Release the underlying resources; further reads yield nothing
    pub fn close(&mut self) {
        self.inner = None;
    }

    /// Check if the cursor has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl<T: Send + 'static> Cursor<T> {
    /// Cursor over already materialized rows
    pub fn from_vec(rows: Vec<T>) -> Self {
        Self::new(rows.into_iter())
    }
}

impl<T> Iterator for Cursor<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let next = self.inner.as_mut()?.next();
        if next.is_none() {
            self.inner = None;
        }
        next
    }
}

impl<T> fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("closed", &self.is_closed())
            .finish()
    }
}
