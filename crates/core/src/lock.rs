//! Store-wide modify lock and content-change notification
//!
//! Every store owns one [`ModifyLock`]. It serializes mutations and any read
//! of index or version state, and is re-entrant so that a caller holding it
//! (for example during a bulk modification) may invoke ordinary store
//! methods from the same thread.
//!
//! Mutations call [`ModifyGuard::mark_changed`]. Listeners are notified once,
//! when the outermost guard on the lock is released. Nested guards, bulk or
//! not, only record the change.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use tracing::debug;

use crate::error::FeatureDbResult;

/// Receives content-changed notifications from a store
pub trait ContentListener: Send + Sync {
    /// Called after committed content changes, outside of bulk sessions
    fn on_content_changed(&self, uri: &str);
}

#[derive(Default)]
struct LockState {
    depth: Cell<u32>,
    bulk_depth: Cell<u32>,
    dirty: Cell<bool>,
}

/// Re-entrant single-writer lock with bulk tracking
pub struct ModifyLock {
    uri: String,
    state: ReentrantMutex<LockState>,
    listeners: Mutex<Vec<Arc<dyn ContentListener>>>,
}

impl ModifyLock {
    /// Create a lock for the store identified by `uri`
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            state: ReentrantMutex::new(LockState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Identity of the owning store
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Block until the lock is available
    pub fn acquire(&self, bulk: bool) -> ModifyGuard<'_> {
        ModifyGuard::enter(self, self.state.lock(), bulk)
    }

    /// Acquire without waiting; `None` if another thread holds the lock
    pub fn try_acquire(&self, bulk: bool) -> Option<ModifyGuard<'_>> {
        self.state
            .try_lock()
            .map(|guard| ModifyGuard::enter(self, guard, bulk))
    }

    /// Register a listener
    pub fn add_listener(&self, listener: Arc<dyn ContentListener>) {
        self.listeners.lock().push(listener);
    }

    /// Unregister a listener previously added
    pub fn remove_listener(&self, listener: &Arc<dyn ContentListener>) {
        self.listeners.lock().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn notify(&self) {
        let listeners: Vec<_> = self.listeners.lock().clone();
        debug!(target: "featuredb::store", uri = %self.uri, listeners = listeners.len(), "content changed");
        for listener in listeners {
            listener.on_content_changed(&self.uri);
        }
    }
}

impl fmt::Debug for ModifyLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifyLock").field("uri", &self.uri).finish()
    }
}

/// Holds the modify lock until dropped
pub struct ModifyGuard<'a> {
    lock: &'a ModifyLock,
    guard: Option<ReentrantMutexGuard<'a, LockState>>,
    bulk: bool,
}

impl<'a> ModifyGuard<'a> {
    fn enter(lock: &'a ModifyLock, guard: ReentrantMutexGuard<'a, LockState>, bulk: bool) -> Self {
        guard.depth.set(guard.depth.get() + 1);
        if bulk {
            guard.bulk_depth.set(guard.bulk_depth.get() + 1);
        }
        Self {
            lock,
            guard: Some(guard),
            bulk,
        }
    }

    /// Whether this guard was acquired for a bulk modification
    pub fn is_bulk(&self) -> bool {
        self.bulk
    }

    /// Whether any bulk guard is currently held on this lock
    pub fn in_bulk(&self) -> bool {
        self.guard
            .as_ref()
            .map_or(false, |g| g.bulk_depth.get() > 0)
    }

    /// Record that content changed under this guard
    pub fn mark_changed(&self) {
        if let Some(guard) = &self.guard {
            guard.dirty.set(true);
        }
    }
}

impl fmt::Debug for ModifyGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModifyGuard")
            .field("uri", &self.lock.uri)
            .field("bulk", &self.bulk)
            .finish()
    }
}

impl Drop for ModifyGuard<'_> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        if self.bulk {
            guard.bulk_depth.set(guard.bulk_depth.get().saturating_sub(1));
        }
        let depth = guard.depth.get().saturating_sub(1);
        guard.depth.set(depth);
        let notify = guard.dirty.get() && depth == 0;
        if notify {
            guard.dirty.set(false);
        }
        drop(guard);
        if notify {
            self.lock.notify();
        }
    }
}

/// An open bulk modification session
///
/// Holds a bulk [`ModifyGuard`]. [`commit`](Self::commit) ends the session
/// successfully; dropping it without committing ends it unsuccessfully,
/// which rolls back on backends that support rollback.
pub struct BulkModification<'a> {
    finish: Option<Box<dyn FnOnce(bool) -> FeatureDbResult<()> + 'a>>,
    guard: Option<ModifyGuard<'a>>,
}

impl<'a> BulkModification<'a> {
    /// Start a session; `finish` receives the success flag when it ends
    pub fn new<F>(guard: ModifyGuard<'a>, finish: F) -> Self
    where
        F: FnOnce(bool) -> FeatureDbResult<()> + 'a,
    {
        Self {
            finish: Some(Box::new(finish)),
            guard: Some(guard),
        }
    }

    /// End the session successfully
    pub fn commit(mut self) -> FeatureDbResult<()> {
        let result = match self.finish.take() {
            Some(finish) => finish(true),
            None => Ok(()),
        };
        self.guard.take();
        result
    }

    /// End the session unsuccessfully
    pub fn rollback(mut self) -> FeatureDbResult<()> {
        let result = match self.finish.take() {
            Some(finish) => finish(false),
            None => Ok(()),
        };
        self.guard.take();
        result
    }
}

impl fmt::Debug for BulkModification<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkModification")
            .field("guard", &self.guard)
            .field("finished", &self.finish.is_none())
            .finish()
    }
}

impl Drop for BulkModification<'_> {
    fn drop(&mut self) {
        if let Some(finish) = self.finish.take() {
            if let Err(e) = finish(false) {
                tracing::warn!(target: "featuredb::store", error = %e, "bulk modification rollback failed");
            }
        }
    }
}
