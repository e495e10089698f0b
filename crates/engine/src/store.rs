//! Lifecycle, locking and capability gating shared by store backends
//!
//! Every backend embeds a [`StoreBase`]. It owns the store's
//! [`ModifyLock`], tracks the `Open` → `Disposed` transition and checks
//! modification and visibility capabilities before a mutation touches any
//! state.

use std::sync::atomic::{AtomicBool, Ordering};

use featuredb_core::{
    FeatureDbError, FeatureDbResult, ModificationFlags, ModifyGuard, ModifyLock, VisibilityFlags,
};
use tracing::info;

/// Shared state of a store instance
#[derive(Debug)]
pub struct StoreBase {
    lock: ModifyLock,
    disposed: AtomicBool,
    modification_flags: ModificationFlags,
    visibility_flags: VisibilityFlags,
}

impl StoreBase {
    /// Open store state with the given capabilities
    pub fn new(
        uri: impl Into<String>,
        modification_flags: ModificationFlags,
        visibility_flags: VisibilityFlags,
    ) -> Self {
        Self {
            lock: ModifyLock::new(uri),
            disposed: AtomicBool::new(false),
            modification_flags,
            visibility_flags,
        }
    }

    /// Identity of the store
    pub fn uri(&self) -> &str {
        self.lock.uri()
    }

    /// The store's modify lock
    pub fn modify_lock(&self) -> &ModifyLock {
        &self.lock
    }

    /// Accepted modifications
    pub fn modification_flags(&self) -> ModificationFlags {
        self.modification_flags
    }

    /// Accepted visibility settings
    pub fn visibility_flags(&self) -> VisibilityFlags {
        self.visibility_flags
    }

    /// Fail with not-available once disposed
    pub fn check_open(&self) -> FeatureDbResult<()> {
        if self.disposed.load(Ordering::Acquire) {
            Err(FeatureDbError::not_available(format!(
                "data store {} has been disposed",
                self.uri()
            )))
        } else {
            Ok(())
        }
    }

    /// Acquire the modify lock on an open store
    pub fn lock(&self) -> FeatureDbResult<ModifyGuard<'_>> {
        self.check_open()?;
        let guard = self.lock.acquire(false);
        self.check_open()?;
        Ok(guard)
    }

    /// Check open state and `required`, then take the modify lock
    pub fn modify(
        &self,
        required: ModificationFlags,
        operation: &str,
    ) -> FeatureDbResult<ModifyGuard<'_>> {
        self.check_open()?;
        self.check_modify(required, operation)?;
        self.lock()
    }

    /// Check open state and the visibility capability, then take the lock
    pub fn modify_visibility(
        &self,
        required: VisibilityFlags,
        operation: &str,
    ) -> FeatureDbResult<ModifyGuard<'_>> {
        self.check_open()?;
        self.check_visibility(required, operation)?;
        self.lock()
    }

    /// Blocking acquire with explicit bulk intent
    pub fn acquire(&self, bulk: bool) -> FeatureDbResult<ModifyGuard<'_>> {
        self.check_open()?;
        if bulk {
            self.check_modify(ModificationFlags::BULK_MODIFICATIONS, "bulk modification")?;
        }
        let guard = self.lock.acquire(bulk);
        self.check_open()?;
        Ok(guard)
    }

    /// Best-effort acquire; `Ok(None)` when another thread holds the lock
    pub fn try_acquire(&self, bulk: bool) -> FeatureDbResult<Option<ModifyGuard<'_>>> {
        self.check_open()?;
        if bulk {
            self.check_modify(ModificationFlags::BULK_MODIFICATIONS, "bulk modification")?;
        }
        Ok(self.lock.try_acquire(bulk))
    }

    /// Fail with unsupported-operation unless every bit of `required` is set
    pub fn check_modify(&self, required: ModificationFlags, operation: &str) -> FeatureDbResult<()> {
        if self.modification_flags.contains(required) {
            Ok(())
        } else {
            Err(FeatureDbError::unsupported(operation))
        }
    }

    /// Fail with unsupported-operation unless every bit of `required` is set
    pub fn check_visibility(&self, required: VisibilityFlags, operation: &str) -> FeatureDbResult<()> {
        if self.visibility_flags.contains(required) {
            Ok(())
        } else {
            Err(FeatureDbError::unsupported(operation))
        }
    }

    /// Transition to `Disposed`; returns `false` if already disposed
    ///
    /// Waits for in-flight operations holding the modify lock.
    pub fn dispose(&self) -> bool {
        let _guard = self.lock.acquire(false);
        let first = !self.disposed.swap(true, Ordering::AcqRel);
        if first {
            info!(target: "featuredb::store", uri = %self.uri(), "data store disposed");
        }
        first
    }

    /// Check whether the store has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}
