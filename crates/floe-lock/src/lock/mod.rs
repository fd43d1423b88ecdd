//! Lock contract shared by all lock manager implementations.
//!
//! A lock manager hands out a [`LockGuard`] per successful acquisition. The
//! guard releases the lock exactly once: either through an explicit
//! [`LockGuard::release`] or when it goes out of scope, whichever comes
//! first. Code holding a guard therefore cannot leak the lock on an early
//! return or a propagated error.

use std::fmt;
use std::time::{Duration, Instant};

use floe_common::{FloeResult, LockKey};
use tracing::debug;

/// Issues mutually exclusive locks for arbitrary keys.
///
/// Locks are not reentrant: acquiring a key that the calling thread already
/// holds blocks like any other contender.
pub trait LockManager: Send + Sync {
    /// Blocks until the lock for `key` is held by the caller.
    ///
    /// # Errors
    ///
    /// Implementations with a bounded wait return
    /// [`FloeError::LockTimeout`](floe_common::FloeError::LockTimeout) when
    /// the bound elapses.
    fn acquire(&self, key: &LockKey) -> FloeResult<LockGuard<'_>>;
}

/// A lock held on behalf of a [`LockGuard`].
pub trait HeldLock: Send {
    /// Gives the lock back to its manager.
    fn unlock(self: Box<Self>);
}

/// Scoped handle to an acquired lock.
pub struct LockGuard<'a> {
    key: LockKey,
    held: Option<Box<dyn HeldLock + 'a>>,
    acquired_at: Instant,
}

impl<'a> LockGuard<'a> {
    /// Wraps a freshly acquired lock.
    pub fn new(key: LockKey, held: Box<dyn HeldLock + 'a>) -> Self {
        Self {
            key,
            held: Some(held),
            acquired_at: Instant::now(),
        }
    }

    /// Returns the key this guard locks.
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Returns true until the lock has been released.
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Returns how long the lock has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Releases the lock.
    ///
    /// Returns false if it had already been released; calling this more
    /// than once is harmless.
    pub fn release(&mut self) -> bool {
        match self.held.take() {
            Some(held) => {
                held.unlock();
                debug!(
                    "Released lock on {} after {}ms",
                    self.key,
                    self.acquired_at.elapsed().as_millis()
                );
                true
            }
            None => false,
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("held", &self.is_held())
            .finish()
    }
}
