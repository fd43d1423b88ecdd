//! In-process keyed lock manager.
//!
//! [`TableLockManager`] keeps one exclusive lock per [`LockKey`]. Contenders
//! for a busy key queue up and are granted the lock in arrival order when
//! the holder releases it. Keys are independent: holding one never delays
//! an acquisition of another.
//!
//! # Waiting
//!
//! Without a configured timeout a contender waits for as long as the holder
//! keeps the lock. A holder that never releases (a stuck peer) therefore
//! blocks every later writer of that table indefinitely. Configure
//! [`LockManagerConfig::acquire_timeout`] to bound the wait.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use floe_common::{FloeError, FloeResult, LockKey};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::lock::{HeldLock, LockGuard, LockManager};

/// Identifies one acquisition attempt.
type LockToken = u64;

/// State of one key's lock.
#[derive(Debug, Default)]
struct LockEntry {
    /// Acquisition currently holding the lock.
    holder: Option<LockToken>,
    /// Acquisitions waiting, oldest first.
    wait_queue: VecDeque<LockToken>,
}

impl LockEntry {
    /// Checks whether `token` may take the lock now.
    fn can_grant(&self, token: LockToken) -> bool {
        self.holder.is_none()
            && self
                .wait_queue
                .front()
                .map_or(true, |front| *front == token)
    }

    /// Returns true if nobody holds or waits for the lock.
    fn is_free(&self) -> bool {
        self.holder.is_none() && self.wait_queue.is_empty()
    }
}

/// Statistics about the lock manager.
#[derive(Debug, Default)]
pub struct LockStats {
    /// Total lock acquisitions.
    pub acquisitions: AtomicU64,
    /// Total lock releases.
    pub releases: AtomicU64,
    /// Total acquisitions that had to wait.
    pub waits: AtomicU64,
    /// Total timeouts.
    pub timeouts: AtomicU64,
}

impl LockStats {
    /// Creates new stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful acquisition.
    pub fn record_acquisition(&self) {
        self.acquisitions.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a release.
    pub fn record_release(&self) {
        self.releases.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a wait.
    pub fn record_wait(&self) {
        self.waits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records a timeout.
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Returns the current counter values.
    pub fn snapshot(&self) -> LockStatsSnapshot {
        LockStatsSnapshot {
            acquisitions: self.acquisitions.load(AtomicOrdering::Relaxed),
            releases: self.releases.load(AtomicOrdering::Relaxed),
            waits: self.waits.load(AtomicOrdering::Relaxed),
            timeouts: self.timeouts.load(AtomicOrdering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LockStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStatsSnapshot {
    /// Total lock acquisitions.
    pub acquisitions: u64,
    /// Total lock releases.
    pub releases: u64,
    /// Total acquisitions that had to wait.
    pub waits: u64,
    /// Total timeouts.
    pub timeouts: u64,
}

/// Configuration for the lock manager.
#[derive(Debug, Clone, Default)]
pub struct LockManagerConfig {
    /// Maximum time [`LockManager::acquire`] waits; `None` waits forever.
    pub acquire_timeout: Option<Duration>,
}

impl From<&floe_common::config::LockConfig> for LockManagerConfig {
    fn from(config: &floe_common::config::LockConfig) -> Self {
        Self {
            acquire_timeout: config.acquire_timeout,
        }
    }
}

/// Blocking, non-reentrant exclusive locks keyed by [`LockKey`].
pub struct TableLockManager {
    /// Lock state per key; entries are dropped once free.
    locks: Mutex<HashMap<LockKey, LockEntry>>,
    /// Signalled whenever a lock is released or a waiter gives up.
    released: Condvar,
    /// Next acquisition token.
    next_token: AtomicU64,
    /// Configuration.
    config: LockManagerConfig,
    /// Statistics.
    stats: LockStats,
}

impl TableLockManager {
    /// Creates a lock manager that waits indefinitely.
    pub fn new() -> Self {
        Self::with_config(LockManagerConfig::default())
    }

    /// Creates a lock manager with custom configuration.
    pub fn with_config(config: LockManagerConfig) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            next_token: AtomicU64::new(1),
            config,
            stats: LockStats::new(),
        }
    }

    /// Acquires the lock for `key`, waiting at most `timeout` when given.
    ///
    /// # Errors
    ///
    /// Returns [`FloeError::LockTimeout`] if the lock was not granted within
    /// `timeout`. The caller's place in the queue is given up.
    pub fn lock(&self, key: &LockKey, timeout: Option<Duration>) -> FloeResult<LockGuard<'_>> {
        let token = self.next_token.fetch_add(1, AtomicOrdering::Relaxed);
        let start = Instant::now();
        let deadline = timeout.map(|t| start + t);

        let mut locks = self.locks.lock();
        let entry = locks.entry(key.clone()).or_default();

        if entry.is_free() {
            entry.holder = Some(token);
            self.stats.record_acquisition();
            return Ok(self.guard(key, token));
        }

        entry.wait_queue.push_back(token);
        self.stats.record_wait();
        debug!("Waiting for lock on {}", key);

        loop {
            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(&mut locks, deadline).timed_out(),
                None => {
                    self.released.wait(&mut locks);
                    false
                }
            };

            let Some(entry) = locks.get_mut(key) else {
                return Err(FloeError::internal(format!(
                    "lock entry for {key} vanished while a waiter was queued"
                )));
            };

            if entry.can_grant(token) {
                entry.wait_queue.pop_front();
                entry.holder = Some(token);
                self.stats.record_acquisition();
                debug!(
                    "Acquired lock on {} after waiting {}ms",
                    key,
                    start.elapsed().as_millis()
                );
                return Ok(self.guard(key, token));
            }

            if timed_out {
                entry.wait_queue.retain(|waiting| *waiting != token);
                if entry.is_free() {
                    locks.remove(key);
                }
                drop(locks);

                // The next waiter may now be at the front of the queue.
                self.released.notify_all();
                self.stats.record_timeout();

                let waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                warn!("Timed out after {}ms waiting for lock on {}", waited_ms, key);
                return Err(FloeError::LockTimeout {
                    key: key.to_string(),
                    waited_ms,
                });
            }
        }
    }

    /// Tries to acquire the lock for `key` without waiting.
    pub fn try_lock(&self, key: &LockKey) -> Option<LockGuard<'_>> {
        let token = self.next_token.fetch_add(1, AtomicOrdering::Relaxed);
        let mut locks = self.locks.lock();
        let entry = locks.entry(key.clone()).or_default();

        if entry.is_free() {
            entry.holder = Some(token);
            self.stats.record_acquisition();
            Some(self.guard(key, token))
        } else {
            None
        }
    }

    /// Releases the lock for `key` if `token` holds it.
    fn unlock(&self, key: &LockKey, token: LockToken) -> bool {
        let mut locks = self.locks.lock();

        let Some(entry) = locks.get_mut(key) else {
            return false;
        };
        if entry.holder != Some(token) {
            return false;
        }

        entry.holder = None;
        if entry.is_free() {
            locks.remove(key);
        }
        drop(locks);

        self.stats.record_release();
        // Waiters for every key share one condvar; each re-checks its own entry.
        self.released.notify_all();
        true
    }

    fn guard(&self, key: &LockKey, token: LockToken) -> LockGuard<'_> {
        LockGuard::new(
            key.clone(),
            Box::new(TableLock {
                manager: self,
                key: key.clone(),
                token,
            }),
        )
    }

    /// Returns true if `key` is currently held.
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.locks
            .lock()
            .get(key)
            .map_or(false, |entry| entry.holder.is_some())
    }

    /// Returns the number of acquisitions waiting for `key`.
    pub fn waiting(&self, key: &LockKey) -> usize {
        self.locks
            .lock()
            .get(key)
            .map_or(0, |entry| entry.wait_queue.len())
    }

    /// Returns the number of keys that are held or waited for.
    pub fn lock_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LockManagerConfig {
        &self.config
    }

    /// Returns statistics about the lock manager.
    pub fn stats(&self) -> &LockStats {
        &self.stats
    }
}

impl LockManager for TableLockManager {
    fn acquire(&self, key: &LockKey) -> FloeResult<LockGuard<'_>> {
        self.lock(key, self.config.acquire_timeout)
    }
}

impl Default for TableLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TableLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableLockManager")
            .field("lock_count", &self.lock_count())
            .field("config", &self.config)
            .finish()
    }
}

/// Lock held through a [`TableLockManager`].
struct TableLock<'a> {
    manager: &'a TableLockManager,
    key: LockKey,
    token: LockToken,
}

impl HeldLock for TableLock<'_> {
    fn unlock(self: Box<Self>) {
        self.manager.unlock(&self.key, self.token);
    }
}
