//! # floe-lock
//!
//! Per-table exclusive locking for Floe.
//!
//! All commits against one table go through a single lock keyed by the
//! table's [`LockKey`](floe_common::LockKey). This crate provides:
//!
//! - **Lock contract**: the [`LockManager`] trait and the [`LockGuard`]
//!   scoped handle whose release is bound to its lifetime.
//!
//! - **Keyed lock manager**: [`TableLockManager`], an in-process, blocking,
//!   non-reentrant exclusive lock per key with FIFO hand-off and an optional
//!   acquisition timeout.
//!
//! # Example Usage
//!
//! ```rust
//! use floe_common::TableIdentity;
//! use floe_lock::{LockManager, TableLockManager};
//!
//! let locks = TableLockManager::new();
//! let key = TableIdentity::new("local", ["sales"], "orders").lock_key();
//!
//! {
//!     let _guard = locks.acquire(&key).unwrap();
//!     assert!(locks.is_locked(&key));
//! }
//! assert!(!locks.is_locked(&key));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Lock contract.
///
/// This module provides:
/// - [`lock::LockManager`]: Issues exclusive locks for keys
/// - [`lock::LockGuard`]: Scoped handle releasing its lock on drop
/// - [`lock::HeldLock`]: Implementation hook for lock managers
pub mod lock;

/// In-process keyed lock manager.
///
/// This module provides:
/// - [`manager::TableLockManager`]: Blocking exclusive locks per key
/// - [`manager::LockManagerConfig`]: Timeout configuration
/// - [`manager::LockStats`]: Acquisition statistics
/// - [`manager::LockStatsSnapshot`]: Plain copy of the statistics
pub mod manager;

// Re-export commonly used types

pub use lock::{HeldLock, LockGuard, LockManager};
pub use manager::{LockManagerConfig, LockStats, LockStatsSnapshot, TableLockManager};
