//! Core types for Floe.
//!
//! This module contains the identity and naming types shared between the
//! coordinators, the lock manager, and the table store.

mod branch;
mod idempotency;
mod table;

pub use branch::{BranchOptions, ConflictPolicy};
pub use idempotency::{IdempotencyKey, RetentionBranch};
pub use table::{LockKey, TableIdentifier, TableIdentity};
