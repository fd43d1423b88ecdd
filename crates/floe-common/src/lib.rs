//! # floe-common
//!
//! Common types, errors, and configuration for Floe.
//!
//! This crate provides the foundational types shared by every Floe
//! component:
//!
//! - **Types**: table identities, lock keys, idempotency keys and the
//!   retention branches they map to, branch conflict policies
//! - **Errors**: unified error handling with `FloeError`
//! - **Config**: ingestion configuration loaded from TOML
//! - **Constants**: durable naming contracts and defaults
//!
//! ## Example
//!
//! ```rust
//! use floe_common::types::{IdempotencyKey, TableIdentity};
//! use floe_common::error::FloeResult;
//!
//! fn example() -> FloeResult<()> {
//!     let table = TableIdentity::new("local", ["sales"], "orders");
//!     let key = IdempotencyKey::new("batch-0001")?;
//!     assert_eq!(key.branch_name(), "__peerdb-idem-batch-0001");
//!     assert_eq!(table.lock_key().table_name(), "orders");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{ErrorCode, ErrorKind, FloeError, FloeResult};
pub use types::{
    BranchOptions, ConflictPolicy, IdempotencyKey, LockKey, RetentionBranch, TableIdentifier,
    TableIdentity,
};
