//! Error handling for Floe.
//!
//! This module provides a unified error type and result alias used
//! across all Floe components.

mod floe;

pub use floe::{ErrorCode, ErrorKind, FloeError};

/// Result type alias for Floe operations.
pub type FloeResult<T> = std::result::Result<T, FloeError>;
