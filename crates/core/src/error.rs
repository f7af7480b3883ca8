//! Error types for tidepool
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! - **Usage**: the caller violated a precondition. Surfaced immediately.
//! - **Unsupported**: a feature the engine refuses to approximate
//!   (semver ranges, full-text filters).
//! - **Not found**: never an error. Lookups return `Option`.
//! - **Integrity**: malformed stored data is logged and skipped by the
//!   component that detects it; it does not appear here.

use crate::ids::ObjectId;
use std::io;
use thiserror::Error;

/// Result type alias for tidepool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tidepool
#[derive(Debug, Error)]
pub enum Error {
    /// Caller violated a precondition of the operation
    #[error("Usage error: {0}")]
    Usage(String),

    /// Feature is recognized but deliberately not supported
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Malformed DXN string
    #[error("Invalid DXN: {0}")]
    InvalidDxn(String),

    /// Malformed data path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Query produced no entries where at least one was required
    #[error("Query returned 0 entries")]
    NoResults,

    /// Mutation addressed to an object the store does not hold
    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// Internal post-condition failed
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (config files, exports)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Build a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// Build an unsupported-feature error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    /// Build an invariant violation
    pub fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }

    /// True for caller precondition violations
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }

    /// True for unsupported-feature errors
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
