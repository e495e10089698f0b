//! Error types for featuredb
//!
//! This module defines the error taxonomy shared by every store backend.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! "Not found" is deliberately absent: lookups and mutations addressed to an
//! unknown id return `None` / `false` instead of failing.

use std::io;
use thiserror::Error;

/// Result type alias for featuredb operations
pub type FeatureDbResult<T> = std::result::Result<T, FeatureDbError>;

/// Error types for the feature data store
#[derive(Debug, Error)]
pub enum FeatureDbError {
    /// Mutation attempted outside the store's modification capabilities,
    /// or against a read-only store
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation {
        /// Name of the rejected operation
        operation: String,
    },

    /// Operation attempted on a disposed store
    #[error("Data store not available: {0}")]
    NotAvailable(String),

    /// Corrupt or unresolvable encoded content
    #[error("Decode error: {0}")]
    Decode(String),

    /// Underlying storage engine failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Caller supplied an argument the store cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O error (configuration files, database directory)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FeatureDbError {
    /// Create an unsupported-operation error
    pub fn unsupported(operation: impl Into<String>) -> Self {
        FeatureDbError::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    /// Create a not-available error
    pub fn not_available(msg: impl Into<String>) -> Self {
        FeatureDbError::NotAvailable(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        FeatureDbError::Storage(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        FeatureDbError::Decode(msg.into())
    }

    /// Create an invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        FeatureDbError::InvalidArgument(msg.into())
    }

    /// Check if this error reports a capability violation
    pub fn is_unsupported(&self) -> bool {
        matches!(self, FeatureDbError::UnsupportedOperation { .. })
    }

    /// Check if this error reports a disposed store
    pub fn is_not_available(&self) -> bool {
        matches!(self, FeatureDbError::NotAvailable(_))
    }

    /// Check if this error originates in the storage engine
    pub fn is_storage(&self) -> bool {
        matches!(self, FeatureDbError::Storage(_) | FeatureDbError::Io(_))
    }
}
