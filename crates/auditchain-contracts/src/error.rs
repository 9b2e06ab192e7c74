//! Error types for the audit chain.
//!
//! All fallible ledger operations return `ChainResult<T>`.  Integrity
//! violations are deliberately absent here: they are reported as data in a
//! `VerificationReport`.

use thiserror::Error;

/// The unified error type for the audit chain.
#[derive(Debug, Error)]
pub enum ChainError {
    /// An action, entity, or user identifier was empty, or metadata was not
    /// an object.
    #[error("invalid audit event: {reason}")]
    Validation { reason: String },

    /// The record store was unreachable or rejected the write.
    #[error("record store error: {reason}")]
    Storage { reason: String },

    /// Another writer appended between our tail read and our insert.
    ///
    /// The event was not recorded.
    #[error("chain append conflict at block {block_number}: {reason}")]
    ConcurrencyConflict { block_number: u64, reason: String },

    /// A store operation exceeded the configured timeout.
    ///
    /// The event was not recorded and is never retried with the stale tail.
    #[error("store operation '{operation}' timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A block or payload could not be encoded or decoded.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },
}

impl ChainError {
    pub fn storage(reason: impl Into<String>) -> Self {
        ChainError::Storage {
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        ChainError::Validation {
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        ChainError::Config {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the auditchain crates.
pub type ChainResult<T> = Result<T, ChainError>;
