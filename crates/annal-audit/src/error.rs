//! Audit-related error types.

use annal_crypto::CryptoError;
use annal_storage::StorageError;
use thiserror::Error;

/// Errors that can occur with audit logging.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Settings are inconsistent, e.g. signing enabled without a secret.
    #[error("audit configuration error: {0}")]
    Configuration(String),

    /// The record could not be read or persisted.
    #[error("audit storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Hashing or signing failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A verified chain is broken. Only produced by verification.
    #[error("chain integrity violation at record {record_id}: {reason}")]
    IntegrityViolation {
        /// The first record where the violation was detected.
        record_id: u64,
        /// Why the chain is invalid.
        reason: String,
    },

    /// Reading or writing an export failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
