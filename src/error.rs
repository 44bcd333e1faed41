//! Error types for the syncvault library
//!
//! The taxonomy mirrors how errors are actually handled at runtime:
//!
//! - [`SyncError::Configuration`] — a missing or invalid mandatory setting,
//!   raised before the engine starts and always fatal.
//! - [`SyncError::Integrity`] — a signature mismatch detected while
//!   unsecuring an object; the object is skipped and the run continues.
//! - [`SyncError::Backend`] — a storage operation failed. Wherever the
//!   repository contract defines a boolean outcome (write, delete,
//!   metadata match) the failure is folded into the error counter instead
//!   of propagating.
//! - [`SyncError::NotFound`] — an object or version is absent; callers
//!   receive an empty result rather than a panic or an abort.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the syncvault library
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for all syncvault operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Missing or invalid mandatory configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Signature mismatch detected while verifying a secured object
    #[error("Integrity failure for {object}: {field} signature mismatch - expected: {expected}, actual: {actual}")]
    Integrity {
        /// Relative path of the object that failed verification
        object: String,
        /// Which signature failed ("metadata" or "content")
        field: &'static str,
        /// Expected digest carried with the object
        expected: String,
        /// Digest recomputed from the decrypted bytes
        actual: String,
    },

    /// A storage backend operation failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Object or version absent from the repository
    #[error("Not found: {0}")]
    NotFound(String),

    /// Encryption or decryption failure
    ///
    /// GCM authenticates every ciphertext, so a decryption failure on stored
    /// data usually means tampering; the object is skipped like an integrity
    /// failure.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Key file missing or malformed
    #[error("Invalid key file {path:?}: {reason}")]
    KeyFile {
        /// Path of the offending key file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// Malformed signature sidecar record
    #[error("Invalid signature record: {0}")]
    SignatureRecord(String),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error")]
    WalkDir(#[from] walkdir::Error),

    /// Path conversion error
    #[error("Path conversion error: {0:?}")]
    PathConversion(PathBuf),

    /// The caller declined a confirmation question during restore
    #[error("Restore aborted: {0}")]
    RestoreDeclined(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a configuration error with a custom message
    pub fn configuration(msg: impl Into<String>) -> Self {
        SyncError::Configuration(msg.into())
    }

    /// Create a backend error with a custom message
    pub fn backend(msg: impl Into<String>) -> Self {
        SyncError::Backend(msg.into())
    }

    /// Create a crypto error with a custom message
    pub fn crypto(msg: impl Into<String>) -> Self {
        SyncError::Crypto(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        SyncError::Internal(msg.into())
    }

    /// Check if this error is recoverable within a running phase
    ///
    /// Recoverable errors are reported per-object and reflected in the
    /// end-of-run statistics; they never abort a phase on their own.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::Integrity { .. }
                | SyncError::Backend(_)
                | SyncError::NotFound(_)
                | SyncError::Crypto(_)
        )
    }

    /// Check if this error indicates tampering or corruption
    pub fn is_integrity(&self) -> bool {
        matches!(self, SyncError::Integrity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::NotFound("photos/cat.jpg".to_string());
        assert_eq!(err.to_string(), "Not found: photos/cat.jpg");
    }

    #[test]
    fn test_error_recoverable() {
        assert!(SyncError::Backend("upload failed".to_string()).is_recoverable());
        assert!(!SyncError::Configuration("missing path".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_integrity() {
        let err = SyncError::Integrity {
            object: "/a.txt".to_string(),
            field: "content",
            expected: "abc".to_string(),
            actual: "def".to_string(),
        };
        assert!(err.is_integrity());
        assert!(err.is_recoverable());
        assert!(!SyncError::Internal("boom".to_string()).is_integrity());
    }
}
