//! Core data types used throughout the syncvault library
//!
//! The types in this module represent:
//! - **Content model**: [`FileObject`], [`FileMetadata`], [`FileAttributes`] —
//!   a file's payload plus its descriptive metadata and signatures
//! - **Discovery**: [`DiscoveredObject`], [`ObjectKind`] — the minimal shape
//!   both directory discovery and destination listing produce, so ghost
//!   detection can operate backend-agnostically
//! - **Versioning**: [`ObjectVersion`] — one historical version of a stored
//!   object, as reported by a versioned backend
//! - **Run accounting**: [`SyncStats`], [`ProgressInfo`] — the per-run
//!   statistics record and the progress callback payload

use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Suffix appended to secured (encrypted) content objects
pub const ENCRYPTED_EXT: &str = ".encrypted";

/// Hidden sidecar directory mirroring the source tree
pub const HIVE_DIR: &str = ".syncvault";

/// Suffix of signature sidecar files inside the hive
pub const SIG_EXT: &str = ".sig";

/// Suffix of metadata sidecar files inside the hive
pub const META_EXT: &str = ".meta";

/// Attached-metadata key carrying the encrypted serialized metadata (base64)
pub const META_ENCRYPTED_KEY: &str = "metadata-encrypted";

/// Attached-metadata key carrying the metadata signature
pub const META_SIGNATURE_KEY: &str = "metadata-signature";

/// Attached-metadata key carrying the original-content signature
pub const ORIGINAL_SIGNATURE_KEY: &str = "original-signature";

/// OS-level attribute subset carried with each file
///
/// Only the attributes the engine can faithfully restore on every platform
/// are tracked; everything else is deliberately dropped at capture time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttributes {
    /// File is hidden (dot-prefixed on Unix, HIDDEN attribute on Windows)
    pub hidden: bool,
    /// File is read-only
    pub read_only: bool,
}

/// Descriptive metadata of one source file
///
/// Owned exclusively by the [`FileObject`] that references it and immutable
/// once serialized into a sidecar. The serialized form of this struct is what
/// the metadata signature covers, so field order and representation must stay
/// stable across runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Leaf file name, without the encrypted suffix
    pub name: String,
    /// Relative path rooted with a leading separator (e.g. `/docs/a.txt`)
    pub full_name: String,
    /// Hex digest of the decrypted content bytes, regardless of whether the
    /// object is currently stored encrypted
    pub original_signature: String,
    /// Last-write timestamp, truncated to second precision, local time zone
    pub last_write: DateTime<Local>,
    /// OS-level attribute subset
    pub attributes: FileAttributes,
}

impl FileMetadata {
    /// Build metadata for a file, truncating the timestamp to whole seconds
    pub fn new(
        name: impl Into<String>,
        full_name: impl Into<String>,
        last_write: DateTime<Local>,
        attributes: FileAttributes,
    ) -> Self {
        FileMetadata {
            name: name.into(),
            full_name: full_name.into(),
            original_signature: String::new(),
            last_write: truncate_to_seconds(last_write),
            attributes,
        }
    }
}

/// Truncate a timestamp to second precision
///
/// Sidecars and object stores only round-trip whole seconds reliably, so the
/// persisted form never carries sub-second components.
pub fn truncate_to_seconds(ts: DateTime<Local>) -> DateTime<Local> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// A file's payload plus its metadata and signatures
///
/// Constructed transiently per file per sync pass (or per restore call) and
/// discarded after the corresponding write or restore completes.
///
/// # Invariants
///
/// - `metadata_signature == signature(metadata_bytes)` holds after any
///   transform step; this is what makes metadata tamper-evident.
/// - `metadata.original_signature == signature(decrypted content bytes)`
///   regardless of whether the object is currently stored encrypted.
#[derive(Debug, Clone)]
pub struct FileObject {
    /// True when `content` and `metadata_bytes` are encrypted
    pub is_secured: bool,
    /// Raw content bytes (plaintext or ciphertext, per `is_secured`)
    pub content: Vec<u8>,
    /// Descriptive metadata
    pub metadata: FileMetadata,
    /// Serialized metadata bytes (possibly encrypted)
    pub metadata_bytes: Vec<u8>,
    /// Hex digest of `metadata_bytes`
    pub metadata_signature: String,
}

impl FileObject {
    /// Build a plaintext file object, computing both signatures
    ///
    /// Sets `metadata.original_signature` from `content`, serializes the
    /// metadata and signs the serialized bytes.
    pub fn plaintext(content: Vec<u8>, mut metadata: FileMetadata) -> crate::error::Result<Self> {
        metadata.original_signature = crate::signature::hash_bytes(&content);
        let metadata_bytes = serde_json::to_vec(&metadata)?;
        let metadata_signature = crate::signature::hash_bytes(&metadata_bytes);

        Ok(FileObject {
            is_secured: false,
            content,
            metadata,
            metadata_bytes,
            metadata_signature,
        })
    }
}

/// Kind of a discovered object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

/// Minimal shape of an enumerated object
///
/// Produced by both directory discovery (absolute paths) and destination
/// listing (relative paths rooted with a leading separator), so that ghost
/// detection can compare the two spaces without knowing the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredObject {
    /// Directory containing the object
    pub directory: String,
    /// Full path of the object
    pub full_name: String,
    /// File or directory
    pub kind: ObjectKind,
}

/// One historical version of a stored object
///
/// Returned by versioned backends ordered newest-first. The version
/// identifier is opaque to the engine; only the backend that produced it can
/// interpret it.
#[derive(Debug, Clone)]
pub struct ObjectVersion {
    /// Creation time of this version
    pub created: DateTime<Local>,
    /// Display name of the object (typically carries the encrypted suffix)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Backend storage-class label
    pub storage_class: String,
    /// Opaque backend-specific version identifier
    pub version_id: String,
    /// Human-readable confirmation questions that must all be answered
    /// affirmatively before this version may be restored (e.g. undeleting a
    /// soft-deleted object)
    pub questions: Vec<String>,
}

/// Running statistics for one engine invocation
///
/// Every phase reports into the same record; the engine surfaces it once at
/// the end of the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Files visited by discovery
    pub scanned: usize,
    /// Files transformed and written to the destination
    pub synchronized: usize,
    /// Files skipped because nothing changed
    pub ignored: usize,
    /// Recoverable per-object failures across all phases
    pub errors: usize,
    /// Destination objects and sidecar artifacts deleted
    pub deleted: usize,
    /// Bytes read from the source
    pub bytes_read: u64,
    /// Bytes written to the destination
    pub bytes_written: u64,
}

impl SyncStats {
    /// True when at least one recoverable failure occurred
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Progress callback for long-running phases
pub type ProgressCallback = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// Information passed to progress callbacks
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Items processed so far
    pub processed: usize,
    /// Total items to process
    pub total: usize,
    /// Path currently being processed
    pub current: Option<String>,
}

impl ProgressInfo {
    /// Get progress as a percentage (0-100)
    pub fn percentage(&self) -> Option<f32> {
        if self.total > 0 {
            Some((self.processed as f32 / self.total as f32) * 100.0)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_to_seconds() {
        let ts = Local.with_ymd_and_hms(2024, 3, 1, 10, 20, 30).unwrap()
            + chrono::Duration::milliseconds(250);
        let truncated = truncate_to_seconds(ts);
        assert_eq!(truncated.nanosecond(), 0);
        assert_eq!(truncated.second(), 30);
    }

    #[test]
    fn test_plaintext_object_signatures() {
        let metadata = FileMetadata::new(
            "a.txt",
            "/a.txt",
            Local::now(),
            FileAttributes::default(),
        );
        let fo = FileObject::plaintext(b"hello".to_vec(), metadata).unwrap();

        assert!(!fo.is_secured);
        assert_eq!(
            fo.metadata.original_signature,
            crate::signature::hash_bytes(b"hello")
        );
        assert_eq!(
            fo.metadata_signature,
            crate::signature::hash_bytes(&fo.metadata_bytes)
        );
    }

    #[test]
    fn test_progress_percentage() {
        let info = ProgressInfo {
            processed: 50,
            total: 100,
            current: None,
        };
        assert_eq!(info.percentage(), Some(50.0));

        let empty = ProgressInfo {
            processed: 0,
            total: 0,
            current: None,
        };
        assert_eq!(empty.percentage(), None);
    }
}
