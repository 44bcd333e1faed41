//! Content signatures and the sidecar signature record
//!
//! Signatures are lowercase-hex SHA-256 digests. They serve change detection
//! and tamper evidence only; the digest format and string encoding are
//! persisted state and must stay stable across runs.
//!
//! A signature sidecar is a two-line text record:
//!
//! ```text
//! META:<digest of the serialized metadata bytes>
//! DATA:<digest of the decrypted original content bytes>
//! ```

use crate::error::{Result, SyncError};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Line prefix of the metadata digest
const META_PREFIX: &str = "META:";
/// Line prefix of the content digest
const DATA_PREFIX: &str = "DATA:";

/// Hash arbitrary bytes, returning a 64-character lowercase-hex digest
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash a file's content using buffered reads
///
/// Streams the file through the hasher in 8KB chunks so large files never
/// have to be held in memory just to compute their digest.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// The persisted two-line signature record of one file
///
/// `meta` covers the serialized metadata bytes; `data` covers the decrypted
/// original content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Digest of the serialized metadata bytes
    pub meta: String,
    /// Digest of the decrypted original content bytes
    pub data: String,
}

impl SignatureRecord {
    /// Build a record from the two digests
    pub fn new(meta: impl Into<String>, data: impl Into<String>) -> Self {
        SignatureRecord {
            meta: meta.into(),
            data: data.into(),
        }
    }

    /// Render the record in its persisted two-line form
    pub fn render(&self) -> String {
        format!("{}{}\n{}{}", META_PREFIX, self.meta, DATA_PREFIX, self.data)
    }

    /// Parse a record from its persisted form
    ///
    /// Tolerates trailing whitespace and a trailing newline, but both lines
    /// must be present and carry the expected prefixes.
    pub fn parse(text: &str) -> Result<Self> {
        let mut meta = None;
        let mut data = None;

        for line in text.lines() {
            let line = line.trim_end();
            if let Some(digest) = line.strip_prefix(META_PREFIX) {
                meta = Some(digest.to_string());
            } else if let Some(digest) = line.strip_prefix(DATA_PREFIX) {
                data = Some(digest.to_string());
            }
        }

        match (meta, data) {
            (Some(meta), Some(data)) => Ok(SignatureRecord { meta, data }),
            _ => Err(SyncError::SignatureRecord(format!(
                "expected '{}' and '{}' lines, got: {:?}",
                META_PREFIX, DATA_PREFIX, text
            ))),
        }
    }
}
