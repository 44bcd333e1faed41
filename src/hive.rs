//! The hive: an addressable sidecar namespace keyed by relative path
//!
//! Per-file signatures (and, for secured objects, encrypted metadata copies)
//! are the only state the engine itself persists. Rather than hard-coding
//! folder-name conventions throughout the engine, the hive is modeled as a
//! key-value namespace: get/put/delete a signature record or a metadata blob
//! for a rooted relative key like `/docs/report.txt`.
//!
//! [`FsHive`] is the real implementation — a hidden directory mirroring the
//! content tree, with `.sig` and `.meta`/`.meta.encrypted` suffixes
//! distinguishing the sidecar kinds. [`MemoryHive`] is the in-memory fake
//! used by tests.

use crate::error::Result;
use crate::signature::SignatureRecord;
use crate::types::{ENCRYPTED_EXT, HIVE_DIR, META_EXT, SIG_EXT};
use crate::utils;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Sidecar namespace contract
pub trait SignatureStore: Send + Sync {
    /// Load the signature record for a key, `None` when absent
    fn signature(&self, key: &str) -> Result<Option<SignatureRecord>>;

    /// Persist (create or overwrite) the signature record for a key
    fn put_signature(&self, key: &str, record: &SignatureRecord) -> Result<()>;

    /// Remove the signature record for a key, if present
    fn delete_signature(&self, key: &str) -> Result<()>;

    /// When the signature record for a key was last written
    ///
    /// This is what the dirty-flag check level compares the source file's
    /// mtime against; rewriting the record is what clears the flag.
    fn signature_mtime(&self, key: &str) -> Result<Option<SystemTime>>;

    /// Load the metadata sidecar for a key, `None` when absent
    fn metadata(&self, key: &str, secured: bool) -> Result<Option<Vec<u8>>>;

    /// Persist the metadata sidecar for a key
    fn put_metadata(&self, key: &str, bytes: &[u8], secured: bool) -> Result<()>;

    /// Remove both the plaintext and encrypted metadata sidecars for a key
    fn delete_metadata(&self, key: &str) -> Result<()>;
}

/// Filesystem-backed hive: a hidden mirror tree under the repository root
pub struct FsHive {
    root: PathBuf,
}

impl FsHive {
    /// Open (without creating) the hive of a repository root
    pub fn new(repository_root: &Path) -> Self {
        FsHive {
            root: repository_root.join(HIVE_DIR),
        }
    }

    /// The hive directory itself
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path of the signature sidecar for a key
    pub fn signature_path(&self, key: &str) -> PathBuf {
        let mut path = utils::key_to_path(&self.root, key).into_os_string();
        path.push(SIG_EXT);
        PathBuf::from(path)
    }

    /// Filesystem path of the metadata sidecar for a key
    pub fn metadata_path(&self, key: &str, secured: bool) -> PathBuf {
        let mut path = utils::key_to_path(&self.root, key).into_os_string();
        path.push(META_EXT);
        if secured {
            path.push(ENCRYPTED_EXT);
        }
        PathBuf::from(path)
    }

    fn write_sidecar(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        utils::atomic_write(path, bytes)
    }

    fn delete_sidecar(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
            // Prune the mirror directory once its last sidecar is gone
            if let Some(parent) = path.parent() {
                let _ = utils::remove_dir_if_empty(parent);
            }
        }
        Ok(())
    }
}

impl SignatureStore for FsHive {
    fn signature(&self, key: &str) -> Result<Option<SignatureRecord>> {
        let path = self.signature_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)?;
        Ok(Some(SignatureRecord::parse(&text)?))
    }

    fn put_signature(&self, key: &str, record: &SignatureRecord) -> Result<()> {
        self.write_sidecar(&self.signature_path(key), record.render().as_bytes())
    }

    fn delete_signature(&self, key: &str) -> Result<()> {
        self.delete_sidecar(&self.signature_path(key))
    }

    fn signature_mtime(&self, key: &str) -> Result<Option<SystemTime>> {
        let path = self.signature_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::metadata(&path)?.modified()?))
    }

    fn metadata(&self, key: &str, secured: bool) -> Result<Option<Vec<u8>>> {
        let path = self.metadata_path(key, secured);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    fn put_metadata(&self, key: &str, bytes: &[u8], secured: bool) -> Result<()> {
        self.write_sidecar(&self.metadata_path(key, secured), bytes)
    }

    fn delete_metadata(&self, key: &str) -> Result<()> {
        self.delete_sidecar(&self.metadata_path(key, false))?;
        self.delete_sidecar(&self.metadata_path(key, true))
    }
}

#[derive(Default)]
struct MemoryHiveInner {
    signatures: HashMap<String, (SignatureRecord, SystemTime)>,
    metadata: HashMap<(String, bool), Vec<u8>>,
}

/// In-memory hive for tests
#[derive(Default)]
pub struct MemoryHive {
    inner: Mutex<MemoryHiveInner>,
}

impl MemoryHive {
    /// Empty in-memory hive
    pub fn new() -> Self {
        MemoryHive::default()
    }
}

impl SignatureStore for MemoryHive {
    fn signature(&self, key: &str) -> Result<Option<SignatureRecord>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .signatures
            .get(key)
            .map(|(r, _)| r.clone()))
    }

    fn put_signature(&self, key: &str, record: &SignatureRecord) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .signatures
            .insert(key.to_string(), (record.clone(), SystemTime::now()));
        Ok(())
    }

    fn delete_signature(&self, key: &str) -> Result<()> {
        self.inner.lock().unwrap().signatures.remove(key);
        Ok(())
    }

    fn signature_mtime(&self, key: &str) -> Result<Option<SystemTime>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .signatures
            .get(key)
            .map(|(_, t)| *t))
    }

    fn metadata(&self, key: &str, secured: bool) -> Result<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .metadata
            .get(&(key.to_string(), secured))
            .cloned())
    }

    fn put_metadata(&self, key: &str, bytes: &[u8], secured: bool) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .metadata
            .insert((key.to_string(), secured), bytes.to_vec());
        Ok(())
    }

    fn delete_metadata(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.metadata.remove(&(key.to_string(), false));
        inner.metadata.remove(&(key.to_string(), true));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fs_hive_paths() {
        let hive = FsHive::new(Path::new("/repo"));
        assert_eq!(
            hive.signature_path("/docs/a.txt"),
            PathBuf::from("/repo/.syncvault/docs/a.txt.sig")
        );
        assert_eq!(
            hive.metadata_path("/docs/a.txt", true),
            PathBuf::from("/repo/.syncvault/docs/a.txt.meta.encrypted")
        );
    }

    #[test]
    fn test_fs_hive_signature_round_trip() {
        let dir = TempDir::new().unwrap();
        let hive = FsHive::new(dir.path());

        assert!(hive.signature("/a.txt").unwrap().is_none());
        assert!(hive.signature_mtime("/a.txt").unwrap().is_none());

        let record = SignatureRecord::new("m1", "d1");
        hive.put_signature("/a.txt", &record).unwrap();
        assert_eq!(hive.signature("/a.txt").unwrap().unwrap(), record);
        assert!(hive.signature_mtime("/a.txt").unwrap().is_some());

        hive.delete_signature("/a.txt").unwrap();
        assert!(hive.signature("/a.txt").unwrap().is_none());
    }

    #[test]
    fn test_fs_hive_prunes_empty_dirs() {
        let dir = TempDir::new().unwrap();
        let hive = FsHive::new(dir.path());

        hive.put_signature("/deep/nested/a.txt", &SignatureRecord::new("m", "d"))
            .unwrap();
        let nested = hive.root().join("deep/nested");
        assert!(nested.exists());

        hive.delete_signature("/deep/nested/a.txt").unwrap();
        assert!(!nested.exists());
    }

    #[test]
    fn test_memory_hive_round_trip() {
        let hive = MemoryHive::new();
        hive.put_metadata("/a.txt", b"blob", true).unwrap();
        assert_eq!(hive.metadata("/a.txt", true).unwrap().unwrap(), b"blob");
        assert!(hive.metadata("/a.txt", false).unwrap().is_none());

        hive.delete_metadata("/a.txt").unwrap();
        assert!(hive.metadata("/a.txt", true).unwrap().is_none());
    }
}
