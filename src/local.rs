//! Local-filesystem destination backend
//!
//! Mirrors the source tree into a destination directory: content objects at
//! their relative paths (with the encrypted suffix when secured), signature
//! and metadata sidecars in the destination's own hive. Plaintext objects get
//! their original timestamp and read-only attribute applied on write so the
//! mirror is usable in place.

use crate::crypto::{Cipher, CipherKey};
use crate::discovery;
use crate::error::{Result, SyncError};
use crate::hive::{FsHive, SignatureStore};
use crate::repository::Destination;
use crate::restore::{FetchedVersion, VersionProvider};
use crate::signature::{hash_bytes, hash_file, SignatureRecord};
use crate::types::{
    DiscoveredObject, FileObject, ObjectVersion, ENCRYPTED_EXT, META_ENCRYPTED_KEY,
    META_SIGNATURE_KEY, ORIGINAL_SIGNATURE_KEY,
};
use crate::utils;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Destination writing into a local directory
pub struct LocalDestination {
    root: PathBuf,
    hive: FsHive,
    cipher: Option<Cipher>,
    wide_display: bool,
}

impl LocalDestination {
    /// Open a destination rooted at `root`
    ///
    /// `key` is required to verify secured objects during remote metadata
    /// checks; a destination without one treats every secured comparison as
    /// a mismatch.
    pub fn new(root: impl Into<PathBuf>, key: Option<&CipherKey>) -> Result<Self> {
        let root = root.into();
        let hive = FsHive::new(&root);
        let cipher = match key {
            Some(key) => Some(Cipher::new(key)?),
            None => None,
        };
        Ok(LocalDestination {
            root,
            hive,
            cipher,
            wide_display: false,
        })
    }

    /// Log full object paths instead of truncated ones
    pub fn with_wide_display(mut self, wide: bool) -> Self {
        self.wide_display = wide;
        self
    }

    fn object_path(&self, key: &str, secured: bool) -> PathBuf {
        let mut path = utils::key_to_path(&self.root, key).into_os_string();
        if secured {
            path.push(ENCRYPTED_EXT);
        }
        PathBuf::from(path)
    }

    fn remove_if_exists(path: &Path) -> std::io::Result<()> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn write_inner(&self, fo: &FileObject) -> Result<()> {
        let key = &fo.metadata.full_name;
        let data_path = self.object_path(key, fo.is_secured);

        // Stale forms of the object are removed first so a mode switch
        // (plaintext run after a secured run, or vice versa) never leaves
        // both variants behind.
        Self::remove_if_exists(&self.object_path(key, !fo.is_secured))?;
        Self::remove_if_exists(&data_path)?;

        if let Some(parent) = data_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&data_path, &fo.content)?;

        if fo.is_secured {
            self.hive.put_metadata(key, &fo.metadata_bytes, true)?;
        } else {
            utils::apply_attributes(&data_path, fo.metadata.last_write, fo.metadata.attributes)?;
        }

        self.hive.put_signature(
            key,
            &SignatureRecord::new(&fo.metadata_signature, &fo.metadata.original_signature),
        )?;

        Ok(())
    }
}

impl Destination for LocalDestination {
    fn description(&self) -> String {
        format!("Local folder '{}'", self.root.display())
    }

    fn write(&self, fo: &FileObject) -> bool {
        match self.write_inner(fo) {
            Ok(()) => {
                debug!(
                    "cpy dst {}",
                    utils::display_name(self.wide_display, &fo.metadata.full_name)
                );
                true
            }
            Err(e) => {
                error!(object = %fo.metadata.full_name, error = %e, "destination write failed");
                false
            }
        }
    }

    fn is_metadata_match(
        &self,
        key: &str,
        secured: bool,
        expected_original_signature: &str,
    ) -> bool {
        // Cheapest evidence first: the persisted record, then the presence
        // of the object, then a full content digest.
        let record = match self.hive.signature(key) {
            Ok(Some(record)) => record,
            _ => return false,
        };
        if record.data != expected_original_signature {
            return false;
        }

        let data_path = self.object_path(key, secured);
        if !data_path.exists() {
            return false;
        }

        let actual = if secured {
            let Some(ref cipher) = self.cipher else {
                return false;
            };
            match fs::read(&data_path).map_err(crate::error::SyncError::from).and_then(|bytes| cipher.decrypt(&bytes)) {
                Ok(plain) => hash_bytes(&plain),
                Err(_) => return false,
            }
        } else {
            match hash_file(&data_path) {
                Ok(digest) => digest,
                Err(_) => return false,
            }
        };

        actual == expected_original_signature
    }

    fn get_objects(&self) -> Result<Vec<DiscoveredObject>> {
        let exclusions = vec![self.hive.root().to_path_buf()];
        let objects = discovery::collect_objects(&self.root, &exclusions)?;

        objects
            .into_iter()
            .map(|o| {
                let full = utils::relative_key(Path::new(&o.full_name), &self.root)?;
                let directory = match utils::relative_key(Path::new(&o.directory), &self.root) {
                    Ok(key) => key,
                    Err(_) => "/".to_string(), // direct child of the root
                };
                Ok(DiscoveredObject {
                    directory,
                    full_name: full,
                    kind: o.kind,
                })
            })
            .collect()
    }

    fn delete(&self, key: &str) -> bool {
        let data_path = utils::key_to_path(&self.root, key);
        let sidecar_key = utils::remove_encrypted_ext(key).to_string();

        let result = (|| -> Result<()> {
            Self::remove_if_exists(&data_path)?;
            self.hive.delete_signature(&sidecar_key)?;
            self.hive.delete_metadata(&sidecar_key)?;
            if let Some(parent) = data_path.parent() {
                let _ = utils::remove_dir_if_empty(parent);
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                info!("del dst {}", utils::display_name(self.wide_display, key));
                true
            }
            Err(e) => {
                error!(object = %key, error = %e, "destination delete failed");
                false
            }
        }
    }

    fn after_directory_scan(&self, key: &str) -> bool {
        let dir = utils::key_to_path(&self.root, key);
        if !dir.is_dir() {
            return true;
        }

        let has_content = walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| e.file_type().is_file());
        if has_content {
            return true;
        }

        let result = (|| -> Result<()> {
            fs::remove_dir_all(&dir)?;
            let mirror = utils::key_to_path(self.hive.root(), key);
            if mirror.exists() {
                fs::remove_dir_all(&mirror)?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                info!("rmdir dst {}", utils::display_name(self.wide_display, key));
                true
            }
            Err(e) => {
                error!(directory = %key, error = %e, "directory prune failed");
                false
            }
        }
    }
}

impl VersionProvider for LocalDestination {
    /// The local filesystem keeps no history: the single current version of
    /// the object is reported, identified by its last-write time.
    fn get_versions(&self, name: &str) -> Result<Vec<ObjectVersion>> {
        let key = rooted(name);
        let secured_path = self.object_path(&key, true);
        let (path, stored_name) = if secured_path.exists() {
            (secured_path, format!("{}{}", name, ENCRYPTED_EXT))
        } else {
            let plain = self.object_path(&key, false);
            if !plain.exists() {
                return Err(SyncError::NotFound(name.to_string()));
            }
            (plain, name.to_string())
        };

        let metadata = fs::metadata(&path)?;
        let created = utils::last_write_time(&metadata)?;
        Ok(vec![ObjectVersion {
            created,
            name: stored_name,
            size: metadata.len(),
            storage_class: "LOCAL".to_string(),
            version_id: created.timestamp().to_string(),
            questions: Vec::new(),
        }])
    }

    fn fetch(&self, name: &str, _version: &ObjectVersion) -> Result<FetchedVersion> {
        let key = rooted(name);
        let path = self.object_path(&key, true);
        if !path.exists() {
            return Err(SyncError::NotFound(name.to_string()));
        }

        let record = self
            .hive
            .signature(&key)?
            .ok_or_else(|| SyncError::NotFound(format!("{name} signature record")))?;
        let metadata_bytes = self
            .hive
            .metadata(&key, true)?
            .ok_or_else(|| SyncError::NotFound(format!("{name} metadata sidecar")))?;

        let mut attached = HashMap::new();
        attached.insert(META_ENCRYPTED_KEY.to_string(), BASE64.encode(metadata_bytes));
        attached.insert(META_SIGNATURE_KEY.to_string(), record.meta);
        attached.insert(ORIGINAL_SIGNATURE_KEY.to_string(), record.data);

        Ok(FetchedVersion {
            content: fs::read(&path)?,
            attached,
        })
    }

    fn undelete(&self, _name: &str, _version: &ObjectVersion) -> Result<()> {
        Ok(())
    }
}

fn rooted(name: &str) -> String {
    let plain = utils::remove_encrypted_ext(name);
    if plain.starts_with('/') {
        plain.to_string()
    } else {
        format!("/{plain}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileAttributes, FileMetadata, ObjectKind};
    use chrono::Local;
    use tempfile::TempDir;

    fn plaintext_object(key: &str, content: &[u8]) -> FileObject {
        let name = key.rsplit('/').next().unwrap().to_string();
        let metadata =
            FileMetadata::new(name, key, Local::now(), FileAttributes::default());
        FileObject::plaintext(content.to_vec(), metadata).unwrap()
    }

    #[test]
    fn test_write_plaintext_creates_object_and_sidecar() {
        let dir = TempDir::new().unwrap();
        let dest = LocalDestination::new(dir.path(), None).unwrap();

        let fo = plaintext_object("/docs/a.txt", b"hello");
        assert!(dest.write(&fo));

        assert_eq!(fs::read(dir.path().join("docs/a.txt")).unwrap(), b"hello");
        let record = dest.hive.signature("/docs/a.txt").unwrap().unwrap();
        assert_eq!(record.data, fo.metadata.original_signature);
        assert_eq!(record.meta, fo.metadata_signature);
    }

    #[test]
    fn test_write_secured_uses_suffix_and_meta_sidecar() {
        let dir = TempDir::new().unwrap();
        let key = CipherKey::generate();
        let dest = LocalDestination::new(dir.path(), Some(&key)).unwrap();

        let secure = crate::transform::SecureTransform::new(&key).unwrap();
        let fo = crate::transform::Transform::process(&secure, plaintext_object("/a.txt", b"data"))
            .unwrap();
        assert!(dest.write(&fo));

        assert!(dir.path().join("a.txt.encrypted").exists());
        assert!(!dir.path().join("a.txt").exists());
        assert!(dest.hive.metadata("/a.txt", true).unwrap().is_some());
    }

    #[test]
    fn test_is_metadata_match_plaintext() {
        let dir = TempDir::new().unwrap();
        let dest = LocalDestination::new(dir.path(), None).unwrap();

        let fo = plaintext_object("/a.txt", b"payload");
        assert!(dest.write(&fo));

        assert!(dest.is_metadata_match("/a.txt", false, &fo.metadata.original_signature));
        assert!(!dest.is_metadata_match("/a.txt", false, &hash_bytes(b"other")));
        assert!(!dest.is_metadata_match("/missing.txt", false, &fo.metadata.original_signature));
    }

    #[test]
    fn test_get_objects_relative_keys() {
        let dir = TempDir::new().unwrap();
        let dest = LocalDestination::new(dir.path(), None).unwrap();
        assert!(dest.write(&plaintext_object("/docs/a.txt", b"a")));
        assert!(dest.write(&plaintext_object("/b.txt", b"b")));

        let objects = dest.get_objects().unwrap();
        let files: Vec<_> = objects
            .iter()
            .filter(|o| o.kind == ObjectKind::File)
            .map(|o| o.full_name.as_str())
            .collect();
        assert!(files.contains(&"/docs/a.txt"));
        assert!(files.contains(&"/b.txt"));
        // The hive never appears in the listing
        assert!(objects.iter().all(|o| !o.full_name.contains(".syncvault")));
    }

    #[test]
    fn test_delete_removes_object_and_sidecars() {
        let dir = TempDir::new().unwrap();
        let dest = LocalDestination::new(dir.path(), None).unwrap();
        assert!(dest.write(&plaintext_object("/docs/a.txt", b"a")));

        assert!(dest.delete("/docs/a.txt"));
        assert!(!dir.path().join("docs/a.txt").exists());
        assert!(dest.hive.signature("/docs/a.txt").unwrap().is_none());
    }

    #[test]
    fn test_version_provider_reports_current_version() {
        let dir = TempDir::new().unwrap();
        let key = CipherKey::generate();
        let dest = LocalDestination::new(dir.path(), Some(&key)).unwrap();

        let secure = crate::transform::SecureTransform::new(&key).unwrap();
        let fo = crate::transform::Transform::process(&secure, plaintext_object("/a.txt", b"v1"))
            .unwrap();
        assert!(dest.write(&fo));

        let versions = dest.get_versions("a.txt").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].name, "a.txt.encrypted");
        assert!(versions[0].questions.is_empty());

        let fetched = dest.fetch("a.txt", &versions[0]).unwrap();
        assert_eq!(fetched.content, fo.content);
        assert!(fetched.attached.contains_key(crate::types::META_ENCRYPTED_KEY));

        assert!(matches!(
            dest.get_versions("missing.txt"),
            Err(SyncError::NotFound(_))
        ));
    }

    #[test]
    fn test_after_directory_scan_prunes_empty() {
        let dir = TempDir::new().unwrap();
        let dest = LocalDestination::new(dir.path(), None).unwrap();
        assert!(dest.write(&plaintext_object("/docs/a.txt", b"a")));
        assert!(dest.delete("/docs/a.txt"));

        assert!(dest.after_directory_scan("/docs"));
        assert!(!dir.path().join("docs").exists());
    }
}
