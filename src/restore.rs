//! Version restore: recover one historical version of a stored object
//!
//! Independent of the sync engine; shares the content model and the
//! transform pipeline. A [`VersionProvider`] is the versioning capability of
//! a backend: list the known versions of an object newest-first, download the
//! payload of one version together with the metadata triple attached to the
//! stored object, and undelete a soft-deleted version where the backend
//! requires that before download.
//!
//! [`Restorer`] drives a single restore: confirmation of any questions the
//! version carries, undelete when needed, download, full two-stage signature
//! verification through the unsecure transform, then writing the plaintext
//! bytes with the original timestamp and attributes applied.

use crate::crypto::CipherKey;
use crate::error::{Result, SyncError};
use crate::transform::{Transform, UnsecureTransform};
use crate::types::{
    FileAttributes, FileMetadata, FileObject, ObjectVersion, META_ENCRYPTED_KEY,
    META_SIGNATURE_KEY, ORIGINAL_SIGNATURE_KEY,
};
use crate::utils;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Local;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Payload and attached metadata of one downloaded version
pub struct FetchedVersion {
    /// Raw (encrypted) content bytes
    pub content: Vec<u8>,
    /// Key/value metadata attached to the stored object
    pub attached: HashMap<String, String>,
}

/// Versioning capability of a backend
pub trait VersionProvider {
    /// All known versions of an object, ordered by creation time descending
    ///
    /// An object with no versions yields [`SyncError::NotFound`].
    fn get_versions(&self, name: &str) -> Result<Vec<ObjectVersion>>;

    /// Download the payload and attached metadata of one version
    fn fetch(&self, name: &str, version: &ObjectVersion) -> Result<FetchedVersion>;

    /// Undelete a soft-deleted version so it becomes downloadable
    fn undelete(&self, name: &str, version: &ObjectVersion) -> Result<()>;
}

/// Answers a confirmation question; `false` declines
pub type ConfirmCallback<'a> = &'a dyn Fn(&str) -> bool;

/// Restores one object version through the unsecure transform
pub struct Restorer<'a> {
    provider: &'a dyn VersionProvider,
    transform: UnsecureTransform,
}

impl<'a> Restorer<'a> {
    /// Build a restorer over a provider with the given key material
    pub fn new(provider: &'a dyn VersionProvider, key: &CipherKey) -> Result<Self> {
        Ok(Restorer {
            provider,
            transform: UnsecureTransform::new(key)?,
        })
    }

    /// Restore `version` of `name`, returning the path written
    ///
    /// When `destination` is `None` the filename is derived from the object
    /// name with the version identifier embedded, so repeated restores of
    /// different versions never overwrite each other. Every confirmation
    /// question the version carries must be affirmed through `confirm`;
    /// declining any aborts with [`SyncError::RestoreDeclined`] before the
    /// backend is touched, except for the undelete some backends require.
    pub fn restore(
        &self,
        name: &str,
        version: &ObjectVersion,
        destination: Option<&Path>,
        confirm: ConfirmCallback,
    ) -> Result<PathBuf> {
        for question in &version.questions {
            if !confirm(question) {
                warn!(object = %name, version = %version.version_id, "restore declined");
                return Err(SyncError::RestoreDeclined(question.clone()));
            }
        }
        if !version.questions.is_empty() {
            self.provider.undelete(name, version)?;
        }

        let fetched = self.provider.fetch(name, version)?;
        let fo = build_secured_object(name, &fetched)?;
        let plain = self.transform.process(fo)?;

        let target = match destination {
            Some(path) => path.to_path_buf(),
            None => derived_name(name, &version.version_id),
        };

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&target, &plain.content)?;
        utils::apply_attributes(&target, plain.metadata.last_write, plain.metadata.attributes)?;

        info!(
            "restored {} [{}] -> {}",
            name,
            utils::format_bytes(plain.content.len() as u64),
            target.display()
        );
        Ok(target)
    }
}

/// Reassemble a secured FileObject from a download and its attached metadata
fn build_secured_object(name: &str, fetched: &FetchedVersion) -> Result<FileObject> {
    let metadata_b64 = attached_field(fetched, META_ENCRYPTED_KEY)?;
    let metadata_signature = attached_field(fetched, META_SIGNATURE_KEY)?.to_string();
    let original_signature = attached_field(fetched, ORIGINAL_SIGNATURE_KEY)?.to_string();

    let metadata_bytes = BASE64
        .decode(metadata_b64)
        .map_err(|e| SyncError::backend(format!("attached metadata is not valid base64: {e}")))?;

    // Placeholder descriptive fields; the authoritative metadata is inside
    // the encrypted blob and replaces these after decryption.
    let mut metadata = FileMetadata::new(
        utils::remove_encrypted_ext(name),
        &format!("/{}", utils::remove_encrypted_ext(name)),
        Local::now(),
        FileAttributes::default(),
    );
    metadata.original_signature = original_signature;

    Ok(FileObject {
        is_secured: true,
        content: fetched.content.clone(),
        metadata,
        metadata_bytes,
        metadata_signature,
    })
}

fn attached_field<'f>(fetched: &'f FetchedVersion, key: &str) -> Result<&'f str> {
    fetched
        .attached
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| SyncError::backend(format!("stored object lacks attached field '{key}'")))
}

/// `report.txt` restored as version `42` becomes `report.42.restore.txt`
fn derived_name(name: &str, version_id: &str) -> PathBuf {
    let plain = utils::remove_encrypted_ext(name);
    let path = Path::new(plain);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(plain);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => PathBuf::from(format!("{stem}.{version_id}.restore.{ext}")),
        None => PathBuf::from(format!("{stem}.{version_id}.restore")),
    }
}
