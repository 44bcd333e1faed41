//! The transform pipeline: encrypt/decrypt with integrity verification
//!
//! A [`Transform`] maps one [`FileObject`] to another. [`SecureTransform`]
//! encrypts the content bytes and the serialized metadata bytes independently
//! with the same key material; [`UnsecureTransform`] reverses it and refuses
//! to return anything when either signature fails to verify, so callers never
//! see partially-decrypted or tampered data.

use crate::crypto::{Cipher, CipherKey};
use crate::error::{Result, SyncError};
use crate::signature::hash_bytes;
use crate::types::{FileMetadata, FileObject};
use tracing::warn;

/// Encrypt/decrypt step applied to a content+metadata pair
pub trait Transform: Send + Sync {
    /// True when this transform produces secured (encrypted) objects
    fn is_secured(&self) -> bool;

    /// Human-readable description for run headers and logs
    fn description(&self) -> String;

    /// Apply the transform to a file object
    fn process(&self, fo: FileObject) -> Result<FileObject>;
}

/// Encrypts content and metadata; the result is a secured object
pub struct SecureTransform {
    cipher: Cipher,
}

impl SecureTransform {
    /// Build from key material
    pub fn new(key: &CipherKey) -> Result<Self> {
        Ok(SecureTransform {
            cipher: Cipher::new(key)?,
        })
    }
}

impl Transform for SecureTransform {
    fn is_secured(&self) -> bool {
        true
    }

    fn description(&self) -> String {
        "AES-256-GCM encryption".to_string()
    }

    /// Encrypt the content bytes and the serialized metadata bytes
    ///
    /// All other metadata fields are copied unchanged; the metadata signature
    /// still covers the plaintext serialized bytes, which is what makes the
    /// stored metadata tamper-evident after decryption.
    fn process(&self, fo: FileObject) -> Result<FileObject> {
        let content = self.cipher.encrypt(&fo.content)?;
        let metadata_bytes = self.cipher.encrypt(&fo.metadata_bytes)?;

        Ok(FileObject {
            is_secured: true,
            content,
            metadata: fo.metadata,
            metadata_bytes,
            metadata_signature: fo.metadata_signature,
        })
    }
}

/// Decrypts content and metadata, verifying both signatures
pub struct UnsecureTransform {
    cipher: Cipher,
}

impl UnsecureTransform {
    /// Build from key material
    pub fn new(key: &CipherKey) -> Result<Self> {
        Ok(UnsecureTransform {
            cipher: Cipher::new(key)?,
        })
    }
}

impl Transform for UnsecureTransform {
    fn is_secured(&self) -> bool {
        false
    }

    fn description(&self) -> String {
        "AES-256-GCM decryption".to_string()
    }

    /// Decrypt and verify a secured object
    ///
    /// Verification is two-stage: first the decrypted metadata bytes are
    /// hashed and compared to the carried metadata signature, then the
    /// decrypted content is hashed and compared to the original-content
    /// signature recorded inside the metadata. Either mismatch fails the
    /// whole operation with [`SyncError::Integrity`].
    fn process(&self, fo: FileObject) -> Result<FileObject> {
        let content = self.cipher.decrypt(&fo.content)?;
        let metadata_bytes = self.cipher.decrypt(&fo.metadata_bytes)?;

        let meta_actual = hash_bytes(&metadata_bytes);
        if meta_actual != fo.metadata_signature {
            warn!(object = %fo.metadata.full_name, "metadata signature mismatch");
            return Err(SyncError::Integrity {
                object: fo.metadata.full_name,
                field: "metadata",
                expected: fo.metadata_signature,
                actual: meta_actual,
            });
        }

        let metadata: FileMetadata = serde_json::from_slice(&metadata_bytes)?;

        let data_actual = hash_bytes(&content);
        if data_actual != metadata.original_signature {
            warn!(object = %metadata.full_name, "content signature mismatch");
            return Err(SyncError::Integrity {
                object: metadata.full_name,
                field: "content",
                expected: metadata.original_signature,
                actual: data_actual,
            });
        }

        Ok(FileObject {
            is_secured: false,
            content,
            metadata,
            metadata_bytes,
            metadata_signature: fo.metadata_signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FileAttributes, FileMetadata};
    use chrono::Local;

    fn sample_object() -> FileObject {
        let metadata = FileMetadata::new(
            "report.txt",
            "/docs/report.txt",
            Local::now(),
            FileAttributes {
                hidden: false,
                read_only: true,
            },
        );
        FileObject::plaintext(b"quarterly numbers".to_vec(), metadata).unwrap()
    }

    #[test]
    fn test_secure_then_unsecure_round_trip() {
        let key = CipherKey::generate();
        let secure = SecureTransform::new(&key).unwrap();
        let unsecure = UnsecureTransform::new(&key).unwrap();

        let original = sample_object();
        let secured = secure.process(original.clone()).unwrap();

        assert!(secured.is_secured);
        assert_ne!(secured.content, original.content);
        assert_ne!(secured.metadata_bytes, original.metadata_bytes);
        assert_eq!(secured.metadata_signature, original.metadata_signature);

        let recovered = unsecure.process(secured).unwrap();
        assert!(!recovered.is_secured);
        assert_eq!(recovered.content, original.content);
        assert_eq!(recovered.metadata, original.metadata);
    }

    #[test]
    fn test_tampered_metadata_detected() {
        let key = CipherKey::generate();
        let secure = SecureTransform::new(&key).unwrap();
        let unsecure = UnsecureTransform::new(&key).unwrap();

        let mut secured = secure.process(sample_object()).unwrap();
        // Swap in a forged metadata signature; decryption succeeds but the
        // first verification stage must reject the object.
        secured.metadata_signature = hash_bytes(b"forged");

        match unsecure.process(secured) {
            Err(SyncError::Integrity { field, .. }) => assert_eq!(field, "metadata"),
            other => panic!("expected integrity failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_tampered_content_signature_detected() {
        let key = CipherKey::generate();
        let secure = SecureTransform::new(&key).unwrap();
        let unsecure = UnsecureTransform::new(&key).unwrap();

        // Sign metadata that claims a different content digest
        let metadata = FileMetadata {
            original_signature: hash_bytes(b"different content"),
            ..sample_object().metadata
        };
        let metadata_bytes = serde_json::to_vec(&metadata).unwrap();
        let metadata_signature = hash_bytes(&metadata_bytes);
        let fo = FileObject {
            is_secured: false,
            content: b"actual content".to_vec(),
            metadata,
            metadata_bytes,
            metadata_signature,
        };

        let secured = secure.process(fo).unwrap();
        match unsecure.process(secured) {
            Err(SyncError::Integrity { field, .. }) => assert_eq!(field, "content"),
            other => panic!("expected integrity failure, got {:?}", other.map(|_| ())),
        }
    }
}
