//! Symmetric encryption and key-file handling
//!
//! Content and metadata bytes are encrypted independently with AES-256-GCM
//! under one key material pair (key + nonce). The nonce is part of the
//! persisted key material rather than being generated per message: the same
//! plaintext must encrypt to the same ciphertext across runs, because change
//! detection compares signatures of stored bytes between syncs.
//!
//! Key material lives in a small text file:
//!
//! ```text
//! ---------SYNCVAULT-KEY---------
//! <base64 key>::<base64 nonce>
//! ---------SYNCVAULT-KEY---------
//! ```
//!
//! The header and footer marker lines are identical. Loading fails with a
//! descriptive error when the marker or the two-part split is malformed.

use crate::error::{Result, SyncError};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use std::fs;
use std::path::Path;

/// Marker line wrapping the key material (identical header and footer)
const KEY_MARKER: &str = "---------SYNCVAULT-KEY---------";

/// Token separating the base64 key from the base64 nonce
const KEY_SEPARATOR: &str = "::";

/// AES-256 key length in bytes
const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

/// Key material for the transform pipeline
#[derive(Clone)]
pub struct CipherKey {
    key: Vec<u8>,
    nonce: Vec<u8>,
}

impl std::fmt::Debug for CipherKey {
    // Never leak key bytes through Debug output
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherKey").finish_non_exhaustive()
    }
}

impl CipherKey {
    /// Build key material from raw bytes
    pub fn from_bytes(key: Vec<u8>, nonce: Vec<u8>) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(SyncError::crypto(format!(
                "key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }
        if nonce.len() != NONCE_LEN {
            return Err(SyncError::crypto(format!(
                "nonce must be {} bytes, got {}",
                NONCE_LEN,
                nonce.len()
            )));
        }
        Ok(CipherKey { key, nonce })
    }

    /// Generate a fresh random key + nonce pair
    pub fn generate() -> Self {
        let mut key = vec![0u8; KEY_LEN];
        let mut nonce = vec![0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        rand::thread_rng().fill_bytes(&mut nonce);
        CipherKey { key, nonce }
    }

    /// Load key material from a key file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::KeyFile {
                path: path.to_path_buf(),
                reason: "file not found".to_string(),
            });
        }

        let text = fs::read_to_string(path)?;
        if !text.contains(KEY_MARKER) {
            return Err(SyncError::KeyFile {
                path: path.to_path_buf(),
                reason: format!("missing '{}' marker line", KEY_MARKER),
            });
        }

        let body = text.replace(KEY_MARKER, "");
        let parts: Vec<&str> = body.trim().split(KEY_SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(SyncError::KeyFile {
                path: path.to_path_buf(),
                reason: format!(
                    "expected two base64 parts separated by '{}', got {}",
                    KEY_SEPARATOR,
                    parts.len()
                ),
            });
        }

        let key = BASE64.decode(parts[0].trim()).map_err(|e| SyncError::KeyFile {
            path: path.to_path_buf(),
            reason: format!("invalid base64 key: {}", e),
        })?;
        let nonce = BASE64.decode(parts[1].trim()).map_err(|e| SyncError::KeyFile {
            path: path.to_path_buf(),
            reason: format!("invalid base64 nonce: {}", e),
        })?;

        CipherKey::from_bytes(key, nonce)
    }

    /// Write the key material to a key file in the persisted layout
    pub fn save(&self, path: &Path) -> Result<()> {
        let body = format!(
            "{}\n{}{}{}\n{}\n",
            KEY_MARKER,
            BASE64.encode(&self.key),
            KEY_SEPARATOR,
            BASE64.encode(&self.nonce),
            KEY_MARKER
        );
        fs::write(path, body)?;
        Ok(())
    }
}

/// AES-256-GCM cipher bound to one key material pair
pub struct Cipher {
    inner: Aes256Gcm,
    nonce: Vec<u8>,
}

impl Cipher {
    /// Build a cipher from key material
    pub fn new(key: &CipherKey) -> Result<Self> {
        let inner = Aes256Gcm::new_from_slice(&key.key)
            .map_err(|e| SyncError::crypto(e.to_string()))?;
        Ok(Cipher {
            inner,
            nonce: key.nonce.clone(),
        })
    }

    /// Encrypt a byte buffer
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .encrypt(Nonce::from_slice(&self.nonce), plaintext)
            .map_err(|e| SyncError::crypto(format!("encryption failed: {}", e)))
    }

    /// Decrypt a byte buffer
    ///
    /// GCM authenticates the ciphertext, so a flipped byte fails here rather
    /// than producing garbage plaintext.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext)
            .map_err(|e| SyncError::crypto(format!("decryption failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = CipherKey::generate();
        let cipher = Cipher::new(&key).unwrap();

        let plaintext = b"the quick brown fox";
        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert_ne!(&ciphertext, plaintext);
        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_encryption_is_deterministic() {
        // Change detection relies on stable ciphertext for unchanged input
        let key = CipherKey::generate();
        let cipher = Cipher::new(&key).unwrap();
        assert_eq!(
            cipher.encrypt(b"same bytes").unwrap(),
            cipher.encrypt(b"same bytes").unwrap()
        );
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = CipherKey::generate();
        let cipher = Cipher::new(&key).unwrap();

        let mut ciphertext = cipher.encrypt(b"payload").unwrap();
        ciphertext[0] ^= 0x01;
        assert!(cipher.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn test_key_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.key");

        let key = CipherKey::generate();
        key.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(KEY_MARKER));
        assert!(text.trim_end().ends_with(KEY_MARKER));
        assert!(text.contains(KEY_SEPARATOR));

        let loaded = CipherKey::load(&path).unwrap();
        let cipher = Cipher::new(&key).unwrap();
        let reloaded = Cipher::new(&loaded).unwrap();
        assert_eq!(
            cipher.encrypt(b"x").unwrap(),
            reloaded.encrypt(b"x").unwrap()
        );
    }

    #[test]
    fn test_key_file_rejects_missing_marker() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.key");
        std::fs::write(&path, "QUJD::REVG").unwrap();

        match CipherKey::load(&path) {
            Err(SyncError::KeyFile { reason, .. }) => assert!(reason.contains("marker")),
            other => panic!("expected KeyFile error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_key_file_rejects_bad_split() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.key");
        std::fs::write(&path, format!("{}\nQUJD\n{}\n", KEY_MARKER, KEY_MARKER)).unwrap();

        match CipherKey::load(&path) {
            Err(SyncError::KeyFile { reason, .. }) => assert!(reason.contains("two base64 parts")),
            other => panic!("expected KeyFile error, got {:?}", other.map(|_| ())),
        }
    }
}
