//! Artifact cleaning: removal of orphaned hive sidecars
//!
//! Signatures and metadata sidecars outlive their content file when the file
//! is deleted between runs, or when a run aborts after the delete but before
//! the cleaning phase. The cleaner walks the hive, maps every sidecar back to
//! the content path it describes, and removes sidecars whose content file no
//! longer exists in either its plaintext or its encrypted form.
//!
//! Faults on individual sidecars are counted and the pass continues; a
//! single unreadable entry must not leave the rest of the hive dirty.

use crate::error::Result;
use crate::hive::FsHive;
use crate::types::{SyncStats, ENCRYPTED_EXT, META_EXT, SIG_EXT};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Removes hive sidecars whose content file is gone
pub struct ArtifactCleaner {
    root: PathBuf,
    hive: FsHive,
    wide_display: bool,
}

impl ArtifactCleaner {
    /// Build a cleaner for the repository rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let hive = FsHive::new(&root);
        ArtifactCleaner {
            root,
            hive,
            wide_display: false,
        }
    }

    /// Log full object paths instead of truncated ones
    pub fn with_wide_display(mut self, wide: bool) -> Self {
        self.wide_display = wide;
        self
    }

    /// Walk the hive and remove every orphaned sidecar
    ///
    /// Deletions and faults are folded into `stats`; the pass itself only
    /// fails when the hive cannot be enumerated at all.
    pub fn process(&self, stats: &mut SyncStats) -> Result<()> {
        if !self.hive.root().is_dir() {
            return Ok(());
        }

        for entry in walkdir::WalkDir::new(self.hive.root()).contents_first(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!(error = %e, "hive walk entry failed");
                    stats.errors += 1;
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                // Mirror directories emptied by sidecar removal are pruned
                // on the way back up (children were already visited).
                if entry.path() != self.hive.root() {
                    let _ = utils::remove_dir_if_empty(entry.path());
                }
                continue;
            }

            match self.clean_sidecar(entry.path()) {
                Ok(true) => stats.deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(path = %entry.path().display(), error = %e, "sidecar cleanup failed");
                    stats.errors += 1;
                }
            }
        }

        Ok(())
    }

    /// Remove one sidecar if its content file is gone; true when removed
    fn clean_sidecar(&self, sidecar: &Path) -> Result<bool> {
        let Some(key) = self.sidecar_key(sidecar) else {
            debug!(path = %sidecar.display(), "not a recognized sidecar; left alone");
            return Ok(false);
        };

        let plaintext = utils::key_to_path(&self.root, &key);
        let mut secured = plaintext.clone().into_os_string();
        secured.push(ENCRYPTED_EXT);

        if plaintext.exists() || Path::new(&secured).exists() {
            return Ok(false);
        }

        fs::remove_file(sidecar)?;
        info!(
            "del artifact {}",
            utils::display_name(self.wide_display, &key)
        );
        Ok(true)
    }

    /// The content key a sidecar path describes, `None` for foreign files
    fn sidecar_key(&self, sidecar: &Path) -> Option<String> {
        let key = utils::relative_key(sidecar, self.hive.root()).ok()?;

        let meta_encrypted = format!("{}{}", META_EXT, ENCRYPTED_EXT);
        for suffix in [SIG_EXT, meta_encrypted.as_str(), META_EXT] {
            if let Some(stripped) = key.strip_suffix(suffix) {
                return Some(stripped.to_string());
            }
        }
        None
    }
}
