//! The synchronization engine: a three-phase state machine per invocation
//!
//! 1. **Push** — discovery walks the source tree (minus the hive), change
//!    detection decides per file whether it must be re-transformed and
//!    written, and successful writes refresh the local sidecar record.
//! 2. **Ghost deletion** — every destination object whose source counterpart
//!    vanished (after reversing the encrypted-suffix convention) is deleted;
//!    directories are offered for pruning once all their children have been
//!    evaluated.
//! 3. **Artifact cleaning** — orphaned sidecars in the hive are removed.
//!
//! Phases 2 and 3 are skippable via the `no_cleaning` flag. Error policy
//! differs per phase: a backend write failure in phase 1 counts an error and
//! continues, but any fault raised inside the discovery visitor aborts the
//! phase immediately so sidecar state never drifts from what was actually
//! committed. Phases 2 and 3 always run to completion, folding failures into
//! the error counter. All phases report into one [`SyncStats`] record that
//! the engine surfaces once at the end of the run.

use crate::cleaner::ArtifactCleaner;
use crate::config::{CheckLevel, RepositoryKind, SyncConfig, TransformKind};
use crate::crypto::CipherKey;
use crate::discovery::{DirectoryDiscovery, Visitor};
use crate::error::{Result, SyncError};
use crate::hive::{FsHive, SignatureStore};
use crate::local::LocalDestination;
use crate::repository::{Destination, Source};
use crate::signature::SignatureRecord;
use crate::transform::{SecureTransform, Transform, UnsecureTransform};
use crate::types::{
    FileMetadata, FileObject, ObjectKind, ProgressCallback, ProgressInfo, SyncStats,
    ENCRYPTED_EXT, META_EXT, SIG_EXT,
};
use crate::utils;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Directory-to-repository synchronization engine
pub struct SyncEngine {
    source_root: PathBuf,
    destination: Box<dyn Destination>,
    transform: Option<Box<dyn Transform>>,
    hive: FsHive,
    check_level: CheckLevel,
    no_cleaning: bool,
    wide_display: bool,
    excluded_files: Vec<PathBuf>,
    progress: Option<ProgressCallback>,
    stats: SyncStats,
}

impl SyncEngine {
    /// Build an engine for a local source and an explicit destination
    pub fn new(
        source_root: impl Into<PathBuf>,
        destination: Box<dyn Destination>,
        transform: Option<Box<dyn Transform>>,
        check_level: CheckLevel,
    ) -> Self {
        let source_root = source_root.into();
        let hive = FsHive::new(&source_root);
        SyncEngine {
            source_root,
            destination,
            transform,
            hive,
            check_level,
            no_cleaning: false,
            wide_display: false,
            excluded_files: Vec::new(),
            progress: None,
            stats: SyncStats::default(),
        }
    }

    /// Build an engine from a validated run configuration
    ///
    /// Fails with [`SyncError::Configuration`] before any phase starts when
    /// a mandatory setting is missing or the named backend does not ship
    /// with this build.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        config.validate()?;

        if config.source.kind != RepositoryKind::Local {
            return Err(SyncError::configuration(format!(
                "source kind {:?} is not available in this build",
                config.source.kind
            )));
        }
        if !config.source.path.is_dir() {
            return Err(SyncError::configuration(format!(
                "source path {:?} is not a directory",
                config.source.path
            )));
        }

        let key = match config.crypto_key {
            Some(ref path) => Some(CipherKey::load(path)?),
            None => None,
        };

        let transform: Option<Box<dyn Transform>> = match (config.transform, key.as_ref()) {
            (TransformKind::Secure, Some(key)) => Some(Box::new(SecureTransform::new(key)?)),
            (TransformKind::Unsecure, Some(key)) => Some(Box::new(UnsecureTransform::new(key)?)),
            (TransformKind::None, _) => None,
            (_, None) => {
                return Err(SyncError::configuration(
                    "a transform requires a crypto key file",
                ))
            }
        };

        let destination: Box<dyn Destination> = match config.destination.kind {
            RepositoryKind::Local => Box::new(
                LocalDestination::new(&config.destination.path, key.as_ref())?
                    .with_wide_display(config.wide_display),
            ),
            other => {
                return Err(SyncError::configuration(format!(
                    "destination kind {:?} is not available in this build",
                    other
                )))
            }
        };

        let mut engine =
            SyncEngine::new(&config.source.path, destination, transform, config.check_level);
        engine.no_cleaning = config.no_cleaning;
        engine.wide_display = config.wide_display;
        Ok(engine)
    }

    /// Skip the ghost-deletion and artifact-cleaning phases
    pub fn with_no_cleaning(mut self, no_cleaning: bool) -> Self {
        self.no_cleaning = no_cleaning;
        self
    }

    /// Log full object paths instead of truncated ones
    pub fn with_wide_display(mut self, wide: bool) -> Self {
        self.wide_display = wide;
        self
    }

    /// Exact file paths phase 1 must skip (e.g. the active log file)
    pub fn with_excluded_files(mut self, files: Vec<PathBuf>) -> Self {
        self.excluded_files = files;
        self
    }

    /// Attach a progress callback shared by all phases
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Statistics of the last (or current) run
    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Run all configured phases and surface the statistics record
    pub fn run(&mut self) -> Result<SyncStats> {
        self.stats = SyncStats::default();

        info!("push phase started");
        let pushed = self.push()?;
        info!("push phase ended");

        if pushed && !self.no_cleaning {
            info!("ghost deletion phase started");
            self.delete_ghosts()?;
            info!("ghost deletion phase ended");

            info!("artifact cleaning phase started");
            ArtifactCleaner::new(&self.source_root)
                .with_wide_display(self.wide_display)
                .process(&mut self.stats)?;
            info!("artifact cleaning phase ended");
        } else if !pushed {
            warn!("push phase aborted; cleaning phases skipped");
        }

        Ok(self.stats)
    }

    /// Phase 1: send every changed file to the destination
    ///
    /// Returns `false` when the walk was aborted by a visitor fault.
    fn push(&mut self) -> Result<bool> {
        let exclusions = vec![self.hive.root().to_path_buf()];
        let mut discovery = DirectoryDiscovery::new(&self.source_root, &exclusions);
        if let Some(ref progress) = self.progress {
            discovery = discovery.with_progress(progress.clone());
        }

        let mut visitor = PushVisitor {
            source_root: &self.source_root,
            destination: self.destination.as_ref(),
            transform: self.transform.as_deref(),
            hive: &self.hive,
            check_level: self.check_level,
            wide_display: self.wide_display,
            excluded_files: &self.excluded_files,
            stats: &mut self.stats,
        };

        discovery.run(&mut visitor)
    }

    /// Phase 2: delete destination objects whose source file vanished
    fn delete_ghosts(&mut self) -> Result<()> {
        let objects = self.destination.get_objects()?;
        let total = objects.len();

        // All file entries are evaluated before any directory hook fires;
        // after_directory_scan must not run while a directory still has
        // children pending.
        for (index, object) in objects.iter().enumerate() {
            if object.kind != ObjectKind::File {
                continue;
            }

            if let Some(ref progress) = self.progress {
                progress(ProgressInfo {
                    processed: index + 1,
                    total,
                    current: Some(object.full_name.clone()),
                });
            }

            let local = self.expected_source_path(&object.full_name);
            if !local.exists() {
                if self.destination.delete(&object.full_name) {
                    self.stats.deleted += 1;
                } else {
                    self.stats.errors += 1;
                }
            }
        }

        // Deepest directories first so emptied children make their parents
        // prunable within the same pass.
        let mut directories: Vec<&str> = objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Directory)
            .map(|o| o.full_name.as_str())
            .collect();
        directories.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));

        for directory in directories {
            if !self.destination.after_directory_scan(directory) {
                self.stats.errors += 1;
            }
        }

        Ok(())
    }

    /// Map a destination object key back to the source path that produced it
    ///
    /// Reverses the encrypted-suffix convention according to the configured
    /// transform: a securing run stores `a.txt` as `a.txt.encrypted`, an
    /// unsecuring run does the opposite, and no transform maps 1:1.
    fn expected_source_path(&self, key: &str) -> PathBuf {
        let local = utils::key_to_path(&self.source_root, key);
        match self.transform.as_ref().map(|t| t.is_secured()) {
            Some(true) => PathBuf::from(
                local
                    .to_string_lossy()
                    .strip_suffix(ENCRYPTED_EXT)
                    .map(str::to_string)
                    .unwrap_or_else(|| local.to_string_lossy().into_owned()),
            ),
            Some(false) => {
                let mut with_suffix = local.into_os_string();
                with_suffix.push(ENCRYPTED_EXT);
                PathBuf::from(with_suffix)
            }
            None => local,
        }
    }
}

impl Source for SyncEngine {
    fn description(&self) -> String {
        format!(
            "Local folder '{}'\nCheck level: {:?}\nIgnore cleaning: {}",
            self.source_root.display(),
            self.check_level,
            if self.no_cleaning { "yes" } else { "no" }
        )
    }

    fn process(&mut self) -> Result<bool> {
        self.run()?;
        Ok(!self.stats.has_errors())
    }
}

/// Discovery visitor implementing phase-1 change detection and push
struct PushVisitor<'a> {
    source_root: &'a Path,
    destination: &'a dyn Destination,
    transform: Option<&'a dyn Transform>,
    hive: &'a FsHive,
    check_level: CheckLevel,
    wide_display: bool,
    excluded_files: &'a [PathBuf],
    stats: &'a mut SyncStats,
}

impl PushVisitor<'_> {
    /// The dirty (archive) flag of a source file
    ///
    /// Portable mapping of the OS archive bit: the flag is set when the file
    /// was written after its signature sidecar, or has no sidecar at all.
    /// Rewriting the sidecar on a successful push is what clears it.
    fn dirty_flag(&self, key: &str, metadata: &fs::Metadata) -> Result<bool> {
        match self.hive.signature_mtime(key)? {
            None => Ok(true),
            Some(sidecar_mtime) => {
                let file_mtime = metadata.modified()?;
                Ok(to_whole_seconds(file_mtime) > to_whole_seconds(sidecar_mtime))
            }
        }
    }

    /// Build the FileObject for one visited source file
    fn load_object(
        &self,
        path: &Path,
        metadata: &fs::Metadata,
        key: &str,
        is_secured: bool,
    ) -> Result<Option<FileObject>> {
        let name = utils::remove_encrypted_ext(
            path.file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| SyncError::PathConversion(path.to_path_buf()))?,
        )
        .to_string();

        let mut file_metadata = FileMetadata::new(
            name,
            key,
            utils::last_write_time(metadata)?,
            utils::capture_attributes(path, metadata),
        );

        let content = fs::read(path)?;

        if is_secured {
            // A file that is already encrypted on the source side: its
            // signatures and encrypted metadata live in the hive; nothing
            // can be recomputed without the key.
            let Some(record) = self.hive.signature(key)? else {
                warn!(object = %key, "secured file has no signature record; skipped");
                return Ok(None);
            };
            let Some(metadata_bytes) = self.hive.metadata(key, true)? else {
                warn!(object = %key, "secured file has no metadata sidecar; skipped");
                return Ok(None);
            };
            file_metadata.original_signature = record.data;
            Ok(Some(FileObject {
                is_secured: true,
                content,
                metadata: file_metadata,
                metadata_bytes,
                metadata_signature: record.meta,
            }))
        } else {
            Ok(Some(FileObject::plaintext(content, file_metadata)?))
        }
    }

    /// Decide whether the file must be (re-)written to the destination
    fn has_changed(&self, fo: &FileObject, key: &str, dirty: bool) -> Result<bool> {
        let stored = self.hive.signature(key)?;

        // No sidecar: the file has never been synchronized
        let Some(stored) = stored else {
            return Ok(true);
        };

        // Dirty-flag policy consults nothing else
        if self.check_level == CheckLevel::ArchiveFlag {
            return Ok(dirty);
        }

        if self.check_level == CheckLevel::RemoteMd5 {
            let transform_secured = self.transform.map(|t| t.is_secured()).unwrap_or(false);
            if !self.destination.is_metadata_match(
                key,
                transform_secured,
                &fo.metadata.original_signature,
            ) {
                return Ok(true);
            }
        }

        // Content or metadata drift since the last synchronization
        Ok(stored.data != fo.metadata.original_signature
            || stored.meta != fo.metadata_signature)
    }

    /// Transform and write one changed file
    fn backup(&mut self, fo: FileObject, key: &str) -> Result<()> {
        info!(
            "cpy src {} [{}]",
            utils::display_name(self.wide_display, key),
            utils::format_bytes(fo.content.len() as u64)
        );

        let was_secured = fo.is_secured;
        let record =
            SignatureRecord::new(&fo.metadata_signature, &fo.metadata.original_signature);

        let outgoing = match self.transform {
            Some(transform) => match transform.process(fo) {
                Ok(fo) => fo,
                Err(e) if e.is_recoverable() => {
                    // The object is skipped; the run continues
                    error!(object = %key, error = %e, "transform failed");
                    self.stats.errors += 1;
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
            None => fo,
        };

        if self.destination.write(&outgoing) {
            self.stats.synchronized += 1;
            self.stats.bytes_written += outgoing.content.len() as u64;

            // Refresh the local record so the next run sees this state;
            // secured sources own no recomputable signatures, so theirs is
            // left untouched.
            if !was_secured {
                self.hive.put_signature(key, &record)?;
            }
        } else {
            self.stats.errors += 1;
        }

        Ok(())
    }

    fn visit(&mut self, path: &Path, metadata: &fs::Metadata) -> Result<()> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| SyncError::PathConversion(path.to_path_buf()))?;

        // Stray sidecar files living in the content tree are never content
        if name.ends_with(SIG_EXT)
            || name.ends_with(META_EXT)
            || name.ends_with(&format!("{}{}", META_EXT, ENCRYPTED_EXT))
        {
            return Ok(());
        }
        if self.excluded_files.iter().any(|f| f == path) {
            return Ok(());
        }

        let is_secured = name.ends_with(ENCRYPTED_EXT);
        let raw_key = utils::relative_key(path, self.source_root)?;
        let key = utils::remove_encrypted_ext(&raw_key).to_string();

        let dirty = self.dirty_flag(&key, metadata)?;
        if self.check_level == CheckLevel::ArchiveFlag && !dirty {
            return Ok(());
        }

        self.stats.scanned += 1;
        self.stats.bytes_read += metadata.len();
        debug!(">> processing {}", utils::display_name(self.wide_display, &key));

        let Some(fo) = self.load_object(path, metadata, &key, is_secured)? else {
            self.stats.errors += 1;
            return Ok(());
        };

        if self.has_changed(&fo, &key, dirty)? {
            self.backup(fo, &key)
        } else {
            debug!(">> ignored {}", utils::display_name(self.wide_display, &key));
            self.stats.ignored += 1;
            Ok(())
        }
    }
}

impl Visitor for PushVisitor<'_> {
    fn on_file_found(&mut self, path: &Path, metadata: &fs::Metadata) -> Result<bool> {
        match self.visit(path, metadata) {
            Ok(()) => Ok(true),
            Err(e) => {
                // A fault here means sidecar state can no longer be trusted
                // to match what was committed; stop the phase.
                error!(path = %path.display(), error = %e, "push aborted");
                self.stats.errors += 1;
                Ok(false)
            }
        }
    }
}

/// Truncate a SystemTime to whole seconds since the epoch
///
/// Sidecar timestamps only carry second precision, so sub-second noise must
/// not make a freshly-synced file look dirty.
fn to_whole_seconds(ts: SystemTime) -> u64 {
    ts.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, SyncConfig};
    use tempfile::TempDir;

    fn local_config(src: &Path, dst: &Path) -> SyncConfig {
        SyncConfig {
            source: EndpointConfig::local(src),
            destination: EndpointConfig::local(dst),
            transform: TransformKind::None,
            crypto_key: None,
            check_level: CheckLevel::LocalMd5,
            no_cleaning: false,
            wide_display: false,
        }
    }

    #[test]
    fn test_from_config_rejects_missing_source() {
        let dst = TempDir::new().unwrap();
        let config = local_config(Path::new("/definitely/not/here"), dst.path());
        assert!(matches!(
            SyncEngine::from_config(&config),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_config_rejects_cloud_destination() {
        let src = TempDir::new().unwrap();
        let mut config = local_config(src.path(), Path::new("bucket"));
        config.destination.kind = RepositoryKind::S3;
        config.destination.credentials = Some(PathBuf::from("creds.json"));
        assert!(matches!(
            SyncEngine::from_config(&config),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_expected_source_path_reverses_suffix() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let key = CipherKey::generate();

        let dest = LocalDestination::new(dst.path(), None).unwrap();
        let engine = SyncEngine::new(
            src.path(),
            Box::new(dest),
            Some(Box::new(SecureTransform::new(&key).unwrap())),
            CheckLevel::LocalMd5,
        );

        assert_eq!(
            engine.expected_source_path("/a.txt.encrypted"),
            src.path().join("a.txt")
        );
    }

    #[test]
    fn test_expected_source_path_without_transform() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let dest = LocalDestination::new(dst.path(), None).unwrap();
        let engine = SyncEngine::new(src.path(), Box::new(dest), None, CheckLevel::LocalMd5);

        assert_eq!(
            engine.expected_source_path("/docs/a.txt"),
            src.path().join("docs/a.txt")
        );
    }
}
