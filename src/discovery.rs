//! Directory discovery: recursive walk with exclusions and a visitor protocol
//!
//! [`DirectoryDiscovery::run`] walks a root depth-first and calls the visitor
//! back for every file. The visitor's return value is a control signal, not a
//! per-file verdict: `Ok(false)` or an error aborts the remainder of the walk
//! immediately. Phase 1 of the engine relies on that fail-fast behavior to
//! avoid committing objects on top of partially-consistent sidecar state.
//!
//! [`collect_objects`] is the non-visiting enumerator: every file and
//! directory under a root (minus exclusions) as a flat list, children before
//! their parent directory. Destinations use it to enumerate their own object
//! space in the same shape discovery produces.

use crate::error::Result;
use crate::types::{DiscoveredObject, ObjectKind, ProgressCallback, ProgressInfo};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory names never descended into, regardless of exclusion rules
const RESERVED_DIRS: &[&str] = &["$RECYCLE.BIN", "System Volume Information"];

/// Per-file callback of a discovery walk
pub trait Visitor {
    /// Called for every visited file
    ///
    /// Return `Ok(true)` to continue the walk. `Ok(false)` and `Err` both
    /// abort the remainder of the walk immediately; `Err` additionally
    /// carries why.
    fn on_file_found(&mut self, path: &Path, metadata: &fs::Metadata) -> Result<bool>;
}

/// Recursive tree walker with exclusion rules
pub struct DirectoryDiscovery {
    root: PathBuf,
    exclusions: Vec<String>,
    progress: Option<ProgressCallback>,
}

impl DirectoryDiscovery {
    /// Build a walker over `root`
    ///
    /// `exclusions` are absolute path prefixes compared case-insensitively;
    /// a directory matching one is skipped entirely, neither reported nor
    /// descended into.
    pub fn new(root: impl Into<PathBuf>, exclusions: &[PathBuf]) -> Self {
        DirectoryDiscovery {
            root: root.into(),
            exclusions: exclusions
                .iter()
                .map(|p| p.to_string_lossy().to_lowercase())
                .collect(),
            progress: None,
        }
    }

    /// Attach a progress callback `(processed, total, current path)`
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Walk the tree, invoking the visitor per file
    ///
    /// Returns `Ok(true)` when the walk completed, `Ok(false)` when the
    /// visitor asked to stop, and `Err` when the visitor (or the walk
    /// itself) failed. Total counts are computed up front so progress is
    /// meaningful from the first file.
    pub fn run(&self, visitor: &mut dyn Visitor) -> Result<bool> {
        let total = collect_objects(&self.root, &self.exclusions_as_paths())?
            .iter()
            .filter(|o| o.kind == ObjectKind::File)
            .count();
        debug!(root = %self.root.display(), total, "discovery started");

        let mut processed = 0usize;
        let walker = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry.path(), entry.file_type().is_dir()));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            processed += 1;
            if let Some(ref progress) = self.progress {
                progress(ProgressInfo {
                    processed,
                    total,
                    current: Some(entry.path().display().to_string()),
                });
            }

            let metadata = entry.metadata()?;
            match visitor.on_file_found(entry.path(), &metadata) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(path = %entry.path().display(), "scan interrupted by visitor");
                    return Ok(false);
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "scan aborted");
                    return Err(e);
                }
            }
        }

        Ok(true)
    }

    fn exclusions_as_paths(&self) -> Vec<PathBuf> {
        self.exclusions.iter().map(PathBuf::from).collect()
    }

    fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if !is_dir {
            return false;
        }
        is_excluded_dir(path, &self.exclusions)
    }
}

fn is_excluded_dir(path: &Path, exclusions: &[String]) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if RESERVED_DIRS.contains(&name) {
            return true;
        }
    }

    let lower = path.to_string_lossy().to_lowercase();
    exclusions
        .iter()
        .any(|e| lower == *e || lower.starts_with(&format!("{}{}", e, std::path::MAIN_SEPARATOR)))
}

/// Enumerate every file and directory under a root as a flat list
///
/// Exclusion rules match [`DirectoryDiscovery::run`]. Directory entries
/// follow their children, so consumers that prune containers can process the
/// list in order. The root itself is not reported.
pub fn collect_objects(root: &Path, exclusions: &[PathBuf]) -> Result<Vec<DiscoveredObject>> {
    let lowered: Vec<String> = exclusions
        .iter()
        .map(|p| p.to_string_lossy().to_lowercase())
        .collect();

    let mut objects = Vec::new();
    let walker = WalkDir::new(root)
        .contents_first(true)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir() && is_excluded_dir(entry.path(), &lowered))
        });

    for entry in walker {
        let entry = entry?;
        if entry.path() == root {
            continue;
        }

        let kind = if entry.file_type().is_dir() {
            ObjectKind::Directory
        } else {
            ObjectKind::File
        };

        objects.push(DiscoveredObject {
            directory: entry
                .path()
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            full_name: entry.path().display().to_string(),
            kind,
        });
    }

    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct Collecting {
        seen: Vec<PathBuf>,
        stop_at: Option<String>,
    }

    impl Visitor for Collecting {
        fn on_file_found(&mut self, path: &Path, _metadata: &fs::Metadata) -> Result<bool> {
            self.seen.push(path.to_path_buf());
            if let Some(ref stop) = self.stop_at {
                if path.to_string_lossy().contains(stop.as_str()) {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }

    fn sample_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::create_dir_all(dir.path().join("skipme/inner")).unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::write(dir.path().join("docs/b.txt"), b"b").unwrap();
        fs::write(dir.path().join("skipme/c.txt"), b"c").unwrap();
        fs::write(dir.path().join("skipme/inner/d.txt"), b"d").unwrap();
        dir
    }

    #[test]
    fn test_run_visits_all_files() {
        let dir = sample_tree();
        let discovery = DirectoryDiscovery::new(dir.path(), &[]);
        let mut visitor = Collecting {
            seen: Vec::new(),
            stop_at: None,
        };

        assert!(discovery.run(&mut visitor).unwrap());
        assert_eq!(visitor.seen.len(), 4);
    }

    #[test]
    fn test_exclusions_skip_whole_subtree() {
        let dir = sample_tree();
        let discovery = DirectoryDiscovery::new(dir.path(), &[dir.path().join("skipme")]);
        let mut visitor = Collecting {
            seen: Vec::new(),
            stop_at: None,
        };

        assert!(discovery.run(&mut visitor).unwrap());
        assert_eq!(visitor.seen.len(), 2);
        assert!(visitor
            .seen
            .iter()
            .all(|p| !p.to_string_lossy().contains("skipme")));
    }

    #[test]
    fn test_visitor_false_aborts_walk() {
        let dir = sample_tree();
        let discovery = DirectoryDiscovery::new(dir.path(), &[]);
        let mut visitor = Collecting {
            seen: Vec::new(),
            stop_at: Some("a.txt".to_string()),
        };

        assert!(!discovery.run(&mut visitor).unwrap());
        // Nothing after the aborting file was visited
        assert!(visitor.seen.len() < 4);
    }

    #[test]
    fn test_progress_reports_totals() {
        let dir = sample_tree();
        let counts: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);

        let discovery = DirectoryDiscovery::new(dir.path(), &[]).with_progress(Arc::new(
            move |info: ProgressInfo| {
                sink.lock().unwrap().push((info.processed, info.total));
            },
        ));
        let mut visitor = Collecting {
            seen: Vec::new(),
            stop_at: None,
        };
        discovery.run(&mut visitor).unwrap();

        let counts = counts.lock().unwrap();
        assert_eq!(counts.len(), 4);
        assert!(counts.iter().all(|&(_, total)| total == 4));
        assert_eq!(counts.last().unwrap().0, 4);
    }

    #[test]
    fn test_collect_objects_children_before_parent() {
        let dir = sample_tree();
        let objects = collect_objects(dir.path(), &[]).unwrap();

        let child_idx = objects
            .iter()
            .position(|o| o.full_name.ends_with("d.txt"))
            .unwrap();
        let parent_idx = objects
            .iter()
            .position(|o| o.kind == ObjectKind::Directory && o.full_name.ends_with("inner"))
            .unwrap();
        assert!(child_idx < parent_idx);
    }
}
