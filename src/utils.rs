//! Utility functions shared across the library
//!
//! Path normalization for relative object keys, byte formatting for log
//! lines, atomic writes for sidecars, and the OS attribute subset capture
//! and restore used by the content model.

use crate::error::{Result, SyncError};
use crate::types::FileAttributes;
use chrono::{DateTime, Local};
use filetime::FileTime;
use std::fs;
use std::path::{Component, Path};

/// Convert a path under `root` into a rooted relative key
///
/// Object keys are portable strings rooted with a leading `/` and using
/// forward slashes on every platform (e.g. `/docs/report.txt`). These keys
/// address hive sidecars, destination objects and attached metadata alike.
pub fn relative_key(path: &Path, root: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| SyncError::PathConversion(path.to_path_buf()))?;

    let mut key = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| SyncError::PathConversion(path.to_path_buf()))?;
                key.push('/');
                key.push_str(part);
            }
            _ => return Err(SyncError::PathConversion(path.to_path_buf())),
        }
    }

    if key.is_empty() {
        return Err(SyncError::PathConversion(path.to_path_buf()));
    }
    Ok(key)
}

/// Resolve a rooted relative key against a base directory
pub fn key_to_path(root: &Path, key: &str) -> std::path::PathBuf {
    root.join(key.trim_start_matches('/'))
}

/// Strip the encrypted suffix from a name, when present
pub fn remove_encrypted_ext(name: &str) -> &str {
    name.strip_suffix(crate::types::ENCRYPTED_EXT).unwrap_or(name)
}

/// Format an object name for log lines
///
/// In wide mode the full path is shown; otherwise long names are truncated
/// from the left so the tail (the interesting part) stays visible.
pub fn display_name(wide: bool, name: &str) -> String {
    const SHORT_WIDTH: usize = 60;

    if wide || name.chars().count() <= SHORT_WIDTH {
        name.to_string()
    } else {
        let tail: String = name
            .chars()
            .rev()
            .take(SHORT_WIDTH - 3)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{}", tail)
    }
}

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

/// Atomic file write (write to temp file then rename)
///
/// Sidecar records must never be observable in a half-written state, since a
/// torn signature would make the next run misclassify the file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Capture the tracked attribute subset of a file
pub fn capture_attributes(path: &Path, metadata: &fs::Metadata) -> FileAttributes {
    FileAttributes {
        hidden: is_hidden(path),
        read_only: metadata.permissions().readonly(),
    }
}

#[cfg(unix)]
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(windows)]
fn is_hidden(path: &Path) -> bool {
    use std::os::windows::fs::MetadataExt;
    fs::metadata(path)
        .map(|m| m.file_attributes() & 0x02 != 0) // FILE_ATTRIBUTE_HIDDEN
        .unwrap_or(false)
}

/// Restore last-write time and the tracked attributes on a file
pub fn apply_attributes(
    path: &Path,
    last_write: DateTime<Local>,
    attributes: FileAttributes,
) -> Result<()> {
    let mtime = FileTime::from_unix_time(last_write.timestamp(), 0);
    filetime::set_file_mtime(path, mtime)?;

    let metadata = fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    if permissions.readonly() != attributes.read_only {
        permissions.set_readonly(attributes.read_only);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Get a file's last-write time in the local time zone, whole seconds
pub fn last_write_time(metadata: &fs::Metadata) -> Result<DateTime<Local>> {
    let modified = metadata.modified()?;
    Ok(crate::types::truncate_to_seconds(DateTime::<Local>::from(
        modified,
    )))
}

/// Remove a directory if it contains no entries
pub fn remove_dir_if_empty(path: &Path) -> Result<bool> {
    if path.is_dir() && fs::read_dir(path)?.next().is_none() {
        fs::remove_dir(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[test]
    fn test_relative_key() {
        let root = Path::new("/data/source");
        let path = Path::new("/data/source/docs/report.txt");
        assert_eq!(relative_key(path, root).unwrap(), "/docs/report.txt");

        // Root itself has no key
        assert!(relative_key(root, root).is_err());
        // Paths outside the root are rejected
        assert!(relative_key(Path::new("/elsewhere/x"), root).is_err());
    }

    #[test]
    fn test_key_to_path() {
        assert_eq!(
            key_to_path(Path::new("/dst"), "/docs/report.txt"),
            PathBuf::from("/dst/docs/report.txt")
        );
    }

    #[test]
    fn test_remove_encrypted_ext() {
        assert_eq!(remove_encrypted_ext("a.txt.encrypted"), "a.txt");
        assert_eq!(remove_encrypted_ext("a.txt"), "a.txt");
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(false, "/short.txt"), "/short.txt");

        let long = format!("/{}/tail.txt", "x".repeat(80));
        let shortened = display_name(false, &long);
        assert!(shortened.starts_with("..."));
        assert!(shortened.ends_with("tail.txt"));
        assert_eq!(display_name(true, &long), long);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
    }

    #[test]
    fn test_atomic_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.sig");

        atomic_write(&path, b"META:a\nDATA:b").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"META:a\nDATA:b");
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_apply_attributes_sets_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"x").unwrap();

        let ts = chrono::Local::now() - chrono::Duration::days(3);
        let ts = crate::types::truncate_to_seconds(ts);
        apply_attributes(&path, ts, FileAttributes::default()).unwrap();

        let restored = last_write_time(&fs::metadata(&path).unwrap()).unwrap();
        assert_eq!(restored.timestamp(), ts.timestamp());
    }
}
