//! Path and filesystem helpers shared across the engine.
//!
//! Logical file paths are always slash-separated and relative to the tree
//! root. [`clean_path`] is the single normalization point; every path that
//! enters the engine goes through it.

use std::fs;
use std::path::Path;

/// Normalize a logical path: collapse `.` segments, resolve `..`, and force
/// forward slashes.
///
/// Absolute paths and paths that climb out of the tree root are programming
/// errors and panic loudly rather than being recorded as faults.
pub(crate) fn clean_path(path: &str) -> String {
    assert!(
        !path.starts_with('/') && !Path::new(path).is_absolute(),
        "absolute path where a tree-relative path is required: {path}"
    );

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    panic!("path escapes the tree root: {path}");
                }
            }
            part => parts.push(part),
        }
    }

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Parent of a cleaned logical path, or `None` once the root (`.`) is reached.
pub(crate) fn parent_path(path: &str) -> Option<&str> {
    if path == "." {
        return None;
    }
    match path.rsplit_once('/') {
        Some((parent, _)) => Some(parent),
        None => Some("."),
    }
}

/// Whether `target` already holds an up-to-date copy of `source`.
///
/// Size must match and the target must not be older than the source. Used to
/// skip re-copying unchanged asset-backed files during export.
pub(crate) fn up_to_date(source: &Path, target: &Path) -> bool {
    let Ok(source_meta) = fs::metadata(source) else {
        return false;
    };
    let Ok(target_meta) = fs::metadata(target) else {
        return false;
    };

    if source_meta.len() != target_meta.len() {
        return false;
    }

    match (source_meta.modified(), target_meta.modified()) {
        (Ok(source_time), Ok(target_time)) => target_time >= source_time,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_clean_path_collapses_segments() {
        assert_eq!(clean_path("a/./b//c"), "a/b/c");
        assert_eq!(clean_path("a/b/../c"), "a/c");
        assert_eq!(clean_path("./index.md"), "index.md");
        assert_eq!(clean_path("a\\b\\c.txt"), "a/b/c.txt");
    }

    #[test]
    fn test_clean_path_empty_is_root() {
        assert_eq!(clean_path(""), ".");
        assert_eq!(clean_path("./."), ".");
    }

    #[test]
    #[should_panic(expected = "absolute path")]
    fn test_clean_path_rejects_absolute() {
        clean_path("/etc/passwd");
    }

    #[test]
    #[should_panic(expected = "escapes the tree root")]
    fn test_clean_path_rejects_escape() {
        clean_path("../outside.txt");
    }

    #[test]
    fn test_parent_path_walks_to_root() {
        assert_eq!(parent_path("a/b/c.txt"), Some("a/b"));
        assert_eq!(parent_path("a/b"), Some("a"));
        assert_eq!(parent_path("a"), Some("."));
        assert_eq!(parent_path("."), None);
    }

    #[test]
    fn test_up_to_date() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.txt");
        let target = dir.path().join("target.txt");

        fs::write(&source, "content").unwrap();
        assert!(!up_to_date(&source, &target));

        fs::write(&target, "content").unwrap();
        assert!(up_to_date(&source, &target));

        fs::write(&target, "different length").unwrap();
        assert!(!up_to_date(&source, &target));
    }
}
