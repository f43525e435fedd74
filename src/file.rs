//! The file handle flowing through the pipeline.
//!
//! A [`File`] pairs a logical, tree-relative path with content that is either
//! an in-memory buffer or a reference to an on-disk asset. Asset content is
//! loaded lazily on first read and memoized, so files that merely pass
//! through the chain untouched never hit the disk.
//!
//! ```text
//! FileContent
//! ├── Unloaded { source }          asset on disk, not yet read
//! └── Loaded   { data: Cursor }    memoized buffer + read cursor
//!
//! Access flow:
//! 1. Read / write_to / Seek(non-zero) → ensure_loaded()
//! 2. Seek(Start(0)) on unloaded content → no-op, disk untouched
//! 3. fingerprint() → load + hash once, memoized until rewrite()
//! ```

use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;
use xxhash_rust::xxh64::xxh64;

use crate::util::{clean_path, up_to_date};

// =============================================================================
// Content
// =============================================================================

/// Lazily loaded file content.
enum FileContent {
    /// Asset on disk that has not been read yet.
    Unloaded { source: PathBuf },
    /// Memoized in-memory buffer with an explicit read cursor.
    Loaded { data: Cursor<Vec<u8>> },
}

// =============================================================================
// File
// =============================================================================

/// A single file moving through the pipeline.
///
/// Owned exclusively by whichever stage currently holds it; ownership moves
/// down the chain one channel send at a time, so content and metadata need
/// no locking.
pub struct File {
    path: String,
    meta: FxHashMap<String, Value>,
    content: FileContent,
    size: u64,
    mod_time: DateTime<Utc>,
    fingerprint: Option<u64>,
}

impl File {
    /// Create an in-memory file at the given logical path.
    ///
    /// The modification time is set to now.
    ///
    /// # Panics
    ///
    /// Panics if `path` is absolute or escapes the tree root.
    pub fn from_bytes(path: impl AsRef<str>, data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        Self {
            path: clean_path(path.as_ref()),
            meta: FxHashMap::default(),
            size: data.len() as u64,
            mod_time: Utc::now(),
            content: FileContent::Loaded {
                data: Cursor::new(data),
            },
            fingerprint: None,
        }
    }

    /// Create a file backed by an on-disk asset.
    ///
    /// The asset is stat-ed for size and modification time but its content
    /// stays on disk until first read. Directories are rejected.
    ///
    /// # Panics
    ///
    /// Panics if `path` is absolute or escapes the tree root.
    pub fn from_asset(path: impl AsRef<str>, asset: impl Into<PathBuf>) -> io::Result<Self> {
        let asset = asset.into();
        let meta = fs::metadata(&asset)?;
        if meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "assets must be files, not directories",
            ));
        }

        let mod_time = meta.modified().map(DateTime::<Utc>::from)?;
        Ok(Self {
            path: clean_path(path.as_ref()),
            meta: FxHashMap::default(),
            size: meta.len(),
            mod_time,
            content: FileContent::Unloaded { source: asset },
            fingerprint: None,
        })
    }

    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------

    /// Logical path, slash-separated and relative to the tree root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final component of the logical path.
    pub fn name(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((_, name)) => name,
            None => &self.path,
        }
    }

    /// Directory part of the logical path, `.` at the root.
    pub fn dir(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some((dir, _)) => dir,
            None => ".",
        }
    }

    /// Extension of the file name including the dot, or `""` if none.
    pub fn ext(&self) -> &str {
        let name = self.name();
        match name.rfind('.') {
            Some(index) => &name[index..],
            None => "",
        }
    }

    /// Change the logical path. Content and fingerprint are untouched;
    /// downstream stages observe the new path.
    ///
    /// # Panics
    ///
    /// Panics if `path` is absolute or escapes the tree root.
    pub fn rename(&mut self, path: impl AsRef<str>) {
        self.path = clean_path(path.as_ref());
    }

    /// Content size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Modification time: filesystem mtime for asset-backed files, creation
    /// or last rewrite time for in-memory files.
    pub fn mod_time(&self) -> DateTime<Utc> {
        self.mod_time
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Look up a metadata value.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Set a metadata value.
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Remove a metadata value, returning it if present.
    pub fn remove_value(&mut self, key: &str) -> Option<Value> {
        self.meta.remove(key)
    }

    /// Copy every metadata entry from another file, overwriting on conflict.
    ///
    /// Used when a stage derives one file from another (e.g. a resized image
    /// inheriting its source's front matter).
    pub fn copy_values(&mut self, source: &File) {
        for (key, value) in &source.meta {
            self.meta.insert(key.clone(), value.clone());
        }
    }

    /// Iterate over all metadata entries.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.meta.iter().map(|(key, value)| (key.as_str(), value))
    }

    // -------------------------------------------------------------------------
    // Content
    // -------------------------------------------------------------------------

    /// Replace the content with a new buffer.
    ///
    /// Updates the size, sets the modification time to now, clears the
    /// memoized fingerprint, and resets the read cursor to the start.
    pub fn rewrite(&mut self, data: impl Into<Vec<u8>>) {
        let data = data.into();
        self.size = data.len() as u64;
        self.mod_time = Utc::now();
        self.fingerprint = None;
        self.content = FileContent::Loaded {
            data: Cursor::new(data),
        };
    }

    /// Write the content from the current cursor position to a writer,
    /// leaving the cursor at the end.
    ///
    /// Triggers a lazy load for asset-backed files.
    pub fn write_to<W: Write>(&mut self, writer: &mut W) -> io::Result<u64> {
        let data = self.ensure_loaded()?;
        let len = data.get_ref().len() as u64;
        let pos = data.position().min(len) as usize;
        let remaining = &data.get_ref()[pos..];
        writer.write_all(remaining)?;
        let written = remaining.len() as u64;
        data.set_position(len);
        Ok(written)
    }

    /// Content checksum, computed once and memoized until [`rewrite`].
    ///
    /// Loads asset-backed content if needed; the read cursor is unaffected.
    /// Used only for cache-key construction, never by ordinary processing.
    ///
    /// [`rewrite`]: File::rewrite
    pub fn fingerprint(&mut self) -> io::Result<u64> {
        if let Some(fingerprint) = self.fingerprint {
            return Ok(fingerprint);
        }

        let data = self.ensure_loaded()?;
        let fingerprint = xxh64(data.get_ref(), 0);
        self.fingerprint = Some(fingerprint);
        Ok(fingerprint)
    }

    /// Load asset-backed content into the memoized buffer.
    ///
    /// A vanished asset surfaces as `NotFound` here.
    fn ensure_loaded(&mut self) -> io::Result<&mut Cursor<Vec<u8>>> {
        if let FileContent::Unloaded { source } = &self.content {
            let data = fs::read(source)?;
            self.size = data.len() as u64;
            self.content = FileContent::Loaded {
                data: Cursor::new(data),
            };
        }

        match &mut self.content {
            FileContent::Loaded { data } => Ok(data),
            FileContent::Unloaded { .. } => unreachable!("content loaded above"),
        }
    }

    // -------------------------------------------------------------------------
    // Export
    // -------------------------------------------------------------------------

    /// Write the file under `target_dir` at its logical path, creating
    /// parent directories as needed.
    ///
    /// Still-unloaded asset-backed files are copied directly, and the copy is
    /// skipped entirely when the destination is already up to date. Buffer
    /// content is written with the read cursor saved and restored.
    pub(crate) fn export(&mut self, target_dir: &Path) -> io::Result<()> {
        let target = target_dir.join(&self.path);

        if let FileContent::Unloaded { source } = &self.content
            && up_to_date(source, &target)
        {
            return Ok(());
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match &mut self.content {
            FileContent::Unloaded { source } => {
                fs::copy(source, &target)?;
            }
            FileContent::Loaded { data } => {
                let pos = data.position();
                let mut writer = fs::File::create(&target)?;
                writer.write_all(data.get_ref())?;
                data.set_position(pos);
            }
        }

        Ok(())
    }
}

impl Read for File {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_loaded()?.read(buf)
    }
}

impl Seek for File {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // Resetting an unloaded asset is a no-op; the disk stays untouched.
        if matches!(self.content, FileContent::Unloaded { .. })
            && matches!(pos, SeekFrom::Start(0) | SeekFrom::Current(0))
        {
            return Ok(0);
        }

        self.ensure_loaded()?.seek(pos)
    }
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("size", &self.size)
            .field(
                "loaded",
                &matches!(self.content, FileContent::Loaded { .. }),
            )
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_path_components() {
        let file = File::from_bytes("posts/2024/hello.md", "");
        assert_eq!(file.path(), "posts/2024/hello.md");
        assert_eq!(file.name(), "hello.md");
        assert_eq!(file.dir(), "posts/2024");
        assert_eq!(file.ext(), ".md");

        let root = File::from_bytes("index.html", "");
        assert_eq!(root.dir(), ".");

        let bare = File::from_bytes("Makefile", "");
        assert_eq!(bare.ext(), "");
    }

    #[test]
    #[should_panic(expected = "absolute path")]
    fn test_absolute_path_panics() {
        File::from_bytes("/etc/hosts", "");
    }

    #[test]
    fn test_roundtrip_stable_across_seeks() {
        let mut file = File::from_bytes("a.txt", "hello world");

        for _ in 0..3 {
            file.seek(SeekFrom::Start(0)).unwrap();
            let mut out = Vec::new();
            file.write_to(&mut out).unwrap();
            assert_eq!(out, b"hello world");
        }
    }

    #[test]
    fn test_write_to_respects_cursor() {
        let mut file = File::from_bytes("a.txt", "hello world");
        file.seek(SeekFrom::Start(6)).unwrap();

        let mut out = Vec::new();
        assert_eq!(file.write_to(&mut out).unwrap(), 5);
        assert_eq!(out, b"world");

        // Cursor is now at the end.
        let mut rest = Vec::new();
        assert_eq!(file.write_to(&mut rest).unwrap(), 0);
    }

    #[test]
    fn test_lazy_load_from_asset() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join("asset.txt");
        fs::write(&asset, "on disk").unwrap();

        let mut file = File::from_asset("asset.txt", &asset).unwrap();
        assert_eq!(file.size(), 7);

        let mut out = Vec::new();
        file.write_to(&mut out).unwrap();
        assert_eq!(out, b"on disk");

        // Content is memoized; the asset may vanish after first load.
        fs::remove_file(&asset).unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut again = Vec::new();
        file.write_to(&mut again).unwrap();
        assert_eq!(again, b"on disk");
    }

    #[test]
    fn test_vanished_asset_is_not_found() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join("gone.txt");
        fs::write(&asset, "soon gone").unwrap();

        let mut file = File::from_asset("gone.txt", &asset).unwrap();
        fs::remove_file(&asset).unwrap();

        let mut out = Vec::new();
        let err = file.write_to(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_from_asset_rejects_directory() {
        let dir = TempDir::new().unwrap();
        assert!(File::from_asset("dir", dir.path()).is_err());
    }

    #[test]
    fn test_seek_zero_on_unloaded_is_noop() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join("asset.txt");
        fs::write(&asset, "content").unwrap();

        let mut file = File::from_asset("asset.txt", &asset).unwrap();
        fs::remove_file(&asset).unwrap();

        // No load happens, so the vanished asset is not an error here.
        assert_eq!(file.seek(SeekFrom::Start(0)).unwrap(), 0);
        assert_eq!(file.seek(SeekFrom::Current(0)).unwrap(), 0);
    }

    #[test]
    fn test_rewrite_resets_state() {
        let mut file = File::from_bytes("a.txt", "before");
        let fp_before = file.fingerprint().unwrap();

        file.rewrite("after, and longer");
        assert_eq!(file.size(), 17);
        let fp_after = file.fingerprint().unwrap();
        assert_ne!(fp_before, fp_after);

        let mut out = Vec::new();
        file.write_to(&mut out).unwrap();
        assert_eq!(out, b"after, and longer");
    }

    #[test]
    fn test_fingerprint_memoized_and_cursor_neutral() {
        let mut file = File::from_bytes("a.txt", "content");
        file.seek(SeekFrom::Start(3)).unwrap();

        let first = file.fingerprint().unwrap();
        let second = file.fingerprint().unwrap();
        assert_eq!(first, second);

        // Cursor untouched by fingerprinting.
        let mut out = Vec::new();
        file.write_to(&mut out).unwrap();
        assert_eq!(out, b"tent");
    }

    #[test]
    fn test_rename_keeps_content() {
        let mut file = File::from_bytes("draft/a.md", "body");
        let fp = file.fingerprint().unwrap();

        file.rename("posts/a.md");
        assert_eq!(file.path(), "posts/a.md");
        assert_eq!(file.fingerprint().unwrap(), fp);
    }

    #[test]
    fn test_metadata_copy() {
        let mut source = File::from_bytes("a.md", "");
        source.set_value("title", "Hello");
        source.set_value("draft", false);

        let mut derived = File::from_bytes("a.png", "");
        derived.set_value("width", 640);
        derived.copy_values(&source);

        assert_eq!(derived.value("title").unwrap(), "Hello");
        assert_eq!(derived.value("draft").unwrap(), false);
        assert_eq!(derived.value("width").unwrap(), 640);
        assert!(derived.value("missing").is_none());
    }

    #[test]
    fn test_export_writes_buffer() {
        let dir = TempDir::new().unwrap();
        let mut file = File::from_bytes("nested/out.txt", "payload");
        file.seek(SeekFrom::Start(3)).unwrap();

        file.export(dir.path()).unwrap();
        assert_eq!(
            fs::read(dir.path().join("nested/out.txt")).unwrap(),
            b"payload"
        );

        // Cursor restored after export.
        let mut out = Vec::new();
        file.write_to(&mut out).unwrap();
        assert_eq!(out, b"load");
    }

    #[test]
    fn test_export_copies_unloaded_asset() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join("asset.bin");
        fs::write(&asset, "bytes").unwrap();

        let target = TempDir::new().unwrap();
        let mut file = File::from_asset("sub/asset.bin", &asset).unwrap();
        file.export(target.path()).unwrap();

        assert_eq!(
            fs::read(target.path().join("sub/asset.bin")).unwrap(),
            b"bytes"
        );
    }

    #[test]
    fn test_export_skips_up_to_date_asset() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join("asset.bin");
        fs::write(&asset, "version").unwrap();

        let target = TempDir::new().unwrap();
        // Same size, written after the source: counts as up to date. The
        // sentinel content proves the copy is skipped, not repeated.
        fs::write(target.path().join("asset.bin"), "VERSION").unwrap();

        let mut file = File::from_asset("asset.bin", &asset).unwrap();
        file.export(target.path()).unwrap();

        assert_eq!(
            fs::read(target.path().join("asset.bin")).unwrap(),
            b"VERSION"
        );
    }
}
