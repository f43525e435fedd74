//! Content-addressable build cache.
//!
//! A stage can skip recomputation when its declared inputs are unchanged:
//! the cache maps (output path, ordered set of input content fingerprints)
//! to the bytes produced last time. Staleness is entirely a function of
//! input fingerprints — there is no separate invalidation signal, and
//! modification times play no part in the key.

use std::fs;
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, trace};
use xxhash_rust::xxh64::Xxh64;

use crate::file::File;

/// On-disk store of previously produced outputs, one file per key.
///
/// Entries are named `mr_{key:016x}{ext}`, where the extension is taken from
/// the output path purely for operator convenience; it is not part of the
/// key. Within one run a given output path is only produced once per stage,
/// so the store is append-only per key and needs no locking.
pub struct Cache {
    base_dir: PathBuf,
}

impl Cache {
    /// Create a cache rooted at `base_dir`.
    ///
    /// The directory is created on first store, not here.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Look up the output previously produced for `output_path` from exactly
    /// these inputs.
    ///
    /// Returns `Ok(None)` on a miss; any other I/O failure propagates. A hit
    /// yields an asset-backed [`File`] at `output_path` whose content is the
    /// cache entry, loaded lazily like any other asset.
    ///
    /// Inputs may be passed in any order.
    pub fn retrieve(&self, output_path: &str, inputs: &mut [File]) -> io::Result<Option<File>> {
        let entry = self.entry_path(output_path, inputs)?;

        match File::from_asset(output_path, &entry) {
            Ok(file) => {
                trace!("cache hit for {output_path}");
                Ok(Some(file))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!("cache miss for {output_path}");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Persist `output`'s current content for these inputs.
    ///
    /// The output's read cursor is saved and restored around the copy, so
    /// the caller observes no side effect.
    pub fn store(&self, output: &mut File, inputs: &mut [File]) -> io::Result<()> {
        let entry = self.entry_path(output.path(), inputs)?;
        fs::create_dir_all(&self.base_dir)?;

        let position = output.stream_position()?;
        output.seek(SeekFrom::Start(0))?;
        let mut writer = fs::File::create(&entry)?;
        output.write_to(&mut writer)?;
        output.seek(SeekFrom::Start(position))?;

        debug!("cached {} as {}", output.path(), entry.display());
        Ok(())
    }

    /// Build the entry path for (output path, inputs).
    ///
    /// Inputs are hashed in ascending path order regardless of the order the
    /// caller declared them in; this keeps the key stable across
    /// permutations of the same input set.
    fn entry_path(&self, output_path: &str, inputs: &mut [File]) -> io::Result<PathBuf> {
        let mut hasher = Xxh64::new(0);
        hasher.update(output_path.as_bytes());

        let mut sorted: Vec<&mut File> = inputs.iter_mut().collect();
        sorted.sort_by(|a, b| a.path().cmp(b.path()));

        for input in sorted {
            let fingerprint = input.fingerprint()?;
            hasher.update(input.path().as_bytes());
            hasher.update(&fingerprint.to_le_bytes());
        }

        // The extension must come from the final component only; a dot in a
        // directory name would otherwise leak a separator into the entry name.
        let name = match output_path.rsplit_once('/') {
            Some((_, name)) => name,
            None => output_path,
        };
        let ext = match name.rfind('.') {
            Some(index) => &name[index..],
            None => "",
        };

        Ok(self
            .base_dir
            .join(format!("mr_{:016x}{ext}", hasher.digest())))
    }
}

// =============================================================================
// Tests
// =============================================================================
