//! The pipeline orchestrator.
//!
//! A [`Pipeline`] builds the ordered list of stages, wires each stage's
//! output to the next stage's input, drives execution, exports the surviving
//! files into the target tree, sweeps stale outputs from previous runs, and
//! aggregates faults.
//!
//! # Example
//!
//! ```ignore
//! use millrace::{GlobFilter, Pipeline};
//!
//! let faults = Pipeline::new("content")
//!     .filter_push(GlobFilter::new(["**/*.md"])?)
//!     .chain(Markdown::new())
//!     .filter_pop()
//!     .chain(Minify::new())
//!     .end("public");
//!
//! for fault in &faults {
//!     eprintln!("{fault}");
//! }
//! ```
//!
//! A pipeline is single-use: it moves from building (mutators allowed)
//! through running (`end` in flight) to complete (faults returned), and any
//! attempt to reuse it panics.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use log::{debug, trace};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use walkdir::WalkDir;

use crate::cache::Cache;
use crate::fault::Fault;
use crate::file::File;
use crate::filter::{Filter, FilterStack};
use crate::loader::TreeLoader;
use crate::plugin::Plugin;
use crate::stage::Stage;
use crate::util::parent_path;

// =============================================================================
// Shared run state
// =============================================================================

/// State shared by every stage of one run.
///
/// The fault list and the reference set are the only state touched from
/// multiple threads; both sit behind a mutex. Everything else is immutable
/// for the duration of the run.
pub(crate) struct Shared {
    source_dir: PathBuf,
    target_dir: PathBuf,
    cache: Option<Cache>,
    faults: Mutex<Vec<Fault>>,
    refs: Mutex<FxHashSet<String>>,
}

impl Shared {
    fn new(source_dir: PathBuf, target_dir: PathBuf, cache: Option<Cache>) -> Self {
        Self {
            source_dir,
            target_dir,
            cache,
            faults: Mutex::new(Vec::new()),
            refs: Mutex::new(FxHashSet::default()),
        }
    }

    pub(crate) fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub(crate) fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub(crate) fn cache(&self) -> Option<&Cache> {
        self.cache.as_ref()
    }

    /// Record a fault. Called from stage workers and the export drain alike.
    pub(crate) fn record(&self, fault: Fault) {
        debug!("fault recorded: {fault}");
        self.faults.lock().push(fault);
    }

    /// Mark a target path and every ancestor directory as referenced by this
    /// run, shielding them from the stale sweep.
    fn reference(&self, path: &str) {
        let mut refs = self.refs.lock();
        let mut segment = path;
        loop {
            refs.insert(segment.to_string());
            match parent_path(segment) {
                Some(parent) => segment = parent,
                None => break,
            }
        }
    }

    fn is_referenced(&self, path: &str) -> bool {
        self.refs.lock().contains(path)
    }

    fn take_faults(&self) -> Vec<Fault> {
        std::mem::take(&mut *self.faults.lock())
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// The orchestrator for one build.
///
/// Created over a source tree with the tree loader as its implicit first
/// stage; extended with [`chain`]; executed once with [`end`].
///
/// [`chain`]: Pipeline::chain
/// [`end`]: Pipeline::end
pub struct Pipeline {
    source_dir: PathBuf,
    cache: Option<Cache>,
    clean: bool,
    filters: FilterStack,
    stages: Vec<Stage>,
    tail: Option<Receiver<File>>,
    complete: bool,
}

impl Pipeline {
    /// Create a pipeline over `source_dir`, with the tree loader chained as
    /// the first stage.
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        let mut pipeline = Self {
            source_dir: source_dir.into(),
            cache: None,
            clean: true,
            filters: FilterStack::new(),
            stages: Vec::new(),
            tail: None,
            complete: false,
        };
        pipeline.chain(TreeLoader);
        pipeline
    }

    /// Enable the content-addressable build cache, rooted at `cache_dir`.
    ///
    /// Plugins reach it through [`Context::retrieve_cached`] and
    /// [`Context::store_cached`].
    ///
    /// [`Context::retrieve_cached`]: crate::Context::retrieve_cached
    /// [`Context::store_cached`]: crate::Context::store_cached
    pub fn cache(&mut self, cache_dir: impl Into<PathBuf>) -> &mut Self {
        self.ensure_building();
        self.cache = Some(Cache::new(cache_dir));
        self
    }

    /// Toggle deletion of stale target-tree entries after export. On by
    /// default.
    pub fn clean(&mut self, enabled: bool) -> &mut Self {
        self.ensure_building();
        self.clean = enabled;
        self
    }

    /// Append a stage bound to `plugin`, its input wired to the previous
    /// stage's output and its base filter scope snapshotted from the current
    /// stack.
    ///
    /// # Panics
    ///
    /// Panics if the pipeline has already run.
    pub fn chain(&mut self, plugin: impl Plugin) -> &mut Self {
        self.ensure_building();

        let (sender, receiver) = crossbeam_channel::bounded(0);
        let input = self.tail.take();
        self.tail = Some(receiver);
        self.stages.push(Stage::new(
            Arc::new(plugin),
            input,
            sender,
            self.filters.clone(),
        ));
        self
    }

    /// Push a filter onto the pipeline-wide stack. Affects the base scope of
    /// every stage chained afterwards, never stages already chained.
    ///
    /// # Panics
    ///
    /// Panics if the pipeline has already run.
    pub fn filter_push(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.ensure_building();
        self.filters.push(Arc::new(filter));
        self
    }

    /// Pop the most recently pushed filter.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty or the pipeline has already run.
    pub fn filter_pop(&mut self) -> &mut Self {
        self.ensure_building();
        self.filters.pop();
        self
    }

    /// Run the chain to completion and return every fault recorded.
    ///
    /// Starts all stages concurrently, drains the last stage's output into
    /// `target_dir` (marking each exported path and its ancestors as
    /// referenced), then — unless disabled — deletes everything in
    /// `target_dir` this run never referenced.
    ///
    /// # Panics
    ///
    /// Panics on reuse: `end` runs a pipeline exactly once.
    pub fn end(&mut self, target_dir: impl Into<PathBuf>) -> Vec<Fault> {
        self.ensure_building();
        self.complete = true;

        let shared = Arc::new(Shared::new(
            self.source_dir.clone(),
            target_dir.into(),
            self.cache.take(),
        ));
        let output = self
            .tail
            .take()
            .expect("pipeline always has at least the loader stage");

        debug!(
            "running {} stages: {} -> {}",
            self.stages.len(),
            shared.source_dir().display(),
            shared.target_dir().display()
        );

        let mut handles = Vec::new();
        for stage in self.stages.drain(..) {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("stage-{}", stage.name()))
                .spawn(move || stage.run(shared))
                .expect("failed to spawn stage thread");
            handles.push(handle);
        }

        for mut file in output.iter() {
            trace!("exporting {}", file.path());
            match file.export(shared.target_dir()) {
                Ok(()) => shared.reference(file.path()),
                Err(err) => shared.record(Fault::for_file("export", file.path(), err.into())),
            }
        }

        for handle in handles {
            let _ = handle.join();
        }

        if self.clean {
            sweep_stale(&shared);
        }

        shared.take_faults()
    }

    fn ensure_building(&self) {
        if self.complete {
            panic!("attempted reuse of a completed pipeline");
        }
    }
}

/// Delete everything under the target tree that this run never referenced.
fn sweep_stale(shared: &Shared) {
    let target = shared.target_dir();
    if !target.exists() {
        return;
    }

    let mut walker = WalkDir::new(target).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        let Ok(rel) = entry.path().strip_prefix(target) else {
            continue;
        };
        let rel: String = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if shared.is_referenced(&rel) {
            continue;
        }

        debug!("removing stale output {rel}");
        let result = if entry.file_type().is_dir() {
            // Everything below goes with it.
            walker.skip_current_dir();
            fs::remove_dir_all(entry.path())
        } else {
            fs::remove_file(entry.path())
        };

        if let Err(err) = result
            && err.kind() != io::ErrorKind::NotFound
        {
            shared.record(Fault::for_file("cleanup", rel, err.into()));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
