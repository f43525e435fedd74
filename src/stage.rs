//! Stage execution and the context handle plugins receive.
//!
//! Each stage runs on its own OS thread and owns one link of the chain: an
//! input channel (absent only for the first, self-populating stage), an
//! output channel, a snapshot of the filter stack, and a worker pool that
//! drains the input in parallel. Channels are rendezvous channels, so a slow
//! stage blocks its producers all the way back to the tree loader — the
//! pipeline's only rate limiter.
//!
//! Execution order per stage:
//!
//! 1. Resolve the plugin's capabilities once.
//! 2. Initializer (serial). An error aborts the stage.
//! 3. Worker pool drains the input: filter, process, forward.
//! 4. Pool join, then the Finalizer sees the complete batch.
//! 5. The output channel closes when the stage returns.

use std::io::{self, Seek, SeekFrom};
use std::mem;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};
use parking_lot::Mutex;

use crate::fault::Fault;
use crate::file::File;
use crate::filter::FilterStack;
use crate::pipeline::Shared;
use crate::plugin::Plugin;

// =============================================================================
// Context
// =============================================================================

/// Where files emitted by a stage go.
///
/// Plain stages hand files straight to the output channel. Stages with a
/// Finalizer buffer everything so the Finalizer can reshape the batch before
/// it is forwarded.
enum Sink {
    Channel(Sender<File>),
    Batch(Arc<Mutex<Vec<File>>>),
}

/// The handle a plugin sees while its stage runs.
///
/// Passed to every capability method; lets the plugin inject files, locate
/// the source and target trees, tune the stage's worker count, and reach the
/// build cache.
pub struct Context {
    shared: Arc<Shared>,
    sink: Sink,
    threads: AtomicUsize,
}

impl Context {
    /// Inject a file into the stage's output stream.
    ///
    /// During initialize this is how a stage self-populates (the tree loader
    /// does exactly this); during process it is how one file fans out into
    /// several. When the stage has a Finalizer, dispatched files join the
    /// batch instead of flowing downstream immediately.
    pub fn dispatch(&self, file: File) {
        match &self.sink {
            // A send failure means downstream aborted; the file is dropped
            // and the rest of the pipeline keeps running.
            Sink::Channel(sender) => {
                let _ = sender.send(file);
            }
            Sink::Batch(batch) => batch.lock().push(file),
        }
    }

    /// Root of the source tree.
    pub fn source_dir(&self) -> &Path {
        self.shared.source_dir()
    }

    /// Root of the target tree.
    pub fn target_dir(&self) -> &Path {
        self.shared.target_dir()
    }

    /// Override the stage's worker count.
    ///
    /// Defaults to the available hardware parallelism. Only takes effect
    /// when called during initialize, before the workers spawn; a plugin
    /// whose processing must be serial calls `set_threads(1)`.
    pub fn set_threads(&self, threads: usize) {
        self.threads.store(threads, Ordering::Relaxed);
    }

    /// Look up a previously cached output for `output_path` produced from
    /// exactly these inputs.
    ///
    /// Always a miss when the pipeline was built without a cache.
    pub fn retrieve_cached(
        &self,
        output_path: &str,
        inputs: &mut [File],
    ) -> io::Result<Option<File>> {
        match self.shared.cache() {
            Some(cache) => cache.retrieve(output_path, inputs),
            None => Ok(None),
        }
    }

    /// Persist `output`'s current content for these inputs.
    ///
    /// A no-op when the pipeline was built without a cache.
    pub fn store_cached(&self, output: &mut File, inputs: &mut [File]) -> io::Result<()> {
        match self.shared.cache() {
            Some(cache) => cache.store(output, inputs),
            None => Ok(()),
        }
    }

    fn threads(&self) -> usize {
        self.threads.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Stage
// =============================================================================

/// One link of the chain, bound to one plugin.
///
/// Constructed when the chain is extended, runs exactly once on its own
/// thread, and is terminal once its output channel closes.
pub(crate) struct Stage {
    plugin: Arc<dyn Plugin>,
    input: Option<Receiver<File>>,
    output: Sender<File>,
    filters: FilterStack,
}

impl Stage {
    pub(crate) fn new(
        plugin: Arc<dyn Plugin>,
        input: Option<Receiver<File>>,
        output: Sender<File>,
        filters: FilterStack,
    ) -> Self {
        Self {
            plugin,
            input,
            output,
            filters,
        }
    }

    pub(crate) fn name(&self) -> &str {
        self.plugin.name()
    }

    /// Drive the stage to completion. Dropping `output` on return is what
    /// closes the channel and releases the downstream stage.
    pub(crate) fn run(self, shared: Arc<Shared>) {
        let Self {
            plugin,
            input,
            output,
            mut filters,
        } = self;
        let name = plugin.name().to_string();
        debug!("stage {name} starting");

        // Capabilities are resolved once, not re-queried per file.
        let initializer = plugin.as_initializer();
        let processor = plugin.as_processor();
        let finalizer = plugin.as_finalizer();

        let batch = finalizer.map(|_| Arc::new(Mutex::new(Vec::new())));
        let sink = match &batch {
            Some(buffer) => Sink::Batch(Arc::clone(buffer)),
            None => Sink::Channel(output.clone()),
        };
        let context = Context {
            shared: Arc::clone(&shared),
            sink,
            threads: AtomicUsize::new(num_cpus::get()),
        };

        if let Some(initializer) = initializer {
            match initializer.initialize(&context) {
                Ok(scoped) => filters.extend(scoped),
                Err(err) => {
                    shared.record(Fault::new(&name, err));
                    debug!("stage {name} aborted by initializer");
                    return;
                }
            }
        }

        if let Some(input) = &input {
            let workers = context.threads().max(1);
            trace!("stage {name} draining input with {workers} workers");

            // The scope exit is the join barrier between "all workers done"
            // and the Finalizer.
            thread::scope(|scope| {
                for _ in 0..workers {
                    scope.spawn(|| {
                        for mut file in input.iter() {
                            match filters.accept(&mut file) {
                                Ok(true) => {
                                    if let Some(processor) = processor {
                                        if let Err(err) = file.seek(SeekFrom::Start(0)) {
                                            shared.record(Fault::for_file(
                                                &name,
                                                file.path(),
                                                err.into(),
                                            ));
                                        } else if let Err(err) =
                                            processor.process(&context, &mut file)
                                        {
                                            shared.record(Fault::for_file(
                                                &name,
                                                file.path(),
                                                err,
                                            ));
                                        }
                                    }
                                }
                                Ok(false) => {}
                                Err(fault) => shared.record(fault),
                            }

                            // Forward regardless of filter or processor
                            // outcome; only a Finalizer may drop a file.
                            context.dispatch(file);
                        }
                    });
                }
            });
        }

        if let (Some(finalizer), Some(batch)) = (finalizer, batch) {
            let mut files = mem::take(&mut *batch.lock());
            trace!("stage {name} finalizing a batch of {} files", files.len());
            if let Err(err) = finalizer.finalize(&context, &mut files) {
                shared.record(Fault::new(&name, err));
            }
            // A finalizer may dispatch through the context rather than push
            // into the batch it was handed; those land in the (now emptied)
            // buffer and are forwarded after the batch itself.
            files.append(&mut *batch.lock());
            for file in files {
                let _ = output.send(file);
            }
        }

        debug!("stage {name} finished");
    }
}
