//! The plugin contract.
//!
//! A [`Plugin`] is the unit bound to one pipeline stage. Beyond a name, every
//! capability is optional: a plugin may initialize, process files, finalize a
//! batch, any combination — or none of them, in which case its stage is a
//! no-op relay.
//!
//! Capabilities are exposed through `as_*` accessors and resolved exactly
//! once when the stage starts, not re-queried per file.

use std::sync::Arc;

use anyhow::Result;

use crate::file::File;
use crate::filter::Filter;
use crate::stage::Context;

/// A pipeline plugin.
///
/// # Example
///
/// ```ignore
/// struct Uppercase;
///
/// impl Plugin for Uppercase {
///     fn name(&self) -> &str {
///         "uppercase"
///     }
///
///     fn as_processor(&self) -> Option<&dyn Processor> {
///         Some(self)
///     }
/// }
///
/// impl Processor for Uppercase {
///     fn process(&self, _context: &Context, file: &mut File) -> Result<()> {
///         let mut text = Vec::new();
///         file.write_to(&mut text)?;
///         file.rewrite(text.to_ascii_uppercase());
///         Ok(())
///     }
/// }
/// ```
pub trait Plugin: Send + Sync + 'static {
    /// Name used to tag faults raised by this plugin.
    fn name(&self) -> &str;

    /// The initialize capability, if implemented.
    fn as_initializer(&self) -> Option<&dyn Initializer> {
        None
    }

    /// The per-file processing capability, if implemented.
    fn as_processor(&self) -> Option<&dyn Processor> {
        None
    }

    /// The batch finalize capability, if implemented.
    fn as_finalizer(&self) -> Option<&dyn Finalizer> {
        None
    }
}

/// Runs once, serially, before any file is processed by the stage.
pub trait Initializer: Send + Sync {
    /// Set up the plugin.
    ///
    /// May inject files into the stage's output via [`Context::dispatch`]
    /// (the tree loader is nothing more than an initializer doing exactly
    /// that). Returned filters are scoped to this stage only, appended after
    /// the pipeline-wide stack.
    ///
    /// An error aborts the stage: the fault is recorded, no files flow
    /// further through it, and the rest of the pipeline continues
    /// independently.
    fn initialize(&self, context: &Context) -> Result<Vec<Arc<dyn Filter>>>;
}

/// Transforms individual files that passed the stage's filter stack.
pub trait Processor: Send + Sync {
    /// Transform one file in place.
    ///
    /// The read cursor has been reset before this call. An error is recorded
    /// as a fault but does not stop the stage; the file is forwarded
    /// regardless, carrying whatever content it had when the processor
    /// returned.
    fn process(&self, context: &Context, file: &mut File) -> Result<()>;
}

/// Runs once after every in-flight process call for the stage has completed.
pub trait Finalizer: Send + Sync {
    /// Inspect or reshape the complete batch before it is forwarded.
    ///
    /// `batch` holds every file that passed through the stage — processed,
    /// relayed, and dispatched alike. Removing an entry drops the file from
    /// the pipeline; pushing entries injects new ones. Typical use: build an
    /// index page from everything seen, or merge fragments into one file.
    ///
    /// An error is recorded as a fault; the surviving batch is still
    /// forwarded.
    fn finalize(&self, context: &Context, batch: &mut Vec<File>) -> Result<()>;
}
