//! # millrace
//!
//! A concurrent tree-to-tree build pipeline engine.
//!
//! millrace is the layer underneath a static-site generator (or any similar
//! content pipeline): it reads a tree of source files, pushes each file
//! through an ordered chain of plugin stages, writes the survivors to a
//! target tree, and removes stale outputs left over from previous runs.
//!
//! - **Stages run concurrently**, connected by rendezvous channels; each
//!   stage drains its input with a pool of workers. Backpressure falls out
//!   of the channel capacity — a slow stage stalls its producers all the
//!   way back to the tree loader.
//! - **Plugins are minimal**: a name plus any subset of initialize /
//!   process / finalize. What a plugin doesn't handle is relayed untouched.
//! - **Filters are scoped**: push and pop predicates around `chain` calls to
//!   gate which files a stage processes; rejected files pass through
//!   unmodified.
//! - **Failures don't stop the build**: per-file errors become [`Fault`]s,
//!   the run completes, and the full list comes back from
//!   [`Pipeline::end`].
//! - **The build cache is content-addressed**: a stage can skip work when
//!   its declared inputs are fingerprint-identical to a previous run.
//!
//! ## Quick Start
//!
//! ```ignore
//! use millrace::prelude::*;
//!
//! struct Uppercase;
//!
//! impl Plugin for Uppercase {
//!     fn name(&self) -> &str {
//!         "uppercase"
//!     }
//!
//!     fn as_processor(&self) -> Option<&dyn Processor> {
//!         Some(self)
//!     }
//! }
//!
//! impl Processor for Uppercase {
//!     fn process(&self, _context: &Context, file: &mut File) -> anyhow::Result<()> {
//!         let mut text = Vec::new();
//!         file.write_to(&mut text)?;
//!         file.rewrite(text.to_ascii_uppercase());
//!         Ok(())
//!     }
//! }
//!
//! let faults = Pipeline::new("content")
//!     .filter_push(GlobFilter::new(["**/*.md"])?)
//!     .chain(Uppercase)
//!     .filter_pop()
//!     .end("public");
//!
//! std::process::exit(if faults.is_empty() { 0 } else { 1 });
//! ```
//!
//! ## What millrace is not
//!
//! The concrete transformations (markdown, templating, minification), the
//! CLI, and any notion of a config file live in the application on top.
//! There is no distributed execution and no scheduling state beyond the
//! on-disk cache.

pub mod cache;
pub mod fault;
pub mod file;
pub mod filter;
pub mod loader;
pub mod plugin;
pub mod prelude;
pub mod stage;

mod pipeline;
mod util;

// =============================================================================
// Orchestration
// =============================================================================

pub use pipeline::Pipeline;

// =============================================================================
// Plugin contract
// =============================================================================

pub use plugin::{Finalizer, Initializer, Plugin, Processor};
pub use stage::Context;

// =============================================================================
// Files & filters
// =============================================================================

pub use file::File;
#[cfg(feature = "glob-filters")]
pub use filter::GlobFilter;
pub use filter::{Filter, FilterStack, FnFilter};

// =============================================================================
// Infrastructure
// =============================================================================

pub use cache::Cache;
pub use fault::Fault;
pub use loader::TreeLoader;
