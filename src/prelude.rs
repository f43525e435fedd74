//! Prelude module for convenient imports.
//!
//! ```ignore
//! use millrace::prelude::*;
//! ```

// Orchestration
pub use crate::pipeline::Pipeline;

// Plugin contract
pub use crate::plugin::{Finalizer, Initializer, Plugin, Processor};
pub use crate::stage::Context;

// Files
pub use crate::file::File;

// Filters
pub use crate::filter::{Filter, FilterStack, FnFilter};
#[cfg(feature = "glob-filters")]
pub use crate::filter::GlobFilter;

// Cache
pub use crate::cache::Cache;

// Faults
pub use crate::fault::Fault;

// Built-in plugins
pub use crate::loader::TreeLoader;
