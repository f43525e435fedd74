//! The built-in tree-loading plugin.

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use walkdir::WalkDir;

use crate::file::File;
use crate::filter::Filter;
use crate::plugin::{Initializer, Plugin};
use crate::stage::Context;

/// First stage of every pipeline: enumerates the source tree and emits one
/// asset-backed [`File`] per regular file, content untouched until someone
/// downstream reads it.
///
/// [`Pipeline::new`] chains this automatically.
///
/// [`Pipeline::new`]: crate::Pipeline::new
pub struct TreeLoader;

impl Plugin for TreeLoader {
    fn name(&self) -> &str {
        "loader"
    }

    fn as_initializer(&self) -> Option<&dyn Initializer> {
        Some(self)
    }
}

impl Initializer for TreeLoader {
    fn initialize(&self, context: &Context) -> Result<Vec<Arc<dyn Filter>>> {
        let source_dir = context.source_dir().to_path_buf();
        let mut count = 0usize;

        for entry in WalkDir::new(&source_dir) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let rel = entry
                .path()
                .strip_prefix(&source_dir)
                .expect("walk stays under the source dir");
            let file = File::from_asset(rel.to_string_lossy(), entry.path())?;
            context.dispatch(file);
            count += 1;
        }

        debug!("loaded {count} files from {}", source_dir.display());
        Ok(Vec::new())
    }
}
