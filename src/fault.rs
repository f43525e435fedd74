//! Recorded non-fatal build errors.

use thiserror::Error;

/// A non-fatal error recorded during a pipeline run.
///
/// Faults carry the name of the plugin or filter that failed and, when the
/// failure concerned a specific file, its logical path. The engine
/// accumulates faults instead of aborting: a run always completes and
/// reports everything that went wrong. The caller decides whether a
/// non-empty fault list is a build failure.
///
/// # Example
///
/// ```ignore
/// let faults = pipeline.end("target");
/// for fault in &faults {
///     eprintln!("{fault}");   // e.g. "[markdown@posts/broken.md]: bad front matter"
/// }
/// ```
#[derive(Debug, Error)]
#[error("[{name}{}]: {source}", self.path_tag())]
pub struct Fault {
    /// Name of the plugin or filter that produced the error.
    pub name: String,
    /// Logical path of the file being handled, if any.
    pub path: Option<String>,
    /// The underlying error.
    #[source]
    pub source: anyhow::Error,
}

impl Fault {
    /// Create a fault for a failure not tied to a particular file.
    pub fn new(name: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            name: name.into(),
            path: None,
            source,
        }
    }

    /// Create a fault for a failure while handling the file at `path`.
    pub fn for_file(
        name: impl Into<String>,
        path: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self {
            name: name.into(),
            path: Some(path.into()),
            source,
        }
    }

    fn path_tag(&self) -> String {
        match &self.path {
            Some(path) => format!("@{path}"),
            None => String::new(),
        }
    }
}
