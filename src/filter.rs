//! File filters and the scoped filter stack.
//!
//! Filters decide, per file, whether a stage's processor runs. A stage's
//! effective set is the pipeline-wide stack as it stood when the stage was
//! chained, plus whatever the plugin's initializer registers for itself.

use std::sync::Arc;

use anyhow::Result;

use crate::fault::Fault;
use crate::file::File;

// =============================================================================
// Filter
// =============================================================================

/// A named predicate over a [`File`].
///
/// Rejecting a file (`Ok(false)`) is not an error: the file skips the
/// stage's processor and is forwarded untouched. A filter that fails
/// (`Err`) produces a [`Fault`] tagged with its name and the file's path.
///
/// The file is borrowed mutably so content-inspecting filters can trigger
/// the lazy load.
pub trait Filter: Send + Sync {
    /// Name used to tag faults raised by this filter.
    fn name(&self) -> &str;

    /// Decide whether the file should be processed.
    fn accept(&self, file: &mut File) -> Result<bool>;
}

/// A filter built from a closure.
///
/// # Example
///
/// ```ignore
/// let markdown_only = FnFilter::new("markdown-only", |file| {
///     Ok(file.ext() == ".md")
/// });
/// ```
pub struct FnFilter<F> {
    name: String,
    predicate: F,
}

impl<F> FnFilter<F>
where
    F: Fn(&mut File) -> Result<bool> + Send + Sync,
{
    /// Create a named closure filter.
    pub fn new(name: impl Into<String>, predicate: F) -> Self {
        Self {
            name: name.into(),
            predicate,
        }
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&mut File) -> Result<bool> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, file: &mut File) -> Result<bool> {
        (self.predicate)(file)
    }
}

// =============================================================================
// Glob filter
// =============================================================================

/// A filter accepting files whose logical path matches any of a set of glob
/// patterns (`**` spans directories).
///
/// # Example
///
/// ```ignore
/// let content = GlobFilter::new(["content/**/*.md", "*.md"])?;
/// pipeline.filter_push(content);
/// ```
#[cfg(feature = "glob-filters")]
pub struct GlobFilter {
    name: String,
    set: globset::GlobSet,
}

#[cfg(feature = "glob-filters")]
impl GlobFilter {
    /// Build a filter named `glob` from the given patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::named("glob", patterns)
    }

    /// Build a filter with an explicit name for fault reporting.
    pub fn named<I, S>(name: impl Into<String>, patterns: I) -> Result<Self, globset::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = globset::GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(globset::Glob::new(pattern.as_ref())?);
        }
        Ok(Self {
            name: name.into(),
            set: builder.build()?,
        })
    }
}

#[cfg(feature = "glob-filters")]
impl Filter for GlobFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&self, file: &mut File) -> Result<bool> {
        Ok(self.set.is_match(file.path()))
    }
}

// =============================================================================
// Filter stack
// =============================================================================

/// An ordered, scoped set of filters.
///
/// `push` appends, `pop` removes the most recent entry. Cloning captures the
/// current scope; that is how each stage snapshots the pipeline-wide stack
/// at chain time.
#[derive(Clone, Default)]
pub struct FilterStack {
    entries: Vec<Arc<dyn Filter>>,
}

impl FilterStack {
    /// Create an empty stack (accepts everything).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter.
    pub fn push(&mut self, filter: Arc<dyn Filter>) {
        self.entries.push(filter);
    }

    /// Remove the most recently pushed filter.
    ///
    /// # Panics
    ///
    /// Panics if the stack is empty; that is a defect in caller code, not a
    /// recordable fault.
    pub fn pop(&mut self) {
        if self.entries.pop().is_none() {
            panic!("attempted to pop an empty filter stack");
        }
    }

    /// Append several filters at once (used for initializer-scoped filters).
    pub fn extend(&mut self, filters: impl IntoIterator<Item = Arc<dyn Filter>>) {
        self.entries.extend(filters);
    }

    /// Number of filters in scope.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluate the stack against a file in registration order.
    ///
    /// The first filter to reject or to fail short-circuits evaluation.
    /// Errors come back as a [`Fault`] tagged with the filter's name and the
    /// file's path. An empty stack accepts everything.
    pub fn accept(&self, file: &mut File) -> Result<bool, Fault> {
        for entry in &self.entries {
            match entry.accept(file) {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(err) => return Err(Fault::for_file(entry.name(), file.path(), err)),
            }
        }

        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================
