//! Error types for dupes
//!
//! Per-path failures are recoverable: they flow through the pipeline's
//! error stream and are collected into an [`ErrorList`], leaving the rest
//! of the run untouched. The list renders as one newline-joined compound
//! message, and an empty list is indistinguishable from "no error" at the
//! API boundary.

use std::fmt;
use std::io;

use thiserror::Error;

/// A failure tied to a single path or a single pipeline component.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Stat failed while resolving a path.
    #[error("lstat {path}: {source}")]
    Stat { path: String, source: io::Error },

    /// Reading a symbolic link target failed.
    #[error("readlink {path}: {source}")]
    Readlink { path: String, source: io::Error },

    /// Opening a file for reading failed.
    #[error("open {path}: {source}")]
    Open { path: String, source: io::Error },

    /// Draining a file's contents failed.
    #[error("read {path}: {source}")]
    Read { path: String, source: io::Error },

    /// Enumerating a directory failed; that subtree is skipped.
    #[error("readdir {path}: {source}")]
    ReadDir { path: String, source: io::Error },

    /// A pipeline component failed to start its worker threads.
    #[error("spawn {name} workers: {source}")]
    Spawn {
        name: &'static str,
        source: io::Error,
    },
}

/// Ordered collection of per-path errors presented as a single compound
/// failure. Insertion order is preserved.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<FilterError>);

impl ErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: FilterError) {
        self.0.push(err);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FilterError> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl IntoIterator for ErrorList {
    type Item = FilterError;
    type IntoIter = std::vec::IntoIter<FilterError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a FilterError;
    type IntoIter = std::slice::Iter<'a, FilterError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
