//! Concurrent checksum index
//!
//! [`Sums`] maps content checksums to the files that produced them and is
//! the authoritative classifier for the whole pipeline: the first file
//! appended under a checksum is unique, every later one is a duplicate.
//! All operations take a single internal mutex, so classification is
//! linearizable across however many workers are appending.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Width of a checksum in bytes.
pub const SUM_LEN: usize = 20;

/// A fixed-width content checksum, rendered as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sum([u8; SUM_LEN]);

impl Sum {
    pub fn new(bytes: [u8; SUM_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SUM_LEN] {
        &self.0
    }
}

impl From<[u8; SUM_LEN]> for Sum {
    fn from(bytes: [u8; SUM_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sum({self})")
    }
}

/// A file recorded in the index: canonical path plus the size reported by
/// stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Running counters over everything the index has seen.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub num_files: u64,
    pub num_bytes: u64,
    pub num_dup_files: u64,
    pub num_dup_bytes: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} B) duplicate files / {} ({} B) total files",
            self.num_dup_files, self.num_dup_bytes, self.num_files, self.num_bytes
        )
    }
}

/// Map of checksums to files, safe for concurrent use.
///
/// Clones share the same underlying index, so workers and the supervisor
/// can all hold a handle on one run's state.
#[derive(Debug, Clone, Default)]
pub struct Sums {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    map: HashMap<Sum, Vec<FileMeta>>,
    stats: Stats,
}

impl Sums {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `file` under `sum` and updates the counters. Returns true
    /// iff the bucket already held at least one file, i.e. `file` is a
    /// duplicate. No attempt is made to verify that `sum` matches the
    /// file's contents.
    pub fn append(&self, sum: Sum, file: FileMeta) -> bool {
        let size = file.size;
        let mut inner = self.inner.lock();
        let Inner { map, stats } = &mut *inner;
        stats.num_files += 1;
        stats.num_bytes += size;
        match map.entry(sum) {
            Entry::Occupied(mut bucket) => {
                bucket.get_mut().push(file);
                stats.num_dup_files += 1;
                stats.num_dup_bytes += size;
                true
            }
            Entry::Vacant(bucket) => {
                bucket.insert(vec![file]);
                false
            }
        }
    }

    /// Snapshot of the files recorded under `sum`, in insertion order.
    pub fn get(&self, sum: &Sum) -> Option<Vec<FileMeta>> {
        self.inner.lock().map.get(sum).cloned()
    }

    /// Calls `visit` for each checksum and its files. Returning false
    /// stops the iteration. Iteration order is unspecified. The visitor
    /// runs under the index lock and must not reenter the index.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Sum, &[FileMeta]) -> bool,
    {
        let inner = self.inner.lock();
        for (sum, files) in &inner.map {
            if !visit(sum, files) {
                break;
            }
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> Stats {
        self.inner.lock().stats
    }

    /// Number of distinct checksums recorded.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    /// Writes a summary of duplicate files and their checksums to `w` in
    /// the following format:
    ///
    /// ```text
    /// da39a3ee5e6b4b0d3255bfef95601890afd80709:
    /// - "/path/to/file1"
    /// - "/path/to/file2"
    /// ```
    ///
    /// Paths within a group are sorted ascending; group order is
    /// unspecified. Stops and returns the error on the first failed
    /// write.
    pub fn write_all_dup(&self, w: &mut dyn Write) -> io::Result<()> {
        let mut result = Ok(());
        self.for_each(|sum, files| {
            if files.len() < 2 {
                return true;
            }
            match write_group(w, sum, files) {
                Ok(()) => true,
                Err(err) => {
                    result = Err(err);
                    false
                }
            }
        });
        result
    }
}

fn write_group(w: &mut dyn Write, sum: &Sum, files: &[FileMeta]) -> io::Result<()> {
    writeln!(w, "{sum}:")?;
    let mut paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
    paths.sort_unstable();
    for path in paths {
        writeln!(w, "- {path:?}")?;
    }
    Ok(())
}
