//! dupes - Duplicate File Detector
//!
//! Detects files with duplicate contents by checksum, reading candidates
//! either from a newline-delimited path list or from a directory tree.
//!
//! # Architecture
//!
//! ```text
//!   stdin paths ──► line source ─┐
//!                                ├──► hashing workers ──► unique   ─┐
//!   <dir> ──► directory walker ──┘         │         ──► duplicate ─┼──► supervisor
//!                  │                       ▼         ──► errors ────┘   (sinks, policy,
//!                  └── errors ──────► checksum index                     lifecycle)
//! ```
//!
//! The walker enumerates directories over a bounded queue with an
//! inline-processing fallback on saturation, so deep or wide trees cannot
//! deadlock it or blow up memory. Hashing workers read each file into a
//! pooled buffer, digest it, and classify it against a mutex-protected
//! checksum index: the first append under a checksum is the unique
//! occurrence, every later one a duplicate. A single supervisor thread
//! owns the sinks and the early-exit policies, and a one-shot cancel
//! token tears the whole pipeline down cooperatively with partial
//! results.
//!
//! # Example
//!
//! ```no_run
//! use dupes::{filter_dir, Options};
//!
//! let opts = Options {
//!     recursive: true,
//!     ..Options::default()
//! };
//! let outcome = filter_dir("photos", opts);
//! let stats = outcome.sums.stats();
//! println!("{stats}");
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod fs;
pub mod sums;
pub mod sync;

mod hasher;
mod lines;
mod pool;
mod walker;

pub use error::{ErrorList, FilterError};
pub use filter::{filter_dir, filter_stream, Options, Outcome};
pub use sums::{FileMeta, Stats, Sum, Sums};
pub use sync::CancelToken;
