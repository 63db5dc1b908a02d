//! Pipeline assembly and the supervising event loop.
//!
//! [`filter_stream`] and [`filter_dir`] wire a path source into the
//! hashing pool, then sit in a single event loop multiplexing the unique,
//! duplicate, and error streams. All sink writes happen on the supervisor
//! thread, early-exit policies are applied here, and on every way out the
//! pipeline is cancelled so that no worker thread outlives the call.

use std::cmp;
use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, never, select, Receiver};
use tracing::debug;

use crate::error::{ErrorList, FilterError};
use crate::fs::{FileSystem, OsFs};
use crate::hasher::{self, HashPool};
use crate::lines;
use crate::sums::Sums;
use crate::sync::{CancelToken, Never, WaitGroup, WaitGuard};
use crate::walker::{self, DirWalker, WalkOptions};

/// Configuration for [`filter_stream`] and [`filter_dir`].
#[derive(Default)]
pub struct Options {
    /// Follow symbolic links; files are recorded under the link target's
    /// path. Cycles of followed links are not detected.
    pub follow_symlinks: bool,
    /// Recurse when reading from a directory.
    pub recursive: bool,
    /// Stop at the first error.
    pub exit_on_error: bool,
    /// Stop at the first file with a previously-seen checksum.
    pub exit_on_dup: bool,
    /// External cancellation handle; trigger it to request a cooperative
    /// shutdown with partial results.
    pub cancel: Option<CancelToken>,
    /// Sink for paths with previously-unseen checksums, one per line.
    pub uniq_writer: Option<Box<dyn Write>>,
    /// Sink for paths with previously-seen checksums, one per line.
    pub dup_writer: Option<Box<dyn Write>>,
    /// Sink for errors, one per line.
    pub err_writer: Option<Box<dyn Write>>,
    /// Worker budget; defaults to the host's logical CPU count.
    pub workers: Option<usize>,
    /// Filesystem backend; defaults to the host filesystem.
    pub fs: Option<Arc<dyn FileSystem>>,
}

impl Options {
    fn filesystem(&self) -> Arc<dyn FileSystem> {
        self.fs.clone().unwrap_or_else(|| Arc::new(OsFs))
    }

    fn procs(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Everything a finished run produces: the checksum index and the errors
/// observed along the way. The index is always valid, even after an early
/// exit or a cancellation; it then holds a partial snapshot.
pub struct Outcome {
    pub sums: Sums,
    pub errors: ErrorList,
}

impl Outcome {
    /// True when the run recorded no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Splits into the index and, when any were recorded, the errors.
    pub fn into_result(self) -> Result<Sums, ErrorList> {
        if self.errors.is_empty() {
            Ok(self.sums)
        } else {
            Err(self.errors)
        }
    }
}

/// Reads newline-delimited file paths from `reader` and evaluates each
/// file in search of duplicate checksums. An empty line ends the stream.
pub fn filter_stream<R: Read + Send + 'static>(reader: R, mut opts: Options) -> Outcome {
    let fs = opts.filesystem();
    let workers = opts.procs();
    debug!(workers, "starting stream filter");
    let input = lines::read_lines(reader);
    match stream_pipeline(input, workers, opts.follow_symlinks, fs) {
        Ok(pipeline) => run(pipeline, &mut opts),
        Err(err) => failed(err, &mut opts),
    }
}

/// Like [`filter_stream`], but evaluates the files under the directory at
/// `path`, recursively when [`Options::recursive`] is set.
pub fn filter_dir(path: &str, mut opts: Options) -> Outcome {
    let fs = opts.filesystem();
    let procs = opts.procs();
    let walkers = ratio_procs(procs, 1, 4);
    let hashers = ratio_procs(procs, 3, 4);
    debug!(dir = %path, walkers, hashers, "starting directory filter");
    match dir_pipeline(
        path.to_string(),
        walkers,
        hashers,
        opts.follow_symlinks,
        opts.recursive,
        fs,
    ) {
        Ok(pipeline) => run(pipeline, &mut opts),
        Err(err) => failed(err, &mut opts),
    }
}

/// The greater of `procs * num / den` and one. The walker and hasher
/// pools split one parallelism budget 1:3 in directory mode.
fn ratio_procs(procs: usize, num: usize, den: usize) -> usize {
    cmp::max(procs * num / den, 1)
}

/// A wired-up set of components and their merged output streams.
struct Pipeline {
    uniq: Receiver<String>,
    dup: Receiver<String>,
    errors: Receiver<FilterError>,
    sums: Sums,
    walker: Option<DirWalker>,
    hashers: HashPool,
    merge_done: Option<WaitGroup>,
    cancel: CancelToken,
}

impl Pipeline {
    /// Stops every component and blocks until all of their workers have
    /// returned. Idempotent.
    fn cancel(&self) {
        self.cancel.trigger();
        match &self.walker {
            Some(walker) => {
                thread::scope(|scope| {
                    scope.spawn(|| walker.cancel());
                    scope.spawn(|| self.hashers.cancel());
                });
            }
            None => self.hashers.cancel(),
        }
        if let Some(merge) = &self.merge_done {
            merge.wait();
        }
    }
}

fn stream_pipeline(
    input: Receiver<String>,
    workers: usize,
    follow_symlinks: bool,
    fs: Arc<dyn FileSystem>,
) -> Result<Pipeline, FilterError> {
    let cancel = CancelToken::new();
    let sums = Sums::new();
    let pool = hasher::spawn(input, workers, follow_symlinks, fs, sums.clone(), cancel.clone())
        .map_err(|source| FilterError::Spawn {
            name: "hasher",
            source,
        })?;
    Ok(Pipeline {
        uniq: pool.uniq().clone(),
        dup: pool.dup().clone(),
        errors: pool.errors().clone(),
        sums,
        walker: None,
        hashers: pool,
        merge_done: None,
        cancel,
    })
}

fn dir_pipeline(
    root: String,
    walkers: usize,
    hashers: usize,
    follow_symlinks: bool,
    recursive: bool,
    fs: Arc<dyn FileSystem>,
) -> Result<Pipeline, FilterError> {
    let cancel = CancelToken::new();
    let sums = Sums::new();
    let walk_opts = WalkOptions {
        follow_symlinks,
        recursive,
    };
    let walker = walker::spawn(root, walkers, walk_opts, Arc::clone(&fs), cancel.clone())
        .map_err(|source| FilterError::Spawn {
            name: "walker",
            source,
        })?;
    let pool = match hasher::spawn(
        walker.files().clone(),
        hashers,
        follow_symlinks,
        fs,
        sums.clone(),
        cancel.clone(),
    ) {
        Ok(pool) => pool,
        Err(source) => {
            cancel.trigger();
            walker.cancel();
            return Err(FilterError::Spawn {
                name: "hasher",
                source,
            });
        }
    };
    let (errors, merge_done) = match merge_errors(
        [walker.errors().clone(), pool.errors().clone()],
        cancel.clone(),
    ) {
        Ok(merged) => merged,
        Err(source) => {
            cancel.trigger();
            walker.cancel();
            pool.cancel();
            return Err(FilterError::Spawn {
                name: "error merge",
                source,
            });
        }
    };
    Ok(Pipeline {
        uniq: pool.uniq().clone(),
        dup: pool.dup().clone(),
        errors,
        sums,
        walker: Some(walker),
        hashers: pool,
        merge_done: Some(merge_done),
        cancel,
    })
}

/// Forwards errors from both component streams onto one channel. The
/// merged channel closes once both inputs have closed; forwarders also
/// stop on cancellation so they can never outlive the run.
fn merge_errors(
    inputs: [Receiver<FilterError>; 2],
    cancel: CancelToken,
) -> std::io::Result<(Receiver<FilterError>, WaitGroup)> {
    let (tx, rx) = bounded(0);
    let done = WaitGroup::new();
    for (i, input) in inputs.into_iter().enumerate() {
        let tx = tx.clone();
        let cancel_rx = cancel.receiver();
        let guard = WaitGuard::new(&done);
        let spawned = thread::Builder::new()
            .name(format!("err-merge-{i}"))
            .spawn(move || {
                let _guard = guard;
                while let Ok(err) = input.recv() {
                    select! {
                        recv(cancel_rx) -> _ => return,
                        send(tx, err) -> _ => {},
                    }
                }
            });
        if let Err(err) = spawned {
            cancel.trigger();
            done.wait();
            return Err(err);
        }
    }
    Ok((rx, done))
}

/// The supervising event loop. Multiplexes the cancellation handle and the
/// three output streams, writes to the configured sinks, applies the
/// early-exit policies, and tears the pipeline down before returning.
fn run(pipeline: Pipeline, opts: &mut Options) -> Outcome {
    let mut errors = ErrorList::new();
    let cancel_rx: Receiver<Never> = match &opts.cancel {
        Some(token) => token.receiver(),
        None => never(),
    };
    let uniq_rx = pipeline.uniq.clone();
    let dup_rx = pipeline.dup.clone();
    let err_rx = pipeline.errors.clone();

    let mut completed = false;
    loop {
        select! {
            recv(cancel_rx) -> _ => break,
            recv(err_rx) -> msg => match msg {
                Ok(err) => {
                    if let Some(w) = opts.err_writer.as_mut() {
                        let _ = writeln!(w, "{err}");
                    }
                    errors.push(err);
                    if opts.exit_on_error {
                        break;
                    }
                }
                Err(_) => {
                    completed = true;
                    break;
                }
            },
            recv(dup_rx) -> msg => match msg {
                Ok(path) => {
                    if let Some(w) = opts.dup_writer.as_mut() {
                        let _ = writeln!(w, "{path}");
                    }
                    if opts.exit_on_dup {
                        break;
                    }
                }
                Err(_) => {
                    completed = true;
                    break;
                }
            },
            recv(uniq_rx) -> msg => match msg {
                Ok(path) => {
                    if let Some(w) = opts.uniq_writer.as_mut() {
                        let _ = writeln!(w, "{path}");
                    }
                }
                Err(_) => {
                    completed = true;
                    break;
                }
            },
        }
    }

    if completed {
        // The streams close together once the workers exit, but events may
        // still be buffered or mid-handoff when the first disconnect is
        // observed. Finished runs drain them so every observation lands in
        // the sinks and the aggregate.
        while let Ok(err) = err_rx.recv() {
            if let Some(w) = opts.err_writer.as_mut() {
                let _ = writeln!(w, "{err}");
            }
            errors.push(err);
        }
        while let Ok(path) = dup_rx.try_recv() {
            if let Some(w) = opts.dup_writer.as_mut() {
                let _ = writeln!(w, "{path}");
            }
        }
        while let Ok(path) = uniq_rx.try_recv() {
            if let Some(w) = opts.uniq_writer.as_mut() {
                let _ = writeln!(w, "{path}");
            }
        }
    }

    pipeline.cancel();
    debug!(stats = %pipeline.sums.stats(), errors = errors.len(), "filter finished");
    Outcome {
        sums: pipeline.sums.clone(),
        errors,
    }
}

fn failed(err: FilterError, opts: &mut Options) -> Outcome {
    if let Some(w) = opts.err_writer.as_mut() {
        let _ = writeln!(w, "{err}");
    }
    let mut errors = ErrorList::new();
    errors.push(err);
    Outcome {
        sums: Sums::new(),
        errors,
    }
}
