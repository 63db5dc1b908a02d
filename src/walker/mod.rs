//! Bounded parallel directory walker.
//!
//! Worker threads pull directories from a bounded queue and emit the file
//! paths they contain. Submitting to a full queue falls back to processing
//! the directory on the submitting thread, which bounds memory and cannot
//! deadlock when every worker is fanning out at once. An in-flight counter
//! drives termination: when the last directory finishes, the output
//! streams close and the workers exit.

mod queue;

use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use tracing::{debug, trace};

use crate::error::FilterError;
use crate::fs::{self, FileSystem};
use crate::sync::{CancelToken, Never, WaitGroup, WaitGuard};

use queue::{DirJob, DirQueue};

/// Behavior switches for a directory walk.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WalkOptions {
    /// Resolve symbolic links and evaluate their targets. Cycles of
    /// followed links are not detected.
    pub follow_symlinks: bool,
    /// Descend into subdirectories.
    pub recursive: bool,
}

/// Handle on a running walk.
pub(crate) struct DirWalker {
    ctx: Arc<WalkerCtx>,
    files: Receiver<String>,
    errors: Receiver<FilterError>,
    busy_workers: WaitGroup,
    shutdown: WaitGroup,
}

struct WalkerCtx {
    fs: Arc<dyn FileSystem>,
    opts: WalkOptions,
    queue: DirQueue,
    busy_dirs: WaitGroup,
    cancel: CancelToken,
    cancel_rx: Receiver<Never>,
    done: CancelToken,
}

#[derive(Clone)]
struct Outputs {
    files: Sender<String>,
    errors: Sender<FilterError>,
}

/// Starts `workers` walker threads rooted at `root`. Discovered file paths
/// and per-entry errors arrive on the returned handle's streams; both
/// close once the walk has fully drained.
pub(crate) fn spawn(
    root: String,
    workers: usize,
    opts: WalkOptions,
    fs: Arc<dyn FileSystem>,
    cancel: CancelToken,
) -> io::Result<DirWalker> {
    let (files_tx, files_rx) = bounded(workers);
    let (errors_tx, errors_rx) = bounded(0);
    let cancel_rx = cancel.receiver();
    let ctx = Arc::new(WalkerCtx {
        fs,
        opts,
        queue: DirQueue::new(workers),
        busy_dirs: WaitGroup::new(),
        cancel,
        cancel_rx,
        done: CancelToken::new(),
    });
    let out = Outputs {
        files: files_tx,
        errors: errors_tx,
    };
    let busy_workers = WaitGroup::new();
    let shutdown = WaitGroup::new();

    for id in 0..workers {
        let worker_ctx = Arc::clone(&ctx);
        let out = out.clone();
        let busy = WaitGuard::new(&busy_workers);
        let spawned = thread::Builder::new()
            .name(format!("walker-{id}"))
            .spawn(move || {
                let _busy = busy;
                worker_loop(&worker_ctx, &out);
            });
        if let Err(err) = spawned {
            ctx.done.trigger();
            busy_workers.wait();
            return Err(err);
        }
    }

    // The closer seeds the root, then shuts the streams down once the
    // in-flight count drains and every worker has exited.
    let closer = {
        let ctx = Arc::clone(&ctx);
        let busy_workers = busy_workers.clone();
        let guard = WaitGuard::new(&shutdown);
        thread::Builder::new()
            .name("walker-closer".into())
            .spawn(move || {
                let _guard = guard;
                enqueue(&ctx, &out, root);
                ctx.busy_dirs.wait();
                ctx.done.trigger();
                busy_workers.wait();
                debug!(
                    enqueued = ctx.queue.stats().enqueued(),
                    inline = ctx.queue.stats().inline(),
                    "directory walk drained"
                );
                // `out` drops here, closing the file and error streams.
            })
    };
    if let Err(err) = closer {
        ctx.done.trigger();
        busy_workers.wait();
        return Err(err);
    }

    Ok(DirWalker {
        ctx,
        files: files_rx,
        errors: errors_rx,
        busy_workers,
        shutdown,
    })
}

impl DirWalker {
    pub fn files(&self) -> &Receiver<String> {
        &self.files
    }

    pub fn errors(&self) -> &Receiver<FilterError> {
        &self.errors
    }

    /// Requests shutdown and blocks until every worker and every in-flight
    /// directory handler has returned. Safe to call repeatedly and from
    /// multiple threads.
    pub fn cancel(&self) {
        self.ctx.cancel.trigger();
        self.ctx.busy_dirs.wait();
        self.busy_workers.wait();
        self.shutdown.wait();
    }
}

fn worker_loop(ctx: &Arc<WalkerCtx>, out: &Outputs) {
    let queue_rx = ctx.queue.receiver();
    let done_rx = ctx.done.receiver();
    // Workers keep draining the queue after cancellation so that queued
    // in-flight tokens are always released; handlers bail out fast once
    // the cancel signal is up.
    loop {
        select! {
            recv(done_rx) -> _ => return,
            recv(queue_rx) -> job => match job {
                Ok(job) => handle(ctx, out, job),
                Err(_) => return,
            },
        }
    }
}

/// Submits a directory for processing. When the queue is saturated the
/// directory is served on the calling thread instead, so producers can
/// never deadlock behind their own output.
fn enqueue(ctx: &Arc<WalkerCtx>, out: &Outputs, path: String) {
    let token = WaitGuard::new(&ctx.busy_dirs);
    if ctx.cancel.is_triggered() {
        return; // token drops: the work item is accounted as done
    }
    if let Err(job) = ctx.queue.offer(DirJob { path, token }) {
        handle(ctx, out, job);
    }
}

/// Processes one directory: emits the files it contains and enqueues its
/// subdirectories. A root that resolves to a regular file is emitted
/// directly. The in-flight token rides in `job` and is released on every
/// exit path.
fn handle(ctx: &Arc<WalkerCtx>, out: &Outputs, job: DirJob) {
    let DirJob { path, token: _token } = job;
    if ctx.cancel.is_triggered() {
        return;
    }
    let (info, path) = match fs::resolve(ctx.fs.as_ref(), &path, ctx.opts.follow_symlinks) {
        Ok(resolved) => resolved,
        Err(err) => {
            emit_error(ctx, out, err);
            return;
        }
    };
    if !info.is_dir {
        emit_file(ctx, out, path);
        return;
    }

    let names = match ctx.fs.read_dir_names(&path) {
        Ok(names) => names,
        Err(source) => {
            emit_error(ctx, out, FilterError::ReadDir { path, source });
            return;
        }
    };
    trace!(dir = %path, entries = names.len(), "reading directory");

    for name in names {
        if ctx.cancel.is_triggered() {
            return;
        }
        let child = fs::join(&path, &name);
        match fs::resolve(ctx.fs.as_ref(), &child, ctx.opts.follow_symlinks) {
            Ok((info, child)) => {
                if !info.is_dir {
                    emit_file(ctx, out, child);
                } else if ctx.opts.recursive {
                    enqueue(ctx, out, child);
                }
            }
            Err(err) => emit_error(ctx, out, err),
        }
    }
}

fn emit_file(ctx: &WalkerCtx, out: &Outputs, path: String) {
    select! {
        recv(ctx.cancel_rx) -> _ => {},
        send(out.files, path) -> _ => {},
    }
}

fn emit_error(ctx: &WalkerCtx, out: &Outputs, err: FilterError) {
    select! {
        recv(ctx.cancel_rx) -> _ => {},
        send(out.errors, err) -> _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mem::MemFs;

    fn sample_fs() -> MemFs {
        let mut fs = MemFs::new();
        fs.insert("root/black", b"black".to_vec());
        fs.insert("root/red", b"red".to_vec());
        fs.insert("root/foo/blue", b"blue".to_vec());
        fs.insert("root/foo/bar/green", b"green".to_vec());
        fs.insert("other/lime", b"lime".to_vec());
        fs.symlink("root/link", "other/lime");
        fs
    }

    fn walk(fs: MemFs, root: &str, workers: usize, opts: WalkOptions) -> (Vec<String>, Vec<String>) {
        let walker = spawn(
            root.to_string(),
            workers,
            opts,
            Arc::new(fs),
            CancelToken::new(),
        )
        .unwrap();
        drain(&walker)
    }

    fn drain(walker: &DirWalker) -> (Vec<String>, Vec<String>) {
        let files_rx = walker.files().clone();
        let errors_rx = walker.errors().clone();
        let mut files = Vec::new();
        let mut errors = Vec::new();
        let mut files_open = true;
        let mut errors_open = true;
        loop {
            if files_open && errors_open {
                select! {
                    recv(files_rx) -> msg => match msg {
                        Ok(path) => files.push(path),
                        Err(_) => files_open = false,
                    },
                    recv(errors_rx) -> msg => match msg {
                        Ok(err) => errors.push(err.to_string()),
                        Err(_) => errors_open = false,
                    },
                }
            } else if files_open {
                match files_rx.recv() {
                    Ok(path) => files.push(path),
                    Err(_) => break,
                }
            } else if errors_open {
                match errors_rx.recv() {
                    Ok(err) => errors.push(err.to_string()),
                    Err(_) => break,
                }
            } else {
                break;
            }
        }
        files.sort();
        (files, errors)
    }

    #[test]
    fn non_recursive_walk_stays_shallow() {
        let (files, errors) = walk(sample_fs(), "root", 2, WalkOptions::default());
        assert_eq!(files, vec!["root/black", "root/link", "root/red"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn recursive_walk_descends() {
        let opts = WalkOptions {
            recursive: true,
            ..WalkOptions::default()
        };
        let (files, errors) = walk(sample_fs(), "root", 2, opts);
        assert_eq!(
            files,
            vec![
                "root/black",
                "root/foo/bar/green",
                "root/foo/blue",
                "root/link",
                "root/red"
            ]
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn followed_links_emit_the_target_path() {
        let opts = WalkOptions {
            follow_symlinks: true,
            ..WalkOptions::default()
        };
        let (files, _) = walk(sample_fs(), "root", 2, opts);
        assert_eq!(files, vec!["other/lime", "root/black", "root/red"]);
    }

    #[test]
    fn file_root_is_emitted_directly() {
        let (files, errors) = walk(sample_fs(), "root/black", 1, WalkOptions::default());
        assert_eq!(files, vec!["root/black"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_root_reports_one_error() {
        let (files, errors) = walk(sample_fs(), "bogus", 2, WalkOptions::default());
        assert!(files.is_empty());
        assert_eq!(errors, vec!["lstat bogus: file does not exist"]);
    }

    #[test]
    fn single_worker_falls_back_to_inline_processing() {
        // Capacity 1 forces the saturation path on a deep tree.
        let mut fs = MemFs::new();
        for i in 0..6 {
            fs.insert(format!("root/d{i}/leaf"), b"x".to_vec());
        }
        let opts = WalkOptions {
            recursive: true,
            ..WalkOptions::default()
        };
        let (files, errors) = walk(fs, "root", 1, opts);
        assert_eq!(files.len(), 6);
        assert!(errors.is_empty());
    }

    #[test]
    fn cancel_unblocks_a_walk_nobody_is_draining() {
        let walker = spawn(
            "root".to_string(),
            2,
            WalkOptions {
                recursive: true,
                ..WalkOptions::default()
            },
            Arc::new(sample_fs()),
            CancelToken::new(),
        )
        .unwrap();

        // No consumer on the file stream: workers may be parked on their
        // output sends. Cancelling must still shut everything down.
        walker.cancel();
        walker.cancel(); // idempotent

        let (files, _) = drain(&walker);
        assert!(files.len() <= 5);
    }
}
