//! Hashing worker pool.
//!
//! Workers consume candidate paths, read each file fully into a pooled
//! buffer, digest the contents, and classify the file against the shared
//! checksum index: the worker whose append lands first emits on the unique
//! stream, every other one on the duplicate stream. Directories arriving
//! on the input are silently skipped, so a path list fed from stdin may
//! name them without consequence.

use std::io::{self, Read};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use sha1::{Digest, Sha1};
use tracing::trace;

use crate::error::FilterError;
use crate::fs::{self, FileSystem};
use crate::pool::BufferPool;
use crate::sums::{FileMeta, Sum, Sums};
use crate::sync::{CancelToken, Never, WaitGroup, WaitGuard};

/// Handle on a running pool of hashing workers.
pub(crate) struct HashPool {
    uniq: Receiver<String>,
    dup: Receiver<String>,
    errors: Receiver<FilterError>,
    cancel: CancelToken,
    busy_workers: WaitGroup,
}

struct HasherCtx {
    fs: Arc<dyn FileSystem>,
    follow_symlinks: bool,
    sums: Sums,
    bufs: BufferPool,
    cancel_rx: Receiver<Never>,
}

#[derive(Clone)]
struct Outputs {
    uniq: Sender<String>,
    dup: Sender<String>,
    errors: Sender<FilterError>,
}

/// Starts `workers` hashing threads fed from `input`. The unique,
/// duplicate, and error streams all close once every worker has exited.
pub(crate) fn spawn(
    input: Receiver<String>,
    workers: usize,
    follow_symlinks: bool,
    fs: Arc<dyn FileSystem>,
    sums: Sums,
    cancel: CancelToken,
) -> io::Result<HashPool> {
    let (uniq_tx, uniq_rx) = bounded(workers);
    let (dup_tx, dup_rx) = bounded(workers);
    let (errors_tx, errors_rx) = bounded(0);
    let ctx = Arc::new(HasherCtx {
        fs,
        follow_symlinks,
        sums,
        bufs: BufferPool::new(),
        cancel_rx: cancel.receiver(),
    });
    let out = Outputs {
        uniq: uniq_tx,
        dup: dup_tx,
        errors: errors_tx,
    };
    let busy_workers = WaitGroup::new();

    for id in 0..workers {
        let ctx = Arc::clone(&ctx);
        let out = out.clone();
        let input = input.clone();
        let busy = WaitGuard::new(&busy_workers);
        let spawned = thread::Builder::new()
            .name(format!("hasher-{id}"))
            .spawn(move || {
                let _busy = busy;
                worker_loop(&ctx, input, &out);
            });
        if let Err(err) = spawned {
            cancel.trigger();
            busy_workers.wait();
            return Err(err);
        }
    }

    Ok(HashPool {
        uniq: uniq_rx,
        dup: dup_rx,
        errors: errors_rx,
        cancel,
        busy_workers,
    })
}

impl HashPool {
    pub fn uniq(&self) -> &Receiver<String> {
        &self.uniq
    }

    pub fn dup(&self) -> &Receiver<String> {
        &self.dup
    }

    pub fn errors(&self) -> &Receiver<FilterError> {
        &self.errors
    }

    /// Requests shutdown and blocks until every worker has returned. Safe
    /// to call repeatedly and from multiple threads.
    pub fn cancel(&self) {
        self.cancel.trigger();
        self.busy_workers.wait();
    }
}

fn worker_loop(ctx: &HasherCtx, input: Receiver<String>, out: &Outputs) {
    loop {
        select! {
            recv(ctx.cancel_rx) -> _ => return,
            recv(input) -> msg => match msg {
                Ok(path) => handle(ctx, out, path),
                Err(_) => return,
            },
        }
    }
}

/// Stats, reads, and digests one file, then classifies it against the
/// shared index.
fn handle(ctx: &HasherCtx, out: &Outputs, path: String) {
    let (info, path) = match fs::resolve(ctx.fs.as_ref(), &path, ctx.follow_symlinks) {
        Ok(resolved) => resolved,
        Err(err) => {
            emit_error(ctx, out, err);
            return;
        }
    };
    if info.is_dir {
        trace!(path = %path, "skipping directory");
        return;
    }

    let mut file = match ctx.fs.open(&path) {
        Ok(file) => file,
        Err(source) => {
            emit_error(ctx, out, FilterError::Open { path, source });
            return;
        }
    };

    let mut buf = ctx.bufs.acquire();
    if let Err(source) = file.read_to_end(&mut buf) {
        emit_error(ctx, out, FilterError::Read { path, source });
        return; // buffer returns to the pool on drop
    }
    let sum = Sum::new(Sha1::digest(&buf[..]).into());
    drop(buf);

    let meta = FileMeta {
        path: path.clone(),
        size: info.size,
        is_dir: info.is_dir,
    };
    if ctx.sums.append(sum, meta) {
        emit(ctx, out, true, path);
    } else {
        emit(ctx, out, false, path);
    }
}

fn emit(ctx: &HasherCtx, out: &Outputs, dup: bool, path: String) {
    if dup {
        select! {
            recv(ctx.cancel_rx) -> _ => {},
            send(out.dup, path) -> _ => {},
        }
    } else {
        select! {
            recv(ctx.cancel_rx) -> _ => {},
            send(out.uniq, path) -> _ => {},
        }
    }
}

fn emit_error(ctx: &HasherCtx, out: &Outputs, err: FilterError) {
    select! {
        recv(ctx.cancel_rx) -> _ => {},
        send(out.errors, err) -> _ => {},
    }
}
