//! Bounded directory queue with saturation fallback.
//!
//! The queue never blocks a producer: when it is full, the job is handed
//! back so the submitting thread can process the directory inline. That
//! rule is what keeps the walker deadlock-free when every worker is
//! fanning out at once, and it bounds queued memory to the worker count.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::sync::WaitGuard;

/// A directory pending enumeration, paired with the in-flight token that
/// keeps the walk alive until the directory is fully processed.
#[derive(Debug)]
pub(crate) struct DirJob {
    pub path: String,
    pub token: WaitGuard,
}

/// Counters describing queue traffic.
#[derive(Debug, Default)]
pub(crate) struct QueueStats {
    enqueued: AtomicU64,
    inline: AtomicU64,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Jobs served on the submitting thread because the queue was full.
    pub fn inline(&self) -> u64 {
        self.inline.load(Ordering::Relaxed)
    }
}

/// Bounded FIFO of pending directories.
pub(crate) struct DirQueue {
    tx: Sender<DirJob>,
    rx: Receiver<DirJob>,
    stats: QueueStats,
}

impl DirQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            stats: QueueStats::default(),
        }
    }

    pub fn receiver(&self) -> Receiver<DirJob> {
        self.rx.clone()
    }

    /// Offers a job without blocking. On saturation the job is handed back
    /// so the caller can process it inline.
    pub fn offer(&self, job: DirJob) -> Result<(), DirJob> {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                self.stats.inline.fetch_add(1, Ordering::Relaxed);
                Err(job)
            }
            Err(TrySendError::Disconnected(job)) => Err(job),
        }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }
}
