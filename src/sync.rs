//! One-shot cancellation broadcast and a reusable wait-group.
//!
//! These two primitives carry the pipeline's lifecycle: the cancel token
//! tells every worker to stop emitting, and wait-groups let a supervisor
//! block until all workers of a component have returned.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use parking_lot::{Condvar, Mutex};

/// Uninhabited message type: cancellation channels only ever disconnect.
pub enum Never {}

/// A one-shot broadcast signal.
///
/// Cloned tokens share the same state. The transition from armed to
/// triggered is one-way and idempotent, and every receiver observes it,
/// whether it subscribed before or after the trigger.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<Mutex<Option<Sender<Never>>>>,
    rx: Receiver<Never>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Fires the signal. Subsequent calls have no effect.
    pub fn trigger(&self) {
        self.tx.lock().take();
    }

    /// Non-blocking poll.
    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Blocks until the signal fires.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// A receiver that becomes ready when the signal fires, for use as a
    /// `select!` arm.
    pub fn receiver(&self) -> Receiver<Never> {
        self.rx.clone()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts outstanding units of work and lets any thread block until the
/// count returns to zero.
///
/// Unlike joining on thread handles, waiting does not consume the group
/// and may happen from several threads at once.
#[derive(Debug, Clone, Default)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

#[derive(Debug, Default)]
struct WaitGroupInner {
    count: Mutex<usize>,
    zero: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: usize) {
        *self.inner.count.lock() += n;
    }

    pub fn done(&self) {
        let mut count = self.inner.count.lock();
        *count = count.checked_sub(1).expect("wait-group count underflow");
        if *count == 0 {
            self.inner.zero.notify_all();
        }
    }

    /// Blocks until the count reaches zero; returns immediately if it
    /// already is.
    pub fn wait(&self) {
        let mut count = self.inner.count.lock();
        while *count > 0 {
            self.inner.zero.wait(&mut count);
        }
    }
}

/// RAII unit of work: increments the group on creation and decrements it
/// when dropped, so the count is released on every exit path.
#[derive(Debug)]
pub struct WaitGuard {
    wg: WaitGroup,
}

impl WaitGuard {
    pub fn new(wg: &WaitGroup) -> Self {
        wg.add(1);
        Self { wg: wg.clone() }
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        self.wg.done();
    }
}
