//! Reusable byte buffers for file reads.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::Mutex;

/// Pool of byte buffers shared by the hashing workers.
///
/// Buffers keep whatever capacity they grew to, so steady-state reads
/// allocate nothing. Correctness does not depend on the hit rate.
#[derive(Clone, Default)]
pub(crate) struct BufferPool {
    free: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a cleared buffer out of the pool, allocating a fresh one when
    /// the pool is empty. The buffer returns to the pool when the guard
    /// drops.
    pub fn acquire(&self) -> PooledBuf {
        let mut buf = self.free.lock().pop().unwrap_or_default();
        buf.clear();
        PooledBuf {
            buf,
            pool: self.clone(),
        }
    }

    fn release(&self, buf: Vec<u8>) {
        self.free.lock().push(buf);
    }
}

/// A buffer checked out of a [`BufferPool`].
pub(crate) struct PooledBuf {
    buf: Vec<u8>,
    pool: BufferPool,
}

impl Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}
