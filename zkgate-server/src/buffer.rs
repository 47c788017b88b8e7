//! Frame buffer pool.
//!
//! Sessions borrow one fixed-size buffer per in-flight frame and must
//! return it on every exit path, including errors. The pool keeps a
//! bounded free list; beyond that, returned buffers are simply dropped.
//! The outstanding counter exists so tests can assert conservation:
//! after all sessions finish, every borrowed buffer has come back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bytes::BytesMut;

use zkgate_proto::MAX_FRAME_SIZE;

/// Default capacity of the free list.
pub const DEFAULT_MAX_POOLED: usize = 32;

/// A bounded free list of frame-sized buffers.
#[derive(Debug)]
pub struct BufferPool {
    buffer_size: usize,
    max_pooled: usize,
    free: Mutex<Vec<BytesMut>>,
    outstanding: AtomicUsize,
}

impl BufferPool {
    /// Creates a pool handing out buffers of `buffer_size` capacity and
    /// retaining at most `max_pooled` idle ones.
    #[must_use]
    pub const fn new(buffer_size: usize, max_pooled: usize) -> Self {
        Self {
            buffer_size,
            max_pooled,
            free: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
        }
    }

    /// A pool sized for protocol frames.
    #[must_use]
    pub const fn for_frames() -> Self {
        Self::new(MAX_FRAME_SIZE, DEFAULT_MAX_POOLED)
    }

    /// Borrows an empty buffer with at least `buffer_size` capacity.
    #[must_use]
    pub fn get(&self) -> BytesMut {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        let pooled = self.lock().pop();
        pooled.unwrap_or_else(|| BytesMut::with_capacity(self.buffer_size))
    }

    /// Returns a borrowed buffer. The contents are cleared; capacity is
    /// kept for the next borrower.
    pub fn put(&self, mut buf: BytesMut) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        buf.clear();

        let mut free = self.lock();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }

    /// Number of buffers currently borrowed and not yet returned.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Capacity of the buffers this pool hands out.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BytesMut>> {
        self.free
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_put_balances_outstanding() {
        let pool = BufferPool::new(64, 4);
        assert_eq!(pool.outstanding(), 0);

        let a = pool.get();
        let b = pool.get();
        assert_eq!(pool.outstanding(), 2);

        pool.put(a);
        pool.put(b);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_returned_buffers_are_reused() {
        let pool = BufferPool::new(64, 4);

        let mut buf = pool.get();
        buf.extend_from_slice(b"junk");
        let reused_capacity = buf.capacity();
        pool.put(buf);

        let buf = pool.get();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), reused_capacity);
    }

    #[test]
    fn test_free_list_is_bounded() {
        let pool = BufferPool::new(64, 2);
        let bufs: Vec<_> = (0..5).map(|_| pool.get()).collect();
        for buf in bufs {
            pool.put(buf);
        }
        assert_eq!(pool.outstanding(), 0);
        assert!(pool.lock().len() <= 2);
    }

    #[test]
    fn test_frame_pool_matches_max_frame() {
        let pool = BufferPool::for_frames();
        assert_eq!(pool.buffer_size(), MAX_FRAME_SIZE);
        assert_eq!(pool.get().capacity(), MAX_FRAME_SIZE);
    }
}
