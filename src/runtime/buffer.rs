//! Bounded pool of fixed-size read buffers.
//!
//! Every accepted connection leases one buffer for the lifetime of the
//! connection and returns it on teardown. Buffers are allocated on first use
//! and then recycled, so memory is bounded by `limit * buffer_size` without
//! paying for the whole pool up front.

/// Pool of fixed-size buffers identified by index.
///
/// The pool tracks which buffers are free via a LIFO free list so that a
/// recently released (and likely cache-warm) buffer is handed out first.
pub(crate) struct BufferPool {
    /// Buffer storage. Grows up to `limit` entries, never shrinks.
    buffers: Vec<Box<[u8]>>,
    /// Stack of released buffer indices.
    free_list: Vec<usize>,
    /// Size of each buffer.
    buffer_size: usize,
    /// Maximum number of buffers the pool will ever allocate.
    limit: usize,
}

impl BufferPool {
    /// Create an empty pool.
    ///
    /// # Arguments
    /// * `limit` - Maximum number of buffers that may be leased at once
    /// * `size` - Size of each buffer in bytes
    pub(crate) fn new(limit: usize, size: usize) -> Self {
        debug_assert!(size > 0, "buffer size must be positive");
        Self {
            buffers: Vec::new(),
            free_list: Vec::new(),
            buffer_size: size,
            limit,
        }
    }

    /// Lease a buffer from the pool.
    ///
    /// Returns `None` if `limit` buffers are already leased.
    pub(crate) fn alloc(&mut self) -> Option<usize> {
        if let Some(idx) = self.free_list.pop() {
            return Some(idx);
        }
        if self.buffers.len() >= self.limit {
            return None;
        }
        self.buffers
            .push(vec![0u8; self.buffer_size].into_boxed_slice());
        Some(self.buffers.len() - 1)
    }

    /// Return a buffer to the pool.
    pub(crate) fn free(&mut self, idx: usize) {
        debug_assert!(idx < self.buffers.len(), "buffer index out of bounds");
        debug_assert!(!self.free_list.contains(&idx), "buffer freed twice");
        self.free_list.push(idx);
    }

    /// Get an immutable reference to a buffer.
    ///
    /// # Panics
    /// Panics if `idx` was never handed out by [`alloc`](Self::alloc).
    pub(crate) fn get(&self, idx: usize) -> &[u8] {
        &self.buffers[idx]
    }

    /// Get a mutable reference to a buffer.
    ///
    /// # Panics
    /// Panics if `idx` was never handed out by [`alloc`](Self::alloc).
    pub(crate) fn get_mut(&mut self, idx: usize) -> &mut [u8] {
        &mut self.buffers[idx]
    }

    /// Number of buffers currently leased.
    pub(crate) fn in_use(&self) -> usize {
        self.buffers.len() - self.free_list.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_pool_basic() {
        let mut pool = BufferPool::new(3, 1024);

        assert_eq!(pool.in_use(), 0);

        let b0 = pool.alloc().unwrap();
        let b1 = pool.alloc().unwrap();
        let b2 = pool.alloc().unwrap();

        assert_eq!(pool.in_use(), 3);
        assert!(pool.alloc().is_none());
        assert_eq!(pool.get(b0).len(), 1024);

        // Free and reallocate
        pool.free(b1);
        assert_eq!(pool.in_use(), 2);

        let b3 = pool.alloc().unwrap();
        assert_eq!(b3, b1); // LIFO reuse

        pool.get_mut(b0)[0] = 42;
        assert_eq!(pool.get(b0)[0], 42);

        pool.free(b0);
        pool.free(b2);
        pool.free(b3);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn test_buffer_pool_allocates_lazily() {
        let mut pool = BufferPool::new(1000, 64);
        assert!(pool.buffers.is_empty());

        let idx = pool.alloc().unwrap();
        assert_eq!(pool.buffers.len(), 1);

        pool.free(idx);
        let again = pool.alloc().unwrap();
        assert_eq!(again, idx);
        assert_eq!(pool.buffers.len(), 1);
    }

    #[test]
    fn test_buffer_pool_zero_limit() {
        let mut pool = BufferPool::new(0, 64);
        assert!(pool.alloc().is_none());
        assert_eq!(pool.in_use(), 0);
    }
}
