//! Message buffer allocation strategies
//!
//! Serialized packets are held in [`MessageBuffer`]s obtained from a
//! [`MessageAllocator`]. The default strategy allocates from the heap; the
//! static strategy draws from a fixed pool of equal-size buffers so the
//! connection runtime can operate without dynamic allocation. The runtime
//! is unaware which variant is in use.

use crate::error::{MqttError, Result};
use crossbeam_queue::ArrayQueue;
use std::sync::Arc;

/// Configuration for the fixed message buffer pool
#[derive(Debug, Clone)]
pub struct MessagePoolConfig {
    /// Number of buffers in the pool
    pub buffers: usize,
    /// Size of each buffer in bytes
    pub buffer_size: usize,
}

impl Default for MessagePoolConfig {
    fn default() -> Self {
        Self {
            buffers: 8,
            buffer_size: 1024,
        }
    }
}

/// A fixed pool of equal-size message buffers
///
/// Allocation takes a free buffer from the pool and fails when the
/// requested size exceeds the buffer size or no buffer is free. Buffers are
/// zeroed when they return to the pool.
pub struct MessagePool {
    free: ArrayQueue<Box<[u8]>>,
    buffer_size: usize,
}

impl MessagePool {
    /// Creates a pool with `buffers` buffers of `buffer_size` bytes each
    #[must_use]
    pub fn new(config: &MessagePoolConfig) -> Arc<Self> {
        let free = ArrayQueue::new(config.buffers);
        for _ in 0..config.buffers {
            // The queue was sized to hold every buffer.
            let _ = free.push(vec![0u8; config.buffer_size].into_boxed_slice());
        }

        Arc::new(Self {
            free,
            buffer_size: config.buffer_size,
        })
    }

    /// Size of each buffer in the pool
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of free buffers currently in the pool
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    fn take(pool: &Arc<Self>, size: usize) -> Result<MessageBuffer> {
        if size > pool.buffer_size {
            tracing::warn!(
                requested = size,
                buffer_size = pool.buffer_size,
                "Requested message buffer exceeds pool buffer size"
            );
            return Err(MqttError::NoMemory);
        }

        match pool.free.pop() {
            Some(data) => Ok(MessageBuffer {
                data,
                len: size,
                pool: Some(Arc::clone(pool)),
            }),
            None => {
                tracing::warn!("Message buffer pool exhausted");
                Err(MqttError::NoMemory)
            }
        }
    }

    fn give_back(&self, mut data: Box<[u8]>) {
        data.fill(0);
        // The pool can never overflow: every buffer came from it.
        let _ = self.free.push(data);
    }
}

/// Strategy for allocating message buffers
#[derive(Clone, Default)]
pub enum MessageAllocator {
    /// Allocate each buffer from the heap
    #[default]
    Heap,
    /// Allocate from a fixed pool of equal-size buffers
    Static(Arc<MessagePool>),
}

impl MessageAllocator {
    /// Allocates a buffer of `size` bytes
    ///
    /// # Errors
    ///
    /// Returns `MqttError::NoMemory` when the static pool is exhausted or
    /// the requested size exceeds the pool's buffer size.
    pub fn alloc(&self, size: usize) -> Result<MessageBuffer> {
        match self {
            Self::Heap => Ok(MessageBuffer {
                data: vec![0u8; size].into_boxed_slice(),
                len: size,
                pool: None,
            }),
            Self::Static(pool) => MessagePool::take(pool, size),
        }
    }
}

/// A message buffer holding one serialized packet
///
/// Pool-backed buffers are zeroed and returned to their pool when dropped.
pub struct MessageBuffer {
    data: Box<[u8]>,
    len: usize,
    pool: Option<Arc<MessagePool>>,
}

impl MessageBuffer {
    /// Length of the packet held in the buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The packet bytes
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// The packet bytes, mutably
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }
}

impl std::ops::Deref for MessageBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("len", &self.len)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for MessageBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.give_back(std::mem::take(&mut self.data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_alloc() {
        let allocator = MessageAllocator::Heap;
        let mut buf = allocator.alloc(16).unwrap();
        assert_eq!(buf.len(), 16);
        buf.as_mut_slice()[0] = 0x10;
        assert_eq!(buf.as_slice()[0], 0x10);
    }

    #[test]
    fn test_pool_exhaustion() {
        let pool = MessagePool::new(&MessagePoolConfig {
            buffers: 2,
            buffer_size: 64,
        });
        let allocator = MessageAllocator::Static(Arc::clone(&pool));

        let a = allocator.alloc(10).unwrap();
        let b = allocator.alloc(64).unwrap();
        assert_eq!(pool.available(), 0);

        // Pool empty: third allocation fails.
        assert_eq!(allocator.alloc(1).unwrap_err(), MqttError::NoMemory);

        drop(a);
        assert_eq!(pool.available(), 1);
        let c = allocator.alloc(8).unwrap();
        drop(b);
        drop(c);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_pool_rejects_oversized() {
        let pool = MessagePool::new(&MessagePoolConfig {
            buffers: 1,
            buffer_size: 32,
        });
        let allocator = MessageAllocator::Static(pool);
        assert_eq!(allocator.alloc(33).unwrap_err(), MqttError::NoMemory);
        assert!(allocator.alloc(32).is_ok());
    }

    #[test]
    fn test_pool_buffer_zeroed_on_return() {
        let pool = MessagePool::new(&MessagePoolConfig {
            buffers: 1,
            buffer_size: 8,
        });
        let allocator = MessageAllocator::Static(Arc::clone(&pool));

        let mut buf = allocator.alloc(8).unwrap();
        buf.as_mut_slice().fill(0xAA);
        drop(buf);

        let buf = allocator.alloc(8).unwrap();
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }
}
