use std::ops::{Deref, DerefMut};
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{trace, warn};

use crate::ensure;
use crate::hci::buffer::{BufferTag, CommandBuffer, Priority, CMD_HDR};
use crate::hci::Error;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Upper bound on the number of buffers the pool will ever allocate.
    pub max_buffers: usize,
    /// Slots only [`Priority::High`] acquires may take.
    pub high_priority_reserve: usize,
    /// Minimum capacity of a newly allocated buffer, header included.
    pub initial_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_buffers: 8,
            high_priority_reserve: 1,
            initial_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub allocated: usize,
    pub free: usize,
    pub in_use: usize,
    /// Capacity new buffers are created with.
    pub block_size: usize,
}

/// Reusable command buffers, split into free lists per [`Priority`].
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    id: u64,
    config: PoolConfig,
    state: Mutex<PoolState>,
    released: Notify,
}

struct PoolState {
    free: [Vec<CommandBuffer>; Priority::COUNT],
    slots: Vec<Slot>,
    in_use: [usize; Priority::COUNT],
    block_size: usize,
}

impl PoolState {
    fn total_in_use(&self) -> usize {
        self.in_use.iter().sum()
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    in_use: bool,
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Self {
        let config = PoolConfig {
            max_buffers: config.max_buffers.max(1),
            high_priority_reserve: config.high_priority_reserve.min(config.max_buffers.saturating_sub(1)),
            initial_capacity: config.initial_capacity.max(CMD_HDR),
        };
        Self {
            shared: Arc::new(PoolShared {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                config,
                state: Mutex::new(PoolState {
                    free: Default::default(),
                    slots: Vec::new(),
                    in_use: [0; Priority::COUNT],
                    block_size: config.initial_capacity,
                }),
                released: Notify::new(),
            })
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.shared.config
    }

    /// Takes a buffer, waiting for a release if the pool is exhausted for `priority`.
    pub async fn acquire(&self, priority: Priority) -> PooledBuffer {
        loop {
            let mut released = pin!(self.shared.released.notified());
            released.as_mut().enable();
            if let Some(buffer) = self.try_acquire(priority) {
                return buffer;
            }
            trace!("Buffer pool exhausted for {:?} priority, waiting for a release", priority);
            released.await;
        }
    }

    /// Takes a buffer if one is available for `priority` without waiting.
    pub fn try_acquire(&self, priority: Priority) -> Option<PooledBuffer> {
        let config = &self.shared.config;
        let mut state = self.shared.state.lock();
        ensure!(state.total_in_use() < config.max_buffers);
        if priority == Priority::Low {
            ensure!(state.in_use[Priority::Low.index()] < config.max_buffers - config.high_priority_reserve);
        }

        let block_size = state.block_size;
        let mut buffer = match state.free[priority.index()].pop()
            .or_else(|| state.free[priority.other().index()].pop()) {
            Some(mut buffer) => {
                buffer.reserve(block_size);
                buffer
            }
            None => {
                ensure!(state.slots.len() < config.max_buffers);
                let slot = state.slots.len();
                state.slots.push(Slot::default());
                trace!("Allocating command buffer #{} ({} bytes)", slot, block_size);
                let mut buffer = CommandBuffer::with_capacity(priority, block_size);
                buffer.tag = Some(BufferTag { pool: self.shared.id, slot, generation: 0 });
                buffer
            }
        };

        let tag = buffer.tag.as_mut()?;
        let slot = state.slots.get_mut(tag.slot)?;
        slot.in_use = true;
        tag.generation = slot.generation;
        state.in_use[priority.index()] += 1;
        buffer.set_priority(priority);
        buffer.clear();
        Some(PooledBuffer { buffer: Some(buffer), pool: self.clone() })
    }

    /// Returns a buffer to the free list of its priority.
    pub fn release(&self, mut buffer: CommandBuffer) -> Result<(), Error> {
        let tag = buffer.tag.ok_or(Error::InvalidBuffer)?;
        ensure!(tag.pool == self.shared.id, Error::InvalidBuffer);
        {
            let mut state = self.shared.state.lock();
            let slot = state.slots.get_mut(tag.slot).ok_or(Error::InvalidBuffer)?;
            ensure!(slot.in_use && slot.generation == tag.generation, Error::InvalidBuffer);
            slot.in_use = false;
            slot.generation = slot.generation.wrapping_add(1);
            state.in_use[buffer.priority().index()] -= 1;
            state.block_size = state.block_size.max(buffer.len() + CMD_HDR);
            buffer.clear();
            state.free[buffer.priority().index()].push(buffer);
        }
        self.shared.released.notify_waiters();
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            allocated: state.slots.len(),
            free: state.free.iter().map(Vec::len).sum(),
            in_use: state.total_in_use(),
            block_size: state.block_size,
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

/// A [`CommandBuffer`] on loan from a [`BufferPool`]. Goes back to the pool when dropped.
pub struct PooledBuffer {
    buffer: Option<CommandBuffer>,
    pool: BufferPool,
}

impl PooledBuffer {
    /// Returns the buffer to its pool, reporting a rejected release.
    pub fn release(mut self) -> Result<(), Error> {
        match self.buffer.take() {
            Some(buffer) => self.pool.release(buffer),
            None => Err(Error::InvalidBuffer)
        }
    }

    /// Detaches the buffer; it has to be handed back with [`BufferPool::release`].
    pub fn into_inner(mut self) -> CommandBuffer {
        self.buffer.take().unwrap_or_else(|| unreachable!())
    }
}

impl Deref for PooledBuffer {
    type Target = CommandBuffer;

    fn deref(&self) -> &Self::Target {
        // Only `release` and `into_inner` take the buffer, and both consume `self`.
        self.buffer.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool
                .release(buffer)
                .unwrap_or_else(|err| warn!("Failed to return command buffer: {}", err));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use bytes::BufMut;
    use tokio::time::timeout;
    use super::*;
    use crate::hci::{Opcode, OpcodeGroup};

    fn pool(max_buffers: usize, high_priority_reserve: usize) -> BufferPool {
        BufferPool::new(PoolConfig { max_buffers, high_priority_reserve, initial_capacity: 16 })
    }

    #[test]
    fn steady_state_reuses_buffers() {
        let pool = pool(4, 0);
        for _ in 0..3 {
            let buffers: Vec<_> = (0..4)
                .map(|_| pool.try_acquire(Priority::Low).unwrap())
                .collect();
            assert_eq!(pool.stats().in_use, 4);
            for buffer in buffers {
                buffer.release().unwrap();
            }
        }
        let stats = pool.stats();
        assert_eq!(stats.allocated, 4);
        assert_eq!(stats.free, 4);
        assert_eq!(stats.in_use, 0);
    }

    #[test]
    fn release_clears_the_buffer() {
        let pool = pool(1, 0);
        let mut buffer = pool.try_acquire(Priority::Low).unwrap();
        buffer.begin(Opcode::new(OpcodeGroup::HciControl, 0x0013));
        buffer.params_mut().put_bytes(b'x', 100);
        drop(buffer);

        let buffer = pool.try_acquire(Priority::Low).unwrap();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.opcode(), None);
        assert_eq!(pool.stats().block_size, 100 + CMD_HDR);
        assert_eq!(pool.stats().allocated, 1);
    }

    #[test]
    fn new_buffers_grow_with_the_largest_block() {
        let pool = pool(2, 0);
        let mut first = pool.try_acquire(Priority::Low).unwrap();
        first.begin(Opcode::NONE);
        first.params_mut().put_bytes(0, 200);
        first.release().unwrap();

        let _reused = pool.try_acquire(Priority::Low).unwrap();
        let fresh = pool.try_acquire(Priority::Low).unwrap();
        assert!(fresh.capacity() >= 200 + CMD_HDR);
        assert_eq!(pool.stats().allocated, 2);
    }

    #[test]
    fn reserve_is_kept_for_high_priority() {
        let pool = pool(2, 1);
        let low = pool.try_acquire(Priority::Low).unwrap();
        assert!(pool.try_acquire(Priority::Low).is_none());
        let high = pool.try_acquire(Priority::High).unwrap();
        assert!(pool.try_acquire(Priority::High).is_none());
        assert_eq!(high.priority(), Priority::High);

        drop(low);
        let low = pool.try_acquire(Priority::Low).unwrap();
        assert_eq!(low.priority(), Priority::Low);
        assert_eq!(pool.stats().allocated, 2);
    }

    #[test]
    fn high_priority_takes_low_priority_slots() {
        let pool = pool(2, 1);
        let a = pool.try_acquire(Priority::High).unwrap();
        let b = pool.try_acquire(Priority::High).unwrap();
        assert!(pool.try_acquire(Priority::Low).is_none());
        drop((a, b));
        assert_eq!(pool.stats().free, 2);
    }

    #[test]
    fn foreign_and_detached_buffers_are_rejected() {
        let first = pool(1, 0);
        let second = pool(1, 0);
        let buffer = first.try_acquire(Priority::Low).unwrap().into_inner();
        assert!(matches!(second.release(buffer.clone()), Err(Error::InvalidBuffer)));
        first.release(buffer).unwrap();

        let detached = CommandBuffer::new(Priority::Low);
        assert!(matches!(first.release(detached), Err(Error::InvalidBuffer)));
    }

    #[test]
    fn stale_copies_are_rejected() {
        let pool = pool(1, 0);
        let buffer = pool.try_acquire(Priority::Low).unwrap().into_inner();
        let copy = buffer.clone();
        pool.release(buffer).unwrap();
        assert!(matches!(pool.release(copy.clone()), Err(Error::InvalidBuffer)));

        // The slot has moved on to a new generation once it is handed out again.
        let _again = pool.try_acquire(Priority::Low).unwrap();
        assert!(matches!(pool.release(copy), Err(Error::InvalidBuffer)));
        assert_eq!(pool.stats().in_use, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_a_release() {
        let pool = pool(1, 0);
        let held = pool.acquire(Priority::Low).await;
        assert!(timeout(Duration::from_millis(10), pool.acquire(Priority::Low)).await.is_err());

        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.acquire(Priority::Low).await.release() }
        });
        tokio::task::yield_now().await;
        drop(held);
        waiter.await.unwrap().unwrap();
        assert_eq!(pool.stats().allocated, 1);
    }
}
