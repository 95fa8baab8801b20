//! Recycling buffer pool keyed by `(type, capacity)`.
//!
//! The DashMap is only written when a key is seen for the first time, which
//! happens while preparing an edit off the realtime thread. Realtime code
//! uses [`BufferFactory::try_get_rt`], which takes a read shard lock and pops
//! from a lock-free queue.

use super::{Buffer, BufferKind};
use crate::uri::Urid;
use crossbeam::queue::ArrayQueue;
use dashmap::DashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Pool identity of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub value_type: Urid,
    pub capacity: usize,
}

type Slot = Arc<ArrayQueue<Box<Buffer>>>;

/// Owner handle for a pooled buffer.
///
/// Dropping the handle returns the buffer to its pool; it is freed only if
/// the pool is already full.
pub struct BufferRef {
    buffer: Option<Box<Buffer>>,
    home: Slot,
}

impl BufferRef {
    /// A handle whose buffer is not recycled through any shared pool.
    pub fn detached(buffer: Buffer) -> Self {
        Self {
            buffer: Some(Box::new(buffer)),
            home: Arc::new(ArrayQueue::new(1)),
        }
    }
}

impl Deref for BufferRef {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        match &self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("buffer taken before drop"),
        }
    }
}

impl DerefMut for BufferRef {
    fn deref_mut(&mut self) -> &mut Buffer {
        match &mut self.buffer {
            Some(buffer) => buffer,
            None => unreachable!("buffer taken before drop"),
        }
    }
}

impl Drop for BufferRef {
    fn drop(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.reset();
            let _ = self.home.push(buffer);
        }
    }
}

impl std::fmt::Debug for BufferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&**self, f)
    }
}

/// Creates and recycles port buffers.
pub struct BufferFactory {
    pools: DashMap<PoolKey, Slot>,
    pool_capacity: usize,
    block_length: usize,
    sequence_capacity: usize,
}

impl BufferFactory {
    pub fn new(block_length: usize, sequence_capacity: usize, pool_capacity: usize) -> Self {
        Self {
            pools: DashMap::new(),
            pool_capacity: pool_capacity.max(1),
            block_length,
            sequence_capacity,
        }
    }

    pub fn block_length(&self) -> usize {
        self.block_length
    }

    pub fn sequence_capacity(&self) -> usize {
        self.sequence_capacity
    }

    /// Default capacity for buffers of `kind`.
    pub fn default_capacity(&self, kind: BufferKind) -> usize {
        match kind {
            BufferKind::Audio => self.block_length,
            BufferKind::Control => 1,
            BufferKind::Sequence => self.sequence_capacity,
        }
    }

    pub fn key(&self, kind: BufferKind) -> PoolKey {
        PoolKey {
            value_type: kind.value_type(),
            capacity: self.default_capacity(kind),
        }
    }

    fn slot(&self, key: PoolKey) -> Slot {
        if let Some(slot) = self.pools.get(&key) {
            return slot.clone();
        }
        self.pools
            .entry(key)
            .or_insert_with(|| Arc::new(ArrayQueue::new(self.pool_capacity)))
            .clone()
    }

    /// Acquire a cleared buffer of `kind`, allocating on a pool miss.
    ///
    /// Not realtime safe.
    pub fn get(&self, kind: BufferKind) -> BufferRef {
        let key = self.key(kind);
        let home = self.slot(key);
        let buffer = home
            .pop()
            .unwrap_or_else(|| Box::new(Buffer::with_kind(kind, key.capacity)));
        BufferRef {
            buffer: Some(buffer),
            home,
        }
    }

    /// Acquire a buffer only if one is already pooled. Realtime safe.
    pub fn try_get_rt(&self, kind: BufferKind) -> Option<BufferRef> {
        let slot = self.pools.get(&self.key(kind))?;
        let buffer = slot.pop()?;
        Some(BufferRef {
            buffer: Some(buffer),
            home: slot.clone(),
        })
    }

    /// Pre-allocate up to `count` pooled buffers of `kind`.
    pub fn prepare(&self, kind: BufferKind, count: usize) {
        let key = self.key(kind);
        let slot = self.slot(key);
        while slot.len() < count.min(slot.capacity()) {
            if slot.push(Box::new(Buffer::with_kind(kind, key.capacity))).is_err() {
                break;
            }
        }
    }

    /// Buffers currently waiting in the pool for `kind`.
    pub fn pooled(&self, kind: BufferKind) -> usize {
        self.pools
            .get(&self.key(kind))
            .map(|slot| slot.len())
            .unwrap_or(0)
    }
}
