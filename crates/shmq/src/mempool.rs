// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-size chunk pool backing publisher ports.
//!
//! Each pool hands out at most `chunk_count` chunks of `chunk_size` bytes.
//! Reservation is a CAS on the in-use counter; a chunk returns its slot when the
//! last reference to it (writer, history entry or subscriber queue) is dropped.
//!
//! # Lifecycle
//!
//! ```text
//! try_allocate() -> ChunkMut --(send)--> Arc<Chunk> --(clone per subscriber)--> drop -> slot free
//! ```

use crate::error::ChunkError;
use crate::port::UniquePortId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct PoolInner {
    segment_id: u64,
    chunk_size: usize,
    chunk_count: usize,
    used: AtomicUsize,
}

/// Bounded pool of equally sized chunks, cheap to clone.
#[derive(Clone)]
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("segment_id", &self.inner.segment_id)
            .field("chunk_size", &self.inner.chunk_size)
            .field("chunk_count", &self.inner.chunk_count)
            .field("used", &self.used_chunks())
            .finish()
    }
}

impl MemoryPool {
    pub fn new(segment_id: u64, chunk_size: usize, chunk_count: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                segment_id,
                chunk_size,
                chunk_count,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// Reserve a chunk able to hold `size` payload bytes.
    pub fn try_allocate(&self, size: usize) -> Result<ChunkMut, ChunkError> {
        let inner = &self.inner;
        if size > inner.chunk_size {
            return Err(ChunkError::TooLarge {
                requested: size,
                chunk_size: inner.chunk_size,
            });
        }

        let mut used = inner.used.load(Ordering::Acquire);
        loop {
            if used >= inner.chunk_count {
                return Err(ChunkError::PoolExhausted {
                    chunk_count: inner.chunk_count,
                });
            }
            match inner
                .used
                .compare_exchange_weak(used, used + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(current) => used = current,
            }
        }

        Ok(ChunkMut {
            lease: ChunkLease {
                pool: Arc::clone(&self.inner),
            },
            payload: Vec::with_capacity(size),
            capacity: inner.chunk_size,
        })
    }

    pub fn segment_id(&self) -> u64 {
        self.inner.segment_id
    }

    pub fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    pub fn chunk_count(&self) -> usize {
        self.inner.chunk_count
    }

    pub fn used_chunks(&self) -> usize {
        self.inner.used.load(Ordering::Acquire)
    }
}

/// Returns the slot to its pool on drop.
struct ChunkLease {
    pool: Arc<PoolInner>,
}

impl Drop for ChunkLease {
    fn drop(&mut self) {
        self.pool.used.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A reserved, writable chunk not yet sent.
pub struct ChunkMut {
    lease: ChunkLease,
    payload: Vec<u8>,
    capacity: usize,
}

impl ChunkMut {
    pub fn payload_mut(&mut self) -> &mut Vec<u8> {
        &mut self.payload
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seal the chunk for delivery.
    pub(crate) fn seal(self, origin: UniquePortId, sequence: u64) -> Result<Chunk, ChunkError> {
        if self.payload.len() > self.capacity {
            return Err(ChunkError::PayloadOverflow {
                len: self.payload.len(),
                capacity: self.capacity,
            });
        }
        Ok(Chunk {
            header: ChunkHeader {
                origin,
                sequence,
                payload_size: self.payload.len(),
            },
            payload: self.payload,
            _lease: self.lease,
        })
    }
}

impl std::fmt::Debug for ChunkMut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkMut")
            .field("len", &self.payload.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Metadata stamped on every sent chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub origin: UniquePortId,
    pub sequence: u64,
    pub payload_size: usize,
}

/// A sent, immutable chunk shared between history and subscriber queues.
pub struct Chunk {
    header: ChunkHeader,
    payload: Vec<u8>,
    _lease: ChunkLease,
}

impl Chunk {
    pub fn header(&self) -> &ChunkHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk").field("header", &self.header).finish()
    }
}
