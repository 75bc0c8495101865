// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Memory segment lookup per posix user.

use crate::mempool::MemoryPool;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

/// Resolves the memory pool a process of user `uid` allocates from.
pub trait SegmentResolver: Send + Sync {
    /// `None` if the user has no segment; the registration is then refused.
    fn segment_for_user(&self, uid: u32) -> Option<MemoryPool>;
}

/// Heap-backed segments, one pool per user, created on first use.
///
/// Segment ids start at 1; 0 belongs to the broker's own pool.
pub struct HeapSegments {
    chunk_size: usize,
    chunk_count: usize,
    allowed: Option<BTreeSet<u32>>,
    pools: Mutex<BTreeMap<u32, MemoryPool>>,
}

impl HeapSegments {
    pub fn new(chunk_size: usize, chunk_count: usize) -> Self {
        Self {
            chunk_size,
            chunk_count,
            allowed: None,
            pools: Mutex::new(BTreeMap::new()),
        }
    }

    /// Serve only the listed users.
    pub fn restricted_to(mut self, users: impl IntoIterator<Item = u32>) -> Self {
        self.allowed = Some(users.into_iter().collect());
        self
    }
}

impl SegmentResolver for HeapSegments {
    fn segment_for_user(&self, uid: u32) -> Option<MemoryPool> {
        if self.allowed.as_ref().is_some_and(|users| !users.contains(&uid)) {
            return None;
        }
        let mut pools = self.pools.lock();
        let next_id = pools.len() as u64 + 1;
        let pool = pools.entry(uid).or_insert_with(|| {
            log::debug!("[Segments] segment {} created for user {}", next_id, uid);
            MemoryPool::new(next_id, self.chunk_size, self.chunk_count)
        });
        Some(pool.clone())
    }
}
