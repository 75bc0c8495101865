// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher port: offer state, history ring and the list of acknowledged
//! subscribers chunks are delivered to.

use super::{PortInfo, PublisherPort, SubscriberPort, SubscriberPortData};
use crate::capro::{CaproMessage, CaproMessageType};
use crate::error::ChunkError;
use crate::mempool::{Chunk, ChunkMut, MemoryPool};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

struct State {
    offered: bool,
    pending: VecDeque<CaproMessageType>,
    history: VecDeque<Arc<Chunk>>,
    subscribers: Vec<Weak<SubscriberPortData>>,
}

/// In-process publisher port.
pub struct PublisherPortData {
    info: PortInfo,
    pool: MemoryPool,
    history_capacity: usize,
    state: Mutex<State>,
    sequence: AtomicU64,
}

impl PublisherPortData {
    pub fn new(info: PortInfo, pool: MemoryPool, history_capacity: usize) -> Self {
        Self {
            info,
            pool,
            history_capacity,
            state: Mutex::new(State {
                offered: false,
                pending: VecDeque::new(),
                history: VecDeque::new(),
                subscribers: Vec::new(),
            }),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn sent_chunks(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .subscribers
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    pub(crate) fn take_capro_request(&self) -> Option<CaproMessage> {
        let kind = self.state.lock().pending.pop_front()?;
        Some(CaproMessage::new(kind, self.info.service.clone()))
    }

    /// Answer a subscription request: ACK and attach when offered, NACK otherwise.
    /// History is replayed to the new subscriber outside the lock.
    pub(crate) fn handle_subscribe(
        &self,
        request: &CaproMessage,
        subscriber: &Arc<SubscriberPortData>,
    ) -> CaproMessageType {
        let replay: Vec<Arc<Chunk>> = {
            let mut state = self.state.lock();
            if !state.offered {
                return CaproMessageType::Nack;
            }
            let attached = state
                .subscribers
                .iter()
                .any(|s| s.upgrade().is_some_and(|s| Arc::ptr_eq(&s, subscriber)));
            if !attached {
                state.subscribers.push(Arc::downgrade(subscriber));
            }
            let skip = state.history.len().saturating_sub(request.history_request);
            state.history.iter().skip(skip).cloned().collect()
        };
        for chunk in replay {
            subscriber.deliver(chunk);
        }
        CaproMessageType::Ack
    }

    /// Detach one subscriber. Returns ACK if it was attached, NACK otherwise.
    pub(crate) fn handle_unsubscribe(&self, subscriber: &SubscriberPortData) -> CaproMessageType {
        let mut state = self.state.lock();
        state.subscribers.retain(|s| s.strong_count() > 0);
        let before = state.subscribers.len();
        state.subscribers.retain(|s| {
            s.upgrade()
                .is_some_and(|s| s.unique_id() != subscriber.unique_id())
        });
        if state.subscribers.len() < before {
            CaproMessageType::Ack
        } else {
            CaproMessageType::Nack
        }
    }

    pub(crate) fn detach_all(&self) {
        self.state.lock().subscribers.clear();
    }
}

impl PublisherPort for PublisherPortData {
    fn info(&self) -> &PortInfo {
        &self.info
    }

    fn offer(&self) {
        let mut state = self.state.lock();
        if !state.offered {
            state.offered = true;
            state.pending.push_back(CaproMessageType::Offer);
        }
    }

    fn stop_offer(&self) {
        let mut state = self.state.lock();
        if state.offered {
            state.offered = false;
            state.pending.push_back(CaproMessageType::StopOffer);
        }
    }

    fn is_offered(&self) -> bool {
        self.state.lock().offered
    }

    fn try_allocate_chunk(&self, size: usize) -> Result<ChunkMut, ChunkError> {
        self.pool.try_allocate(size)
    }

    fn send_chunk(&self, chunk: ChunkMut) -> Result<(), ChunkError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let chunk = Arc::new(chunk.seal(self.info.unique_id, sequence)?);

        let receivers: Vec<Arc<SubscriberPortData>> = {
            let mut state = self.state.lock();
            if self.history_capacity > 0 {
                if state.history.len() >= self.history_capacity {
                    state.history.pop_front();
                }
                state.history.push_back(Arc::clone(&chunk));
            }
            state.subscribers.retain(|s| s.strong_count() > 0);
            state.subscribers.iter().filter_map(Weak::upgrade).collect()
        };

        for receiver in receivers {
            receiver.deliver(Arc::clone(&chunk));
        }
        Ok(())
    }
}
