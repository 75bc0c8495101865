// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber port: bounded receive queue plus the subscriber half of the capro
//! handshake.
//!
//! ```text
//! NotSubscribed --subscribe--> SubscribeRequested --ACK--> Subscribed
//!                                      |                      |
//!                                    NACK                STOP_OFFER
//!                                      v                      v
//!                                 WaitForOffer <--------------+
//!                                      |
//!                                    OFFER --> SubscribeRequested
//!
//! Subscribed --unsubscribe--> UnsubscribeRequested --ACK/NACK--> NotSubscribed
//! ```

use super::{PortInfo, SubscriberPort};
use crate::capro::{CaproMessage, CaproMessageType};
use crate::mempool::Chunk;
use crate::trigger::TriggerHandle;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Subscriber side of the handshake as seen by the owning process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscribeState {
    NotSubscribed,
    SubscribeRequested,
    Subscribed,
    UnsubscribeRequested,
    WaitForOffer,
}

struct State {
    subscribe_state: SubscribeState,
    pending: Option<CaproMessageType>,
    queue: VecDeque<Arc<Chunk>>,
}

/// In-process subscriber port.
pub struct SubscriberPortData {
    info: PortInfo,
    queue_capacity: usize,
    history_request: usize,
    state: Mutex<State>,
    lost_chunks: AtomicU64,
    trigger: Mutex<Option<TriggerHandle>>,
}

impl SubscriberPortData {
    pub fn new(info: PortInfo, queue_capacity: usize, history_request: usize) -> Self {
        Self {
            info,
            queue_capacity: queue_capacity.max(1),
            history_request,
            state: Mutex::new(State {
                subscribe_state: SubscribeState::NotSubscribed,
                pending: None,
                queue: VecDeque::new(),
            }),
            lost_chunks: AtomicU64::new(0),
            trigger: Mutex::new(None),
        }
    }

    /// Request a subscription; handled by the next discovery run.
    pub fn subscribe(&self) {
        let mut state = self.state.lock();
        if state.subscribe_state == SubscribeState::NotSubscribed {
            state.subscribe_state = SubscribeState::SubscribeRequested;
            state.pending = Some(CaproMessageType::Sub);
        }
    }

    pub fn unsubscribe(&self) {
        let mut state = self.state.lock();
        match state.subscribe_state {
            SubscribeState::Subscribed => {
                state.subscribe_state = SubscribeState::UnsubscribeRequested;
                state.pending = Some(CaproMessageType::Unsub);
            }
            SubscribeState::WaitForOffer => {
                state.subscribe_state = SubscribeState::NotSubscribed;
                state.pending = None;
            }
            _ => {}
        }
    }

    pub(crate) fn take_capro_request(&self) -> Option<CaproMessage> {
        let kind = self.state.lock().pending.take()?;
        let mut message = CaproMessage::new(kind, self.info.service.clone());
        if kind == CaproMessageType::Sub {
            message.history_request = self.history_request;
        }
        Some(message)
    }

    /// Apply a publisher-side message. Returns true if the state changed.
    pub(crate) fn handle_capro(&self, kind: CaproMessageType) -> bool {
        use CaproMessageType as M;
        use SubscribeState as S;

        let mut state = self.state.lock();
        let next = match (state.subscribe_state, kind) {
            (S::SubscribeRequested, M::Ack) => S::Subscribed,
            (S::SubscribeRequested, M::Nack) => S::WaitForOffer,
            (S::Subscribed, M::StopOffer) => S::WaitForOffer,
            (S::WaitForOffer, M::Offer) => {
                state.pending = Some(M::Sub);
                S::SubscribeRequested
            }
            (S::UnsubscribeRequested, M::Ack | M::Nack) => S::NotSubscribed,
            (current, _) => current,
        };
        let changed = next != state.subscribe_state;
        state.subscribe_state = next;
        changed
    }

    /// Queue a chunk, dropping the oldest one when full.
    pub(crate) fn deliver(&self, chunk: Arc<Chunk>) {
        {
            let mut state = self.state.lock();
            if state.queue.len() >= self.queue_capacity {
                state.queue.pop_front();
                self.lost_chunks.fetch_add(1, Ordering::Relaxed);
            }
            state.queue.push_back(chunk);
        }
        if let Some(trigger) = self.trigger.lock().as_ref() {
            trigger.trigger();
        }
    }

    pub fn take(&self) -> Option<Arc<Chunk>> {
        self.state.lock().queue.pop_front()
    }

    /// Drain the queue and return only the newest chunk.
    pub fn take_latest(&self) -> Option<Arc<Chunk>> {
        let mut state = self.state.lock();
        let latest = state.queue.pop_back();
        state.queue.clear();
        latest
    }

    pub fn has_data(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    pub fn lost_chunks(&self) -> u64 {
        self.lost_chunks.load(Ordering::Relaxed)
    }

    pub fn history_request(&self) -> usize {
        self.history_request
    }

    pub fn set_trigger(&self, trigger: Option<TriggerHandle>) {
        *self.trigger.lock() = trigger;
    }

    pub fn has_trigger(&self) -> bool {
        self.trigger.lock().is_some()
    }
}

impl SubscriberPort for SubscriberPortData {
    fn info(&self) -> &PortInfo {
        &self.info
    }

    fn subscription_state(&self) -> SubscribeState {
        self.state.lock().subscribe_state
    }

    fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}
