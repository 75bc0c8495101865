// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interface port: the receiving end gateways use to learn about offers made by
//! ports of other interfaces.

use super::PortInfo;
use crate::capro::CaproMessage;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Bound of the pending capro queue; the oldest message is dropped beyond it.
const INTERFACE_QUEUE_CAPACITY: usize = 1024;

pub struct InterfacePortData {
    info: PortInfo,
    queue: Mutex<VecDeque<CaproMessage>>,
}

impl InterfacePortData {
    pub fn new(info: PortInfo) -> Self {
        Self {
            info,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn info(&self) -> &PortInfo {
        &self.info
    }

    pub(crate) fn deliver(&self, message: CaproMessage) {
        let mut queue = self.queue.lock();
        if queue.len() >= INTERFACE_QUEUE_CAPACITY {
            log::warn!(
                "[InterfacePort] {} queue full, dropping {}",
                self.info.unique_id,
                queue.front().map(|m| m.service.to_string()).unwrap_or_default()
            );
            queue.pop_front();
        }
        queue.push_back(message);
    }

    /// Next forwarded capro message, oldest first.
    pub fn take_capro(&self) -> Option<CaproMessage> {
        self.queue.lock().pop_front()
    }
}
