// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::{Mailbox, Registration};
use crate::capro::IdString;
use crate::ipc::Response;
use crate::mempool::MemoryPool;
use crate::port::UniquePortId;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A registered process.
pub struct ProcessEntry {
    pid: u32,
    name: IdString,
    session_id: u64,
    user: u32,
    monitored: bool,
    last_heartbeat: Instant,
    pool: MemoryPool,
    mailbox: Arc<dyn Mailbox>,
    registry_port: UniquePortId,
}

impl ProcessEntry {
    pub fn new(
        registration: &Registration,
        monitored: bool,
        pool: MemoryPool,
        mailbox: Arc<dyn Mailbox>,
        registry_port: UniquePortId,
    ) -> Self {
        Self {
            pid: registration.pid,
            name: registration.name.clone(),
            session_id: registration.session_id,
            user: registration.user,
            monitored,
            last_heartbeat: Instant::now(),
            pool,
            mailbox,
            registry_port,
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &IdString {
        &self.name
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn user(&self) -> u32 {
        self.user
    }

    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    pub fn pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub fn segment_id(&self) -> u64 {
        self.pool.segment_id()
    }

    pub fn registry_port(&self) -> UniquePortId {
        self.registry_port
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.last_heartbeat
    }

    pub fn touch(&mut self) {
        self.last_heartbeat = Instant::now();
    }

    /// Heartbeat older than `timeout`.
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_heartbeat.elapsed() > timeout
    }

    /// Queue `response` on the process's mailbox. Failures are logged.
    pub fn send(&self, response: Response) -> bool {
        match self.mailbox.send(response) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[ProcessManager] cannot reach process {}: {}", self.name, e);
                false
            }
        }
    }
}
