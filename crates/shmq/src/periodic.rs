// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Background thread running a closure at a fixed interval.
//!
//! The thread waits on a stop channel with `recv_timeout(interval)`; dropping the
//! sender wakes it immediately, so stopping never waits for a full period.

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::io;
use std::thread::JoinHandle;
use std::time::Duration;

/// Periodic task, stopped and joined on drop.
pub struct PeriodicTask {
    name: String,
    interval: Duration,
    /// Dropping this signals the thread to exit. Must be dropped before joining.
    stop_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn the thread. The first call of `tick` happens one `interval` after start.
    pub fn start<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => tick(),
                }
            })?;

        log::debug!("[PeriodicTask] started '{}' every {:?}", name, interval);

        Ok(Self {
            name: name.to_string(),
            interval,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Signal the thread and wait for it. Safe to call multiple times.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[PeriodicTask] '{}' panicked", self.name);
            } else {
                log::debug!("[PeriodicTask] stopped '{}'", self.name);
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}
