// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic publication of the introspection topics.
//!
//! On [`run`](IntrospectionPublisher::run) every topic is sent once before the
//! ports are offered, so subscribers relying on history see a valid initial
//! state. Afterwards each tick sends:
//!
//! | topic            | when                                  |
//! |------------------|---------------------------------------|
//! | port graph       | only if the connection registry changed |
//! | throughput       | always                                |
//! | subscriber data  | always                                |
//! | processes        | only if the process list changed      |
//!
//! A failed chunk allocation skips that topic for the tick. A skipped port or
//! process sample is retried on the next tick even without further changes.

use super::connection::ConnectionRegistry;
use super::process::ProcessIntrospection;
use crate::error::{ChunkError, ErrorCode, ErrorLevel, ErrorReporter};
use crate::periodic::PeriodicTask;
use crate::port::PublisherPort;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Publisher ports the introspection topics are sent on.
pub struct IntrospectionPorts {
    pub ports: Arc<dyn PublisherPort>,
    pub throughput: Arc<dyn PublisherPort>,
    pub subscriber_data: Arc<dyn PublisherPort>,
    pub processes: Arc<dyn PublisherPort>,
}

impl IntrospectionPorts {
    fn all(&self) -> [&Arc<dyn PublisherPort>; 4] {
        [&self.ports, &self.throughput, &self.subscriber_data, &self.processes]
    }
}

/// Everything one publish cycle needs, shared with the timer thread.
#[derive(Clone)]
struct Cycle {
    connections: Arc<ConnectionRegistry>,
    processes: Arc<ProcessIntrospection>,
    ports: Arc<IntrospectionPorts>,
}

impl Cycle {
    fn send(&self, force: bool) {
        // An unpublished snapshot keeps its change flag set.
        if (force || self.connections.is_new())
            && !publish(&*self.ports.ports, "port", &self.connections.prepare_port_topic())
        {
            self.connections.mark_new();
        }
        publish(
            &*self.ports.throughput,
            "throughput",
            &self.connections.prepare_throughput_topic(),
        );
        publish(
            &*self.ports.subscriber_data,
            "subscriber data",
            &self.connections.prepare_subscriber_changing_topic(),
        );
        if (force || self.processes.is_new())
            && !publish(&*self.ports.processes, "process", &self.processes.prepare_topic())
        {
            self.processes.mark_new();
        }
    }
}

fn publish<T: Serialize>(port: &dyn PublisherPort, topic: &str, sample: &T) -> bool {
    let payload = match serde_json::to_vec(sample) {
        Ok(payload) => payload,
        Err(e) => {
            log::error!("[introspection] failed to serialize {} topic: {}", topic, e);
            return false;
        }
    };
    let mut chunk = match port.try_allocate_chunk(payload.len()) {
        Ok(chunk) => chunk,
        Err(e @ ChunkError::PoolExhausted { .. }) => {
            log::debug!("[introspection] skipping {} topic this tick: {}", topic, e);
            return false;
        }
        Err(e) => {
            log::warn!("[introspection] cannot publish {} topic: {}", topic, e);
            return false;
        }
    };
    chunk.payload_mut().extend_from_slice(&payload);
    match port.send_chunk(chunk) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("[introspection] failed to send {} topic: {}", topic, e);
            false
        }
    }
}

struct Timer {
    interval: Duration,
    task: Option<PeriodicTask>,
}

/// Sends introspection topics at a configurable, restartable interval.
pub struct IntrospectionPublisher {
    connections: Arc<ConnectionRegistry>,
    processes: Arc<ProcessIntrospection>,
    ports: Mutex<Option<Arc<IntrospectionPorts>>>,
    timer: Mutex<Timer>,
    reporter: Arc<dyn ErrorReporter>,
}

impl IntrospectionPublisher {
    pub fn new(
        connections: Arc<ConnectionRegistry>,
        processes: Arc<ProcessIntrospection>,
        interval: Duration,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            connections,
            processes,
            ports: Mutex::new(None),
            timer: Mutex::new(Timer {
                interval,
                task: None,
            }),
            reporter,
        }
    }

    /// Install the ports to publish on. Only the first call succeeds.
    pub fn register_publisher_ports(&self, ports: IntrospectionPorts) -> bool {
        let mut slot = self.ports.lock();
        if slot.is_some() {
            log::warn!("[introspection] publisher ports already registered");
            self.reporter.report(
                ErrorCode::IntrospectionPortsAlreadyRegistered,
                ErrorLevel::Moderate,
            );
            return false;
        }
        *slot = Some(Arc::new(ports));
        true
    }

    fn cycle(&self) -> Option<Cycle> {
        let ports = self.ports.lock().clone()?;
        Some(Cycle {
            connections: Arc::clone(&self.connections),
            processes: Arc::clone(&self.processes),
            ports,
        })
    }

    /// Send every topic once, offer them and start the timer.
    pub fn run(&self) -> bool {
        let Some(cycle) = self.cycle() else {
            log::warn!("[introspection] run without registered publisher ports");
            return false;
        };

        let mut timer = self.timer.lock();
        if timer.task.is_some() {
            return true;
        }

        cycle.send(true);
        for port in cycle.ports.all() {
            port.offer();
        }

        match Self::start_task(cycle, timer.interval) {
            Some(task) => {
                timer.task = Some(task);
                true
            }
            None => false,
        }
    }

    fn start_task(cycle: Cycle, interval: Duration) -> Option<PeriodicTask> {
        match PeriodicTask::start("shmq-introspection", interval, move || cycle.send(false)) {
            Ok(task) => Some(task),
            Err(e) => {
                log::error!("[introspection] failed to start publisher thread: {}", e);
                None
            }
        }
    }

    /// Run one regular publish cycle now.
    pub fn send(&self) {
        if let Some(cycle) = self.cycle() {
            cycle.send(false);
        }
    }

    /// Change the interval. A running timer is stopped and restarted with it.
    pub fn set_send_interval(&self, interval: Duration) {
        let mut timer = self.timer.lock();
        timer.interval = interval;
        if timer.task.take().is_some() {
            timer.task = self.cycle().and_then(|cycle| Self::start_task(cycle, interval));
        }
    }

    pub fn send_interval(&self) -> Duration {
        self.timer.lock().interval
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().task.is_some()
    }

    /// Stop the timer. The topics stay offered.
    pub fn stop(&self) {
        self.timer.lock().task = None;
    }
}
