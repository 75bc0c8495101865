// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registered-process list for the process introspection topic.

use super::topic::{ProcessIntrospectionTopic, ProcessRecord};
use crate::capro::IdString;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct ProcessIntrospection {
    processes: Mutex<Vec<ProcessRecord>>,
    new_data: AtomicBool,
}

impl ProcessIntrospection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process(&self, pid: u32, name: &IdString, session_id: u64, monitored: bool) {
        let mut processes = self.processes.lock();
        processes.retain(|p| p.name != *name);
        processes.push(ProcessRecord {
            pid,
            name: name.clone(),
            session_id,
            monitored,
        });
        self.new_data.store(true, Ordering::Release);
    }

    pub fn remove_process(&self, name: &IdString) {
        let mut processes = self.processes.lock();
        let before = processes.len();
        processes.retain(|p| p.name != *name);
        if processes.len() != before {
            self.new_data.store(true, Ordering::Release);
        }
    }

    pub(crate) fn mark_new(&self) {
        self.new_data.store(true, Ordering::Release);
    }

    pub fn is_new(&self) -> bool {
        self.new_data.load(Ordering::Acquire)
    }

    /// Snapshot in registration order. Clears the "new data" flag.
    pub fn prepare_topic(&self) -> ProcessIntrospectionTopic {
        let processes = self.processes.lock();
        self.new_data.store(false, Ordering::Release);
        ProcessIntrospectionTopic {
            processes: processes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let introspection = ProcessIntrospection::new();
        let a = IdString::new("a").unwrap();
        let b = IdString::new("b").unwrap();
        introspection.add_process(10, &a, 1, true);
        introspection.add_process(11, &b, 2, false);
        assert!(introspection.is_new());

        let topic = introspection.prepare_topic();
        assert_eq!(topic.processes.len(), 2);
        assert!(!introspection.is_new());

        introspection.remove_process(&IdString::new("missing").unwrap());
        assert!(!introspection.is_new());
        introspection.remove_process(&a);
        assert!(introspection.is_new());
        assert_eq!(introspection.prepare_topic().processes[0].name, b);
    }

    #[test]
    fn test_re_add_replaces_entry() {
        let introspection = ProcessIntrospection::new();
        let a = IdString::new("a").unwrap();
        introspection.add_process(10, &a, 1, true);
        introspection.add_process(12, &a, 2, true);
        let topic = introspection.prepare_topic();
        assert_eq!(topic.processes.len(), 1);
        assert_eq!(topic.processes[0].session_id, 2);
    }
}
