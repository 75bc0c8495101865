// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded list of registered processes. Lookups are linear scans; the list
//! holds tens to low hundreds of entries.

use super::entry::ProcessEntry;
use crate::capro::IdString;
use std::time::Duration;

pub struct ProcessRegistry {
    entries: Vec<ProcessEntry>,
    capacity: usize,
}

impl ProcessRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn find(&self, name: &IdString) -> Option<&ProcessEntry> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn find_mut(&mut self, name: &IdString) -> Option<&mut ProcessEntry> {
        self.entries.iter_mut().find(|e| e.name() == name)
    }

    /// Add `entry`; hands it back if the list is full or the name is taken.
    pub fn insert(&mut self, entry: ProcessEntry) -> Result<(), ProcessEntry> {
        if self.is_full() || self.find(entry.name()).is_some() {
            return Err(entry);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn remove(&mut self, name: &IdString) -> Option<ProcessEntry> {
        let index = self.entries.iter().position(|e| e.name() == name)?;
        Some(self.entries.remove(index))
    }

    /// Refresh the heartbeat of `name`. False if unknown.
    pub fn touch(&mut self, name: &IdString) -> bool {
        match self.find_mut(name) {
            Some(entry) => {
                entry.touch();
                true
            }
            None => false,
        }
    }

    /// Monitored processes whose heartbeat is older than `timeout`.
    pub fn expired(&self, timeout: Duration) -> Vec<IdString> {
        self.entries
            .iter()
            .filter(|e| e.is_monitored() && e.is_expired(timeout))
            .map(|e| e.name().clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.entries.iter()
    }
}
