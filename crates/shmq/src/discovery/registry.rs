// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service registry: offered services and their live publisher counts.

use crate::capro::ServiceDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub service: ServiceDescriptor,
    pub publisher_count: u32,
}

/// Authoritative service map, published by the broker as a list of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ServiceEntry>", into = "Vec<ServiceEntry>")]
pub struct ServiceRegistry {
    entries: BTreeMap<ServiceDescriptor, u32>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more publisher offering `service`.
    pub fn add(&mut self, service: &ServiceDescriptor) {
        *self.entries.entry(service.clone()).or_insert(0) += 1;
    }

    /// Count one publisher less; the entry disappears with its last publisher.
    /// Returns false if the service was unknown.
    pub fn remove(&mut self, service: &ServiceDescriptor) -> bool {
        let Some(count) = self.entries.get_mut(service) else {
            return false;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.entries.remove(service);
        }
        true
    }

    pub fn publisher_count(&self, service: &ServiceDescriptor) -> u32 {
        self.entries.get(service).copied().unwrap_or(0)
    }

    /// Visit every entry matching the non-wildcard fields, in descriptor order.
    pub fn find<F>(&self, service: Option<&str>, instance: Option<&str>, event: Option<&str>, mut f: F)
    where
        F: FnMut(&ServiceDescriptor, u32),
    {
        for (descriptor, count) in &self.entries {
            if descriptor.matches(service, instance, event) {
                f(descriptor, *count);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<ServiceEntry>> for ServiceRegistry {
    fn from(entries: Vec<ServiceEntry>) -> Self {
        let mut registry = Self::new();
        for entry in entries {
            *registry.entries.entry(entry.service).or_insert(0) += entry.publisher_count;
        }
        registry
    }
}

impl From<ServiceRegistry> for Vec<ServiceEntry> {
    fn from(registry: ServiceRegistry) -> Self {
        registry
            .entries
            .into_iter()
            .map(|(service, publisher_count)| ServiceEntry {
                service,
                publisher_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sd(s: &str, i: &str, e: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(s, i, e).unwrap()
    }

    #[test]
    fn test_add_remove_counts() {
        let mut registry = ServiceRegistry::new();
        let a = sd("A", "1", "x");
        registry.add(&a);
        registry.add(&a);
        assert_eq!(registry.publisher_count(&a), 2);
        assert!(registry.remove(&a));
        assert_eq!(registry.publisher_count(&a), 1);
        assert!(registry.remove(&a));
        assert!(registry.is_empty());
        assert!(!registry.remove(&a));
    }

    #[test]
    fn test_find_wildcards() {
        let mut registry = ServiceRegistry::new();
        registry.add(&sd("A", "1", "x"));
        registry.add(&sd("A", "2", "x"));
        registry.add(&sd("B", "1", "y"));

        let mut found = Vec::new();
        registry.find(Some("A"), None, Some("x"), |s, _| found.push(s.clone()));
        assert_eq!(found, vec![sd("A", "1", "x"), sd("A", "2", "x")]);

        let mut count = 0;
        registry.find(None, Some("1"), None, |_, _| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_serialized_as_entry_list() {
        let mut registry = ServiceRegistry::new();
        registry.add(&sd("A", "1", "x"));
        let json = serde_json::to_value(&registry).unwrap();
        assert_eq!(json[0]["publisher_count"], 1);
        assert_eq!(json[0]["service"]["service"], "A");

        let back: ServiceRegistry = serde_json::from_value(json).unwrap();
        assert_eq!(back, registry);
    }

    #[test]
    fn test_zero_count_entries_survive_deserialization() {
        let registry = ServiceRegistry::from(vec![
            ServiceEntry {
                service: sd("A", "1", "x"),
                publisher_count: 2,
            },
            ServiceEntry {
                service: sd("B", "1", "y"),
                publisher_count: 0,
            },
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.publisher_count(&sd("B", "1", "y")), 0);
    }
}
