// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client-side read path of the service registry.
//!
//! The broker publishes the registry on an internal topic; each process reads it
//! through its registry subscriber port. The cached copy is refreshed lazily,
//! on query, and only when a new sample arrived.

use super::registry::ServiceRegistry;
use crate::capro::ServiceDescriptor;
use crate::error::{ErrorCode, ErrorLevel, ErrorReporter};
use crate::port::SubscriberPortData;
use crate::trigger::TriggerHandle;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Events a [`ServiceDiscovery`] can signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceDiscoveryEvent {
    /// A new registry sample is available.
    ServiceRegistryChanged,
}

impl TryFrom<u32> for ServiceDiscoveryEvent {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::ServiceRegistryChanged),
            other => Err(other),
        }
    }
}

pub struct ServiceDiscovery {
    subscriber: Arc<SubscriberPortData>,
    cache: Mutex<ServiceRegistry>,
    reporter: Arc<dyn ErrorReporter>,
}

impl ServiceDiscovery {
    pub fn new(subscriber: Arc<SubscriberPortData>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            subscriber,
            cache: Mutex::new(ServiceRegistry::new()),
            reporter,
        }
    }

    fn refresh(&self, cache: &mut ServiceRegistry) {
        let Some(sample) = self.subscriber.take_latest() else {
            return;
        };
        match serde_json::from_slice::<ServiceRegistry>(sample.payload()) {
            Ok(registry) => *cache = registry,
            Err(e) => log::warn!("[ServiceDiscovery] dropping malformed registry sample: {}", e),
        }
    }

    /// Services with at least one live publisher matching the given fields;
    /// `None` matches anything.
    pub fn find_service(
        &self,
        service: Option<&str>,
        instance: Option<&str>,
        event: Option<&str>,
    ) -> Vec<ServiceDescriptor> {
        let mut found = Vec::new();
        self.find_service_with(service, instance, event, |s| found.push(s.clone()));
        found
    }

    /// Like [`find_service`](Self::find_service) but calls `f` per match.
    ///
    /// `f` runs with the cache locked and must not query this instance again.
    pub fn find_service_with<F>(
        &self,
        service: Option<&str>,
        instance: Option<&str>,
        event: Option<&str>,
        mut f: F,
    ) where
        F: FnMut(&ServiceDescriptor),
    {
        let mut cache = self.cache.lock();
        self.refresh(&mut cache);
        cache.find(service, instance, event, |descriptor, publishers| {
            if publishers > 0 {
                f(descriptor);
            }
        });
    }

    /// Attach `trigger` to `event`. Unknown events are logged and reported.
    pub fn enable_event<E>(&self, event: E, trigger: TriggerHandle) -> bool
    where
        E: TryInto<ServiceDiscoveryEvent>,
        E::Error: fmt::Debug,
    {
        match self.resolve(event) {
            Some(ServiceDiscoveryEvent::ServiceRegistryChanged) => {
                self.subscriber.set_trigger(Some(trigger));
                true
            }
            None => false,
        }
    }

    pub fn disable_event<E>(&self, event: E) -> bool
    where
        E: TryInto<ServiceDiscoveryEvent>,
        E::Error: fmt::Debug,
    {
        match self.resolve(event) {
            Some(ServiceDiscoveryEvent::ServiceRegistryChanged) => {
                self.subscriber.set_trigger(None);
                true
            }
            None => false,
        }
    }

    fn resolve<E>(&self, event: E) -> Option<ServiceDiscoveryEvent>
    where
        E: TryInto<ServiceDiscoveryEvent>,
        E::Error: fmt::Debug,
    {
        match event.try_into() {
            Ok(event) => Some(event),
            Err(unknown) => {
                log::error!("[ServiceDiscovery] unknown event {:?}", unknown);
                self.reporter.report(
                    ErrorCode::ServiceDiscoveryUnknownEventProvided,
                    ErrorLevel::Moderate,
                );
                None
            }
        }
    }

    /// True if a registry sample is waiting to be read.
    pub fn has_new_data(&self) -> bool {
        self.subscriber.has_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capro::{CaproMessage, CaproMessageType, IdString, Interface, Scope};
    use crate::discovery::registry::ServiceEntry;
    use crate::error::testing::CapturingReporter;
    use crate::mempool::MemoryPool;
    use crate::port::{PortInfo, PublisherPort, PublisherPortData, UniquePortId};
    use crate::trigger::ConditionVariable;

    struct Fixture {
        publisher: PublisherPortData,
        subscriber: Arc<SubscriberPortData>,
        discovery: ServiceDiscovery,
        reporter: Arc<CapturingReporter>,
    }

    fn fixture() -> Fixture {
        let info = PortInfo {
            service: ServiceDescriptor::new("Registry", "Broker", "Services").unwrap(),
            process_name: IdString::new("app").unwrap(),
            node_name: IdString::default(),
            unique_id: UniquePortId::next(),
            interface: Interface::Internal,
            scope: Scope::Local,
        };
        let publisher = PublisherPortData::new(info.clone(), MemoryPool::new(0, 4096, 8), 1);
        publisher.offer();
        let subscriber = Arc::new(SubscriberPortData::new(info.clone(), 4, 1));
        let request = CaproMessage::new(CaproMessageType::Sub, info.service.clone());
        publisher.handle_subscribe(&request, &subscriber);
        let reporter = Arc::new(CapturingReporter::default());
        let discovery = ServiceDiscovery::new(Arc::clone(&subscriber), reporter.clone());
        Fixture {
            publisher,
            subscriber,
            discovery,
            reporter,
        }
    }

    fn sd(s: &str, i: &str, e: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(s, i, e).unwrap()
    }

    fn publish(publisher: &PublisherPortData, entries: Vec<ServiceEntry>) {
        let payload = serde_json::to_vec(&ServiceRegistry::from(entries)).unwrap();
        let mut chunk = publisher.try_allocate_chunk(payload.len()).unwrap();
        chunk.payload_mut().extend_from_slice(&payload);
        publisher.send_chunk(chunk).unwrap();
    }

    #[test]
    fn test_zero_publisher_services_are_hidden() {
        let f = fixture();
        publish(
            &f.publisher,
            vec![
                ServiceEntry {
                    service: sd("A", "1", "x"),
                    publisher_count: 2,
                },
                ServiceEntry {
                    service: sd("B", "1", "y"),
                    publisher_count: 0,
                },
            ],
        );
        assert_eq!(f.discovery.find_service(None, None, None), vec![sd("A", "1", "x")]);
    }

    #[test]
    fn test_cache_refreshed_lazily() {
        let f = fixture();
        assert!(f.discovery.find_service(None, None, None).is_empty());

        publish(
            &f.publisher,
            vec![ServiceEntry {
                service: sd("A", "1", "x"),
                publisher_count: 1,
            }],
        );
        assert!(f.discovery.has_new_data());
        assert_eq!(f.discovery.find_service(Some("A"), None, None).len(), 1);
        assert!(!f.discovery.has_new_data());
        // No new sample: the cached copy answers.
        assert_eq!(f.discovery.find_service(None, Some("1"), Some("x")).len(), 1);
        assert!(f.discovery.find_service(Some("B"), None, None).is_empty());
    }

    #[test]
    fn test_find_with_callback() {
        let f = fixture();
        publish(
            &f.publisher,
            vec![
                ServiceEntry {
                    service: sd("A", "1", "x"),
                    publisher_count: 1,
                },
                ServiceEntry {
                    service: sd("A", "2", "x"),
                    publisher_count: 3,
                },
            ],
        );
        let mut instances = Vec::new();
        f.discovery
            .find_service_with(Some("A"), None, None, |s| instances.push(s.instance().to_string()));
        assert_eq!(instances, vec!["1", "2"]);
    }

    #[test]
    fn test_malformed_sample_keeps_cache() {
        let f = fixture();
        publish(
            &f.publisher,
            vec![ServiceEntry {
                service: sd("A", "1", "x"),
                publisher_count: 1,
            }],
        );
        assert_eq!(f.discovery.find_service(None, None, None).len(), 1);

        let mut chunk = f.publisher.try_allocate_chunk(3).unwrap();
        chunk.payload_mut().extend_from_slice(b"{{{");
        f.publisher.send_chunk(chunk).unwrap();
        assert_eq!(f.discovery.find_service(None, None, None).len(), 1);
    }

    #[test]
    fn test_enable_event_triggers_on_new_sample() {
        let f = fixture();
        let cv = ConditionVariable::shared();
        let origin: Arc<SubscriberPortData> = Arc::clone(&f.subscriber);
        let trigger = TriggerHandle::new(&cv, 5, origin, f.reporter.clone());

        assert!(f.discovery.enable_event(ServiceDiscoveryEvent::ServiceRegistryChanged, trigger));
        publish(&f.publisher, Vec::new());
        let events = cv.take_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].does_originate_from(&f.subscriber));

        assert!(f.discovery.disable_event(0u32));
        publish(&f.publisher, Vec::new());
        assert!(cv.take_events().is_empty());
    }

    #[test]
    fn test_unknown_event_reported() {
        let f = fixture();
        let cv = ConditionVariable::shared();
        let trigger = TriggerHandle::new(&cv, 1, Arc::new(()), f.reporter.clone());
        assert!(!f.discovery.enable_event(42u32, trigger));
        assert!(!f.discovery.disable_event(7u32));
        assert_eq!(
            f.reporter.reports(),
            vec![
                (ErrorCode::ServiceDiscoveryUnknownEventProvided, ErrorLevel::Moderate),
                (ErrorCode::ServiceDiscoveryUnknownEventProvided, ErrorLevel::Moderate),
            ]
        );
        assert!(!f.subscriber.has_trigger());
    }
}
