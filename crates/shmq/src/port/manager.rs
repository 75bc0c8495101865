// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Port pools and capro routing.
//!
//! Every discovery run drains the pending capro requests of all ports and routes
//! them between publishers and subscribers of the same service:
//!
//! ```text
//! publisher OFFER       -> registry count +1, interfaces, waiting subscribers resubscribe
//! publisher STOP_OFFER  -> registry count -1, interfaces, subscribers wait for offer
//! subscriber SUB        -> offered publishers answer ACK (attach + history) or NACK
//! subscriber UNSUB      -> publishers detach, ACK
//! ```
//!
//! Each routed message is also reported to the [`ConnectionRegistry`], and the
//! service registry is published when it changed.
//!
//! Lock order: discovery run, then port pool, then service registry. The
//! connection registry and the ports' own locks are only taken with nothing
//! else of this module held except the discovery run.

use super::{
    InterfacePortData, PortInfo, PublisherOptions, PublisherPort, PublisherPortData,
    SubscribeState, SubscriberOptions, SubscriberPort, SubscriberPortData, UniquePortId,
};
use crate::capro::{CaproMessage, CaproMessageType, IdString, Interface, Scope, ServiceDescriptor};
use crate::config::BrokerConfig;
use crate::discovery::ServiceRegistry;
use crate::error::{ErrorCode, ErrorLevel, ErrorReporter, PortError};
use crate::introspection::ConnectionRegistry;
use crate::mempool::MemoryPool;
use parking_lot::Mutex;
use std::sync::Arc;

/// Port pool capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortLimits {
    pub max_publishers: usize,
    pub max_subscribers: usize,
    pub max_interfaces: usize,
}

impl From<&BrokerConfig> for PortLimits {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            max_publishers: config.max_publishers,
            max_subscribers: config.max_subscribers,
            max_interfaces: config.max_interfaces,
        }
    }
}

#[derive(Default)]
struct PortPool {
    publishers: Vec<Arc<PublisherPortData>>,
    subscribers: Vec<Arc<SubscriberPortData>>,
    interfaces: Vec<Arc<InterfacePortData>>,
}

struct Services {
    registry: ServiceRegistry,
    changed: bool,
}

/// Owns every port the broker created and routes capro messages between them.
pub struct PortManager {
    limits: PortLimits,
    pool: Mutex<PortPool>,
    discovery_run: Mutex<()>,
    services: Mutex<Services>,
    registry_publisher: Mutex<Option<Arc<PublisherPortData>>>,
    connections: Arc<ConnectionRegistry>,
    reporter: Arc<dyn ErrorReporter>,
}

impl PortManager {
    pub fn new(
        limits: PortLimits,
        connections: Arc<ConnectionRegistry>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            limits,
            pool: Mutex::new(PortPool::default()),
            discovery_run: Mutex::new(()),
            services: Mutex::new(Services {
                registry: ServiceRegistry::new(),
                changed: true,
            }),
            registry_publisher: Mutex::new(None),
            connections,
            reporter,
        }
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Publisher the service registry is sent on after it changed.
    pub fn set_registry_publisher(&self, publisher: Arc<PublisherPortData>) {
        *self.registry_publisher.lock() = Some(publisher);
        self.services.lock().changed = true;
    }

    fn port_info(
        service: ServiceDescriptor,
        process_name: &IdString,
        node_name: &IdString,
        interface: Interface,
        scope: Scope,
    ) -> PortInfo {
        PortInfo {
            service,
            process_name: process_name.clone(),
            node_name: node_name.clone(),
            unique_id: UniquePortId::next(),
            interface,
            scope,
        }
    }

    pub fn acquire_publisher_port(
        &self,
        service: ServiceDescriptor,
        options: &PublisherOptions,
        process_name: &IdString,
        pool: MemoryPool,
    ) -> Result<Arc<PublisherPortData>, PortError> {
        let info = Self::port_info(
            service,
            process_name,
            &options.node_name,
            options.interface,
            options.scope,
        );
        let port = Arc::new(PublisherPortData::new(info, pool, options.history_capacity));
        {
            let mut ports = self.pool.lock();
            if ports.publishers.len() >= self.limits.max_publishers {
                log::warn!(
                    "[PortManager] publisher list full, {} cannot offer {}",
                    process_name,
                    port.service()
                );
                self.reporter
                    .report(ErrorCode::PublisherListFull, ErrorLevel::Moderate);
                return Err(PortError::PublisherListFull(self.limits.max_publishers));
            }
            ports.publishers.push(Arc::clone(&port));
        }

        if !self.connections.add_publisher(port.clone()) {
            log::warn!("[PortManager] publisher {} not tracked for introspection", port.unique_id());
        }
        if options.offer_on_create {
            port.offer();
        }
        log::debug!(
            "[PortManager] created publisher {} for {} ({})",
            port.unique_id(),
            port.service(),
            process_name
        );
        Ok(port)
    }

    pub fn acquire_subscriber_port(
        &self,
        service: ServiceDescriptor,
        options: &SubscriberOptions,
        process_name: &IdString,
    ) -> Result<Arc<SubscriberPortData>, PortError> {
        let info = Self::port_info(
            service,
            process_name,
            &options.node_name,
            options.interface,
            options.scope,
        );
        let port = Arc::new(SubscriberPortData::new(
            info,
            options.queue_capacity,
            options.history_request,
        ));
        {
            let mut ports = self.pool.lock();
            if ports.subscribers.len() >= self.limits.max_subscribers {
                log::warn!(
                    "[PortManager] subscriber list full, {} cannot subscribe to {}",
                    process_name,
                    port.service()
                );
                self.reporter
                    .report(ErrorCode::SubscriberListFull, ErrorLevel::Moderate);
                return Err(PortError::SubscriberListFull(self.limits.max_subscribers));
            }
            ports.subscribers.push(Arc::clone(&port));
        }

        if !self.connections.add_subscriber(port.clone()) {
            log::warn!("[PortManager] subscriber {} not tracked for introspection", port.unique_id());
        }
        if options.subscribe_on_create {
            port.subscribe();
        }
        log::debug!(
            "[PortManager] created subscriber {} for {} ({})",
            port.unique_id(),
            port.service(),
            process_name
        );
        Ok(port)
    }

    /// Create an interface port. It immediately learns every service currently
    /// offered by ports of other interfaces.
    pub fn acquire_interface_port(
        &self,
        interface: Interface,
        process_name: &IdString,
        node_name: &IdString,
    ) -> Result<Arc<InterfacePortData>, PortError> {
        let info = Self::port_info(
            ServiceDescriptor::default(),
            process_name,
            node_name,
            interface,
            Scope::Global,
        );
        let port = Arc::new(InterfacePortData::new(info));

        let offered: Vec<Arc<PublisherPortData>> = {
            let mut ports = self.pool.lock();
            if ports.interfaces.len() >= self.limits.max_interfaces {
                log::warn!("[PortManager] interface list full, {} rejected", process_name);
                self.reporter
                    .report(ErrorCode::InterfaceListFull, ErrorLevel::Moderate);
                return Err(PortError::InterfaceListFull(self.limits.max_interfaces));
            }
            ports.interfaces.push(Arc::clone(&port));
            ports
                .publishers
                .iter()
                .filter(|p| p.is_offered())
                .cloned()
                .collect()
        };

        for publisher in offered {
            let info = publisher.info();
            if info.scope == Scope::Global && info.interface != interface {
                port.deliver(CaproMessage::new(CaproMessageType::Offer, info.service.clone()));
            }
        }
        log::debug!(
            "[PortManager] created {:?} interface {} ({})",
            interface,
            port.info().unique_id,
            process_name
        );
        Ok(port)
    }

    fn snapshot(
        &self,
    ) -> (
        Vec<Arc<PublisherPortData>>,
        Vec<Arc<SubscriberPortData>>,
        Vec<Arc<InterfacePortData>>,
    ) {
        let ports = self.pool.lock();
        (
            ports.publishers.clone(),
            ports.subscribers.clone(),
            ports.interfaces.clone(),
        )
    }

    /// One discovery run: route all pending capro requests, then publish the
    /// service registry if it changed.
    pub fn do_discovery(&self) {
        let _run = self.discovery_run.lock();
        let (publishers, subscribers, interfaces) = self.snapshot();

        for publisher in &publishers {
            while let Some(message) = publisher.take_capro_request() {
                self.route_publisher_message(
                    publisher,
                    &message,
                    &publishers,
                    &subscribers,
                    &interfaces,
                );
            }
        }
        for subscriber in &subscribers {
            while let Some(message) = subscriber.take_capro_request() {
                self.route_subscriber_message(subscriber, &message, &publishers);
            }
        }

        self.publish_service_registry();
    }

    fn route_publisher_message(
        &self,
        publisher: &Arc<PublisherPortData>,
        message: &CaproMessage,
        publishers: &[Arc<PublisherPortData>],
        subscribers: &[Arc<SubscriberPortData>],
        interfaces: &[Arc<InterfacePortData>],
    ) {
        let same_service = subscribers.iter().filter(|s| *s.service() == message.service);
        match message.kind {
            CaproMessageType::Offer => {
                {
                    let mut services = self.services.lock();
                    services.registry.add(&message.service);
                    services.changed = true;
                }
                self.connections.report_message(message);
                self.forward_to_interfaces(publisher.info(), message, interfaces);
                for subscriber in same_service {
                    subscriber.handle_capro(CaproMessageType::Offer);
                }
                log::debug!(
                    "[PortManager] {} offered by {}",
                    message.service,
                    publisher.unique_id()
                );
            }
            CaproMessageType::StopOffer => {
                {
                    let mut services = self.services.lock();
                    services.registry.remove(&message.service);
                    services.changed = true;
                }
                publisher.detach_all();
                self.connections.report_message(message);
                self.forward_to_interfaces(publisher.info(), message, interfaces);

                let still_offered = publishers.iter().any(|p| {
                    !Arc::ptr_eq(p, publisher) && *p.service() == message.service && p.is_offered()
                });
                for subscriber in same_service {
                    if subscriber.handle_capro(CaproMessageType::StopOffer) && still_offered {
                        subscriber.handle_capro(CaproMessageType::Offer);
                    }
                }
                log::debug!(
                    "[PortManager] {} no longer offered by {}",
                    message.service,
                    publisher.unique_id()
                );
            }
            other => log::debug!("[PortManager] ignoring {} from publisher", other),
        }
    }

    fn route_subscriber_message(
        &self,
        subscriber: &Arc<SubscriberPortData>,
        message: &CaproMessage,
        publishers: &[Arc<PublisherPortData>],
    ) {
        let id = subscriber.unique_id();
        let same_service = publishers.iter().filter(|p| *p.service() == message.service);
        let mut response = CaproMessageType::Nack;
        match message.kind {
            CaproMessageType::Sub => {
                self.connections.report_message_for(message, id);
                for publisher in same_service.filter(|p| p.is_offered()) {
                    if publisher.handle_subscribe(message, subscriber) == CaproMessageType::Ack {
                        response = CaproMessageType::Ack;
                    }
                }
            }
            CaproMessageType::Unsub => {
                self.connections.report_message_for(message, id);
                for publisher in same_service {
                    if publisher.handle_unsubscribe(subscriber) == CaproMessageType::Ack {
                        response = CaproMessageType::Ack;
                    }
                }
            }
            other => {
                log::debug!("[PortManager] ignoring {} from subscriber {}", other, id);
                return;
            }
        }

        subscriber.handle_capro(response);
        self.connections
            .report_message_for(&CaproMessage::new(response, message.service.clone()), id);
        log::debug!(
            "[PortManager] {} {} for subscriber {}: {}",
            message.kind,
            message.service,
            id,
            response
        );
    }

    fn forward_to_interfaces(
        &self,
        origin: &PortInfo,
        message: &CaproMessage,
        interfaces: &[Arc<InterfacePortData>],
    ) {
        if origin.scope == Scope::Local {
            return;
        }
        for interface in interfaces {
            if interface.info().interface != origin.interface {
                interface.deliver(message.clone());
            }
        }
    }

    fn publish_service_registry(&self) {
        let Some(publisher) = self.registry_publisher.lock().clone() else {
            return;
        };
        let payload = {
            let mut services = self.services.lock();
            if !services.changed {
                return;
            }
            match serde_json::to_vec(&services.registry) {
                Ok(payload) => {
                    services.changed = false;
                    payload
                }
                Err(e) => {
                    log::error!("[PortManager] failed to serialize service registry: {}", e);
                    return;
                }
            }
        };

        let sent = publisher.try_allocate_chunk(payload.len()).and_then(|mut chunk| {
            chunk.payload_mut().extend_from_slice(&payload);
            publisher.send_chunk(chunk)
        });
        if let Err(e) = sent {
            log::debug!("[PortManager] service registry not published, retrying: {}", e);
            self.services.lock().changed = true;
        }
    }

    /// Tear down every port owned by `process_name`. Offered services are
    /// withdrawn as if the publishers had stopped offering.
    pub fn delete_ports_of_process(&self, process_name: &IdString) {
        let _run = self.discovery_run.lock();

        let (removed_publishers, removed_subscribers, removed_interfaces) = {
            let mut ports = self.pool.lock();
            let (removed_publishers, kept): (Vec<_>, Vec<_>) = ports
                .publishers
                .drain(..)
                .partition(|p| p.info().process_name == *process_name);
            ports.publishers = kept;
            let (removed_subscribers, kept): (Vec<_>, Vec<_>) = ports
                .subscribers
                .drain(..)
                .partition(|s| s.info().process_name == *process_name);
            ports.subscribers = kept;
            let before = ports.interfaces.len();
            ports
                .interfaces
                .retain(|i| i.info().process_name != *process_name);
            (removed_publishers, removed_subscribers, before - ports.interfaces.len())
        };
        let (publishers, subscribers, interfaces) = self.snapshot();

        for publisher in &removed_publishers {
            publisher.stop_offer();
            while let Some(message) = publisher.take_capro_request() {
                self.route_publisher_message(
                    publisher,
                    &message,
                    &publishers,
                    &subscribers,
                    &interfaces,
                );
            }
            self.connections
                .remove_publisher(publisher.service(), publisher.unique_id());
        }
        for subscriber in &removed_subscribers {
            for publisher in publishers.iter().filter(|p| p.service() == subscriber.service()) {
                publisher.handle_unsubscribe(subscriber);
            }
            self.connections
                .remove_subscriber(subscriber.service(), subscriber.unique_id());
        }

        log::debug!(
            "[PortManager] removed {} publishers, {} subscribers, {} interfaces of {}",
            removed_publishers.len(),
            removed_subscribers.len(),
            removed_interfaces,
            process_name
        );
        self.publish_service_registry();
    }

    /// True if every subscriber port of `process_name` is subscribed.
    pub fn are_all_subscriber_ports_subscribed(&self, process_name: &IdString) -> bool {
        self.pool
            .lock()
            .subscribers
            .iter()
            .filter(|s| s.info().process_name == *process_name)
            .all(|s| s.subscription_state() == SubscribeState::Subscribed)
    }

    pub fn publisher_port(&self, id: UniquePortId) -> Option<Arc<PublisherPortData>> {
        self.pool
            .lock()
            .publishers
            .iter()
            .find(|p| p.unique_id() == id)
            .cloned()
    }

    pub fn subscriber_port(&self, id: UniquePortId) -> Option<Arc<SubscriberPortData>> {
        self.pool
            .lock()
            .subscribers
            .iter()
            .find(|s| s.unique_id() == id)
            .cloned()
    }

    pub fn interface_port(&self, id: UniquePortId) -> Option<Arc<InterfacePortData>> {
        self.pool
            .lock()
            .interfaces
            .iter()
            .find(|i| i.info().unique_id == id)
            .cloned()
    }

    /// Copy of the broker-side service registry.
    pub fn service_registry(&self) -> ServiceRegistry {
        self.services.lock().registry.clone()
    }

    /// (publishers, subscribers, interfaces) currently in the pools.
    pub fn port_counts(&self) -> (usize, usize, usize) {
        let ports = self.pool.lock();
        (
            ports.publishers.len(),
            ports.subscribers.len(),
            ports.interfaces.len(),
        )
    }
}
