// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection registry: publishers, subscriber connections and the handshake
//! state of each connection, as observed from routed capro messages.
//!
//! # Structure
//!
//! Publishers and connections live in two arenas and are indexed by
//! `(ServiceDescriptor, UniquePortId)`. A connection refers to its publisher by
//! arena handle; removing a publisher resets and detaches every connection
//! pointing at it, so a handle stored in a connection always resolves.
//!
//! Attachment is structural and unconditional: adding a publisher attaches it to
//! every connection of the same service and adding a subscriber attaches the
//! first publisher found. Only the capro handshake moves a connection to
//! `Connected`.
//!
//! # Locking
//!
//! One mutex covers every operation. The "new data" flag is an `AtomicBool`
//! stored with `Release` after each mutation and read with `Acquire`, so the
//! introspection publisher can poll it without the mutex. Snapshots clear it
//! inside the same critical section.

use super::arena::{Arena, Handle};
use super::topic::{
    PortIntrospectionTopic, PublisherPortRecord, SubscriberChangingRecord,
    SubscriberChangingTopic, SubscriberPortRecord, ThroughputTopic,
};
use crate::capro::{CaproMessage, CaproMessageType, ServiceDescriptor};
use crate::port::{PublisherPort, SubscriberPort, UniquePortId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handshake state of one subscriber connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Default,
    SubRequested,
    Connected,
}

impl ConnectionState {
    /// Transition on one message. Anything not listed is a no-op.
    ///
    /// | state          | message              | next           |
    /// |----------------|----------------------|----------------|
    /// | `Default`      | `SUB`                | `SubRequested` |
    /// | `SubRequested` | `ACK`                | `Connected`    |
    /// | `SubRequested` | `NACK`               | `Default`      |
    /// | `Connected`    | `STOP_OFFER`/`UNSUB` | `Default`      |
    pub fn next(self, message: CaproMessageType) -> Self {
        use CaproMessageType as M;
        match (self, message) {
            (Self::Default, M::Sub) => Self::SubRequested,
            (Self::SubRequested, M::Ack) => Self::Connected,
            (Self::SubRequested, M::Nack) => Self::Default,
            (Self::Connected, M::StopOffer | M::Unsub) => Self::Default,
            (state, _) => state,
        }
    }
}

struct PublisherInfo {
    port: Arc<dyn PublisherPort>,
    connections: BTreeSet<Handle>,
}

struct ConnectionInfo {
    port: Arc<dyn SubscriberPort>,
    publisher: Option<Handle>,
    state: ConnectionState,
}

type PortIndex = BTreeMap<ServiceDescriptor, BTreeMap<UniquePortId, Handle>>;

struct Inner {
    publishers: Arena<PublisherInfo>,
    connections: Arena<ConnectionInfo>,
    publisher_index: PortIndex,
    connection_index: PortIndex,
}

impl Inner {
    fn lookup(index: &PortIndex, service: &ServiceDescriptor, id: UniquePortId) -> Option<Handle> {
        index.get(service).and_then(|ports| ports.get(&id)).copied()
    }

    /// Point `connection` at `publisher`, keeping the publisher side in step.
    fn attach(&mut self, connection: Handle, publisher: Handle) {
        let previous = match self.connections.get_mut(connection) {
            Some(info) => info.publisher.replace(publisher),
            None => return,
        };
        if let Some(previous) = previous.filter(|p| *p != publisher) {
            if let Some(info) = self.publishers.get_mut(previous) {
                info.connections.remove(&connection);
            }
        }
        if let Some(info) = self.publishers.get_mut(publisher) {
            info.connections.insert(connection);
        }
    }

    fn apply(&mut self, handle: Handle, message: CaproMessageType) -> bool {
        match self.connections.get_mut(handle) {
            Some(info) => {
                let next = info.state.next(message);
                let changed = next != info.state;
                info.state = next;
                changed
            }
            None => false,
        }
    }
}

/// Registry of publishers and subscriber connections.
pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
    new_data: AtomicBool,
}

impl ConnectionRegistry {
    pub fn new(max_publishers: usize, max_subscribers: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                publishers: Arena::with_capacity(max_publishers),
                connections: Arena::with_capacity(max_subscribers),
                publisher_index: BTreeMap::new(),
                connection_index: BTreeMap::new(),
            }),
            new_data: AtomicBool::new(false),
        }
    }

    /// Flag the port graph for the next snapshot, e.g. after a snapshot that
    /// could not be published.
    pub(crate) fn mark_new(&self) {
        self.new_data.store(true, Ordering::Release);
    }

    /// True if a mutation completed since the last port snapshot.
    pub fn is_new(&self) -> bool {
        self.new_data.load(Ordering::Acquire)
    }

    /// Register a publisher and attach it to every connection of its service.
    /// Rejects a duplicate `(service, port id)` and a full registry.
    pub fn add_publisher(&self, port: Arc<dyn PublisherPort>) -> bool {
        let service = port.service().clone();
        let id = port.unique_id();

        let mut inner = self.inner.lock();
        if Inner::lookup(&inner.publisher_index, &service, id).is_some() {
            log::debug!("[introspection] publisher {} for {} already registered", id, service);
            return false;
        }
        let Some(handle) = inner.publishers.insert(PublisherInfo {
            port,
            connections: BTreeSet::new(),
        }) else {
            log::warn!("[introspection] publisher registry full, {} not tracked", id);
            return false;
        };
        inner
            .publisher_index
            .entry(service.clone())
            .or_default()
            .insert(id, handle);

        let matching: Vec<Handle> = inner
            .connection_index
            .get(&service)
            .map(|ports| ports.values().copied().collect())
            .unwrap_or_default();
        for connection in matching {
            inner.attach(connection, handle);
        }
        drop(inner);

        self.mark_new();
        true
    }

    /// Register a subscriber connection and attach the newest publisher of its
    /// service, if any. Port ids grow monotonically, so this is the publisher
    /// with the highest id, the same one [`add_publisher`](Self::add_publisher)
    /// would have attached.
    pub fn add_subscriber(&self, port: Arc<dyn SubscriberPort>) -> bool {
        let service = port.service().clone();
        let id = port.unique_id();

        let mut inner = self.inner.lock();
        if Inner::lookup(&inner.connection_index, &service, id).is_some() {
            log::debug!("[introspection] subscriber {} for {} already registered", id, service);
            return false;
        }
        let Some(handle) = inner.connections.insert(ConnectionInfo {
            port,
            publisher: None,
            state: ConnectionState::Default,
        }) else {
            log::warn!("[introspection] connection registry full, {} not tracked", id);
            return false;
        };
        inner
            .connection_index
            .entry(service.clone())
            .or_default()
            .insert(id, handle);

        let publisher = inner
            .publisher_index
            .get(&service)
            .and_then(|ports| ports.values().next_back().copied());
        if let Some(publisher) = publisher {
            inner.attach(handle, publisher);
        }
        drop(inner);

        self.mark_new();
        true
    }

    /// Remove a publisher. Every connection pointing at it loses the reference
    /// and falls back to `Default`.
    pub fn remove_publisher(&self, service: &ServiceDescriptor, id: UniquePortId) -> bool {
        let mut inner = self.inner.lock();
        let Some(handle) = Inner::lookup(&inner.publisher_index, service, id) else {
            return false;
        };
        if let Some(ports) = inner.publisher_index.get_mut(service) {
            ports.remove(&id);
            if ports.is_empty() {
                inner.publisher_index.remove(service);
            }
        }
        if let Some(info) = inner.publishers.remove(handle) {
            for connection in info.connections {
                if let Some(conn) = inner.connections.get_mut(connection) {
                    conn.publisher = None;
                    conn.state = ConnectionState::Default;
                }
            }
        }
        drop(inner);

        self.mark_new();
        true
    }

    /// Remove a subscriber connection. Other connections are untouched.
    pub fn remove_subscriber(&self, service: &ServiceDescriptor, id: UniquePortId) -> bool {
        let mut inner = self.inner.lock();
        let Some(handle) = Inner::lookup(&inner.connection_index, service, id) else {
            return false;
        };
        if let Some(ports) = inner.connection_index.get_mut(service) {
            ports.remove(&id);
            if ports.is_empty() {
                inner.connection_index.remove(service);
            }
        }
        if let Some(publisher) = inner.connections.remove(handle).and_then(|c| c.publisher) {
            if let Some(info) = inner.publishers.get_mut(publisher) {
                info.connections.remove(&handle);
            }
        }
        drop(inner);

        self.mark_new();
        true
    }

    /// Apply `message` to every connection of its service.
    pub fn report_message(&self, message: &CaproMessage) {
        let mut inner = self.inner.lock();
        let targets: Vec<Handle> = inner
            .connection_index
            .get(&message.service)
            .map(|ports| ports.values().copied().collect())
            .unwrap_or_default();
        let mut changed = false;
        for handle in targets {
            changed |= inner.apply(handle, message.kind);
        }
        drop(inner);

        if changed {
            self.mark_new();
        }
    }

    /// Apply `message` to the connection of subscriber `id` only.
    pub fn report_message_for(&self, message: &CaproMessage, id: UniquePortId) {
        let mut inner = self.inner.lock();
        let changed = match Inner::lookup(&inner.connection_index, &message.service, id) {
            Some(handle) => inner.apply(handle, message.kind),
            None => {
                log::debug!(
                    "[introspection] {} for unknown subscriber {} on {}",
                    message.kind,
                    id,
                    message.service
                );
                false
            }
        };
        drop(inner);

        if changed {
            self.mark_new();
        }
    }

    /// Snapshot of the port graph. Clears the "new data" flag.
    pub fn prepare_port_topic(&self) -> PortIntrospectionTopic {
        let inner = self.inner.lock();
        let mut topic = PortIntrospectionTopic::default();
        let mut indices: HashMap<Handle, u32> = HashMap::new();

        for handle in inner.publisher_index.values().flat_map(|ports| ports.values()) {
            let Some(publisher) = inner.publishers.get(*handle) else {
                continue;
            };
            let index = topic.publishers.len() as u32;
            indices.insert(*handle, index);
            let info = publisher.port.info();
            topic.publishers.push(PublisherPortRecord {
                index,
                process_name: info.process_name.clone(),
                node_name: info.node_name.clone(),
                service: info.service.clone(),
                unique_id: info.unique_id,
                interface: info.interface,
            });
        }

        for handle in inner.connection_index.values().flat_map(|ports| ports.values()) {
            let Some(connection) = inner.connections.get(*handle) else {
                continue;
            };
            let publisher_index = match connection.state {
                ConnectionState::Connected => connection
                    .publisher
                    .and_then(|p| indices.get(&p).copied()),
                _ => None,
            };
            let info = connection.port.info();
            topic.subscribers.push(SubscriberPortRecord {
                process_name: info.process_name.clone(),
                node_name: info.node_name.clone(),
                service: info.service.clone(),
                unique_id: info.unique_id,
                interface: info.interface,
                state: connection.state,
                publisher_index,
            });
        }

        self.new_data.store(false, Ordering::Release);
        topic
    }

    pub fn prepare_throughput_topic(&self) -> ThroughputTopic {
        ThroughputTopic::default()
    }

    /// Runtime data of every subscriber port.
    pub fn prepare_subscriber_changing_topic(&self) -> SubscriberChangingTopic {
        let inner = self.inner.lock();
        let subscribers = inner
            .connection_index
            .values()
            .flat_map(|ports| ports.values())
            .filter_map(|handle| inner.connections.get(*handle))
            .map(|connection| {
                let port = &connection.port;
                SubscriberChangingRecord {
                    unique_id: port.unique_id(),
                    service: port.service().clone(),
                    subscription_state: port.subscription_state(),
                    propagation_scope: port.info().scope,
                    queue_len: port.queue_len(),
                    queue_capacity: port.queue_capacity(),
                }
            })
            .collect();
        SubscriberChangingTopic { subscribers }
    }

    pub fn publisher_count(&self) -> usize {
        self.inner.lock().publishers.len()
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// State of the connection of subscriber `id`.
    pub fn connection_state(
        &self,
        service: &ServiceDescriptor,
        id: UniquePortId,
    ) -> Option<ConnectionState> {
        let inner = self.inner.lock();
        let handle = Inner::lookup(&inner.connection_index, service, id)?;
        inner.connections.get(handle).map(|c| c.state)
    }

    /// Port id of the publisher the connection of subscriber `id` is attached to.
    pub fn attached_publisher(
        &self,
        service: &ServiceDescriptor,
        id: UniquePortId,
    ) -> Option<UniquePortId> {
        let inner = self.inner.lock();
        let handle = Inner::lookup(&inner.connection_index, service, id)?;
        let publisher = inner.connections.get(handle)?.publisher?;
        inner.publishers.get(publisher).map(|p| p.port.unique_id())
    }
}
