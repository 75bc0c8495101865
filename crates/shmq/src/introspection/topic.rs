// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Introspection topic samples, serialized as JSON into chunks.

use super::ConnectionState;
use crate::capro::{IdString, Interface, Scope, ServiceDescriptor};
use crate::discovery::ServiceEntry;
use crate::port::{SubscribeState, UniquePortId};
use serde::{Deserialize, Serialize};

/// One publisher in the port graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherPortRecord {
    /// Dense snapshot index, referenced by [`SubscriberPortRecord::publisher_index`]
    pub index: u32,
    pub process_name: IdString,
    pub node_name: IdString,
    pub service: ServiceDescriptor,
    pub unique_id: UniquePortId,
    pub interface: Interface,
}

/// One subscriber (connection) in the port graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberPortRecord {
    pub process_name: IdString,
    pub node_name: IdString,
    pub service: ServiceDescriptor,
    pub unique_id: UniquePortId,
    pub interface: Interface,
    pub state: ConnectionState,
    /// Index of the connected publisher; `None` unless `state` is `Connected`
    pub publisher_index: Option<u32>,
}

/// Full port graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortIntrospectionTopic {
    pub publishers: Vec<PublisherPortRecord>,
    pub subscribers: Vec<SubscriberPortRecord>,
}

impl PortIntrospectionTopic {
    /// Resolve the publisher a subscriber record is connected to.
    pub fn publisher_of(&self, subscriber: &SubscriberPortRecord) -> Option<&PublisherPortRecord> {
        let index = subscriber.publisher_index?;
        self.publishers.iter().find(|p| p.index == index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputRecord {
    pub unique_id: UniquePortId,
    pub service: ServiceDescriptor,
    pub sent_chunks: u64,
}

/// Throughput topic. Published on every tick but carries no measurements yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThroughputTopic {
    pub publishers: Vec<ThroughputRecord>,
}

/// Per-subscriber runtime data that changes without topology changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberChangingRecord {
    pub unique_id: UniquePortId,
    pub service: ServiceDescriptor,
    pub subscription_state: SubscribeState,
    pub propagation_scope: Scope,
    pub queue_len: usize,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberChangingTopic {
    pub subscribers: Vec<SubscriberChangingRecord>,
}

/// One registered process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub name: IdString,
    pub session_id: u64,
    pub monitored: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessIntrospectionTopic {
    pub processes: Vec<ProcessRecord>,
}

/// Largest number of records any broker-published sample can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicLimits {
    pub max_publishers: usize,
    pub max_subscribers: usize,
    pub max_processes: usize,
}

/// Field names and brackets of a sample around its record lists.
const SAMPLE_ENVELOPE: usize = 64;

fn record_size<T: Serialize>(record: &T) -> Result<usize, serde_json::Error> {
    // One separating comma per record.
    Ok(serde_json::to_vec(record)?.len() + 1)
}

/// Upper bound of the serialized size of any sample the broker publishes on
/// its own ports: the introspection topics and the service registry.
///
/// Records are measured with maximal identifiers whose every byte needs a
/// `\u00XX` escape and with the longest enum variant names.
pub fn max_sample_size(limits: TopicLimits) -> Result<usize, serde_json::Error> {
    let publisher = record_size(&PublisherPortRecord {
        index: u32::MAX,
        process_name: IdString::widest(),
        node_name: IdString::widest(),
        service: ServiceDescriptor::widest(),
        unique_id: UniquePortId::from_raw(u64::MAX),
        interface: Interface::Internal,
    })?;
    let subscriber = record_size(&SubscriberPortRecord {
        process_name: IdString::widest(),
        node_name: IdString::widest(),
        service: ServiceDescriptor::widest(),
        unique_id: UniquePortId::from_raw(u64::MAX),
        interface: Interface::Internal,
        state: ConnectionState::SubRequested,
        publisher_index: Some(u32::MAX),
    })?;
    let throughput = record_size(&ThroughputRecord {
        unique_id: UniquePortId::from_raw(u64::MAX),
        service: ServiceDescriptor::widest(),
        sent_chunks: u64::MAX,
    })?;
    let changing = record_size(&SubscriberChangingRecord {
        unique_id: UniquePortId::from_raw(u64::MAX),
        service: ServiceDescriptor::widest(),
        subscription_state: SubscribeState::UnsubscribeRequested,
        propagation_scope: Scope::Global,
        queue_len: usize::MAX,
        queue_capacity: usize::MAX,
    })?;
    let process = record_size(&ProcessRecord {
        pid: u32::MAX,
        name: IdString::widest(),
        session_id: u64::MAX,
        monitored: false,
    })?;
    let service = record_size(&ServiceEntry {
        service: ServiceDescriptor::widest(),
        publisher_count: u32::MAX,
    })?;

    let largest = [
        publisher * limits.max_publishers + subscriber * limits.max_subscribers,
        throughput * limits.max_publishers,
        changing * limits.max_subscribers,
        process * limits.max_processes,
        service * limits.max_publishers,
    ]
    .into_iter()
    .max()
    .unwrap_or(0);
    Ok(largest + SAMPLE_ENVELOPE)
}
