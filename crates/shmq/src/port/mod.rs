// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher, subscriber and interface ports.
//!
//! The broker only depends on the [`PublisherPort`] / [`SubscriberPort`]
//! capability traits; [`PublisherPortData`] and [`SubscriberPortData`] are the
//! concrete in-process ports the [`PortManager`] hands out.

mod interface;
mod manager;
mod publisher;
mod subscriber;

pub use interface::InterfacePortData;
pub use manager::{PortLimits, PortManager};
pub use publisher::PublisherPortData;
pub use subscriber::{SubscribeState, SubscriberPortData};

use crate::capro::{IdString, Interface, Scope, ServiceDescriptor};
use crate::error::ChunkError;
use crate::mempool::ChunkMut;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique port identifier. Zero is never assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniquePortId(u64);

impl UniquePortId {
    pub fn next() -> Self {
        Self(NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UniquePortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Static description of a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub service: ServiceDescriptor,
    pub process_name: IdString,
    pub node_name: IdString,
    pub unique_id: UniquePortId,
    pub interface: Interface,
    pub scope: Scope,
}

/// Publisher creation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherOptions {
    /// Number of sent chunks kept for late joiners
    #[serde(default)]
    pub history_capacity: usize,

    /// Offer the service as soon as the port exists
    #[serde(default = "default_true")]
    pub offer_on_create: bool,

    #[serde(default)]
    pub node_name: IdString,

    #[serde(default)]
    pub interface: Interface,

    #[serde(default)]
    pub scope: Scope,
}

impl Default for PublisherOptions {
    fn default() -> Self {
        Self {
            history_capacity: 0,
            offer_on_create: true,
            node_name: IdString::default(),
            interface: Interface::Internal,
            scope: Scope::Global,
        }
    }
}

/// Subscriber creation options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberOptions {
    /// Bound of the receive queue; oldest chunks are dropped beyond it
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Number of history chunks requested from the publisher on connect
    #[serde(default)]
    pub history_request: usize,

    /// Subscribe as soon as the port exists
    #[serde(default = "default_true")]
    pub subscribe_on_create: bool,

    #[serde(default)]
    pub node_name: IdString,

    #[serde(default)]
    pub interface: Interface,

    #[serde(default)]
    pub scope: Scope,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            history_request: 0,
            subscribe_on_create: true,
            node_name: IdString::default(),
            interface: Interface::Internal,
            scope: Scope::Global,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    256
}

/// Capabilities the broker needs from a publisher port.
pub trait PublisherPort: Send + Sync {
    fn info(&self) -> &PortInfo;

    fn unique_id(&self) -> UniquePortId {
        self.info().unique_id
    }

    fn service(&self) -> &ServiceDescriptor {
        &self.info().service
    }

    fn offer(&self);

    fn stop_offer(&self);

    fn is_offered(&self) -> bool;

    fn try_allocate_chunk(&self, size: usize) -> Result<ChunkMut, ChunkError>;

    fn send_chunk(&self, chunk: ChunkMut) -> Result<(), ChunkError>;
}

/// Capabilities the broker needs from a subscriber port.
pub trait SubscriberPort: Send + Sync {
    fn info(&self) -> &PortInfo;

    fn unique_id(&self) -> UniquePortId {
        self.info().unique_id
    }

    fn service(&self) -> &ServiceDescriptor {
        &self.info().service
    }

    fn subscription_state(&self) -> SubscribeState;

    fn queue_len(&self) -> usize;

    fn queue_capacity(&self) -> usize;
}
