// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection tracking and the introspection feed.

mod arena;
mod connection;
mod process;
mod publisher;
pub mod topic;

pub use connection::{ConnectionRegistry, ConnectionState};
pub use process::ProcessIntrospection;
pub use publisher::{IntrospectionPorts, IntrospectionPublisher};
pub use topic::{
    PortIntrospectionTopic, ProcessIntrospectionTopic, SubscriberChangingTopic, ThroughputTopic,
};

use crate::capro::{CaproError, ServiceDescriptor};

pub const INTROSPECTION_SERVICE: &str = "Introspection";
pub const INTROSPECTION_INSTANCE: &str = "Broker";

pub const PORT_EVENT: &str = "Port";
pub const THROUGHPUT_EVENT: &str = "Throughput";
pub const SUBSCRIBER_DATA_EVENT: &str = "SubscriberData";
pub const PROCESS_EVENT: &str = "Process";

/// Descriptor of the introspection topic carrying `event`.
pub fn introspection_service(event: &str) -> Result<ServiceDescriptor, CaproError> {
    ServiceDescriptor::new(INTROSPECTION_SERVICE, INTROSPECTION_INSTANCE, event)
}
