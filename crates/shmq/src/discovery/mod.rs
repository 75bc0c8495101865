// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service registry and client-side service discovery.

mod registry;
mod service_discovery;

pub use registry::{ServiceEntry, ServiceRegistry};
pub use service_discovery::{ServiceDiscovery, ServiceDiscoveryEvent};

use crate::capro::{CaproError, ServiceDescriptor};

pub const SERVICE_REGISTRY_SERVICE: &str = "ServiceRegistry";
pub const SERVICE_REGISTRY_INSTANCE: &str = "Broker";
pub const SERVICE_REGISTRY_EVENT: &str = "Services";

/// Descriptor of the topic the broker publishes the registry on.
pub fn service_registry_service() -> Result<ServiceDescriptor, CaproError> {
    ServiceDescriptor::new(
        SERVICE_REGISTRY_SERVICE,
        SERVICE_REGISTRY_INSTANCE,
        SERVICE_REGISTRY_EVENT,
    )
}
