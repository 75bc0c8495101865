// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # shmq - shared-memory publish/subscribe broker core
//!
//! The broker tracks every process attached to the shared-memory segments,
//! owns the publisher/subscriber ports they create, runs the capro handshake
//! between matching ports and publishes an introspection feed plus the
//! service registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shmq::{Broker, BrokerConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Broker::new(BrokerConfig::default())?;
//!     broker.start()?;
//!     // feed requests: broker.dispatcher().dispatch(request, &mailbox)
//!     broker.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  control channel  ->  RequestDispatcher  ->  ProcessManager         |
//! +---------------------------------------------------------------------+
//! |  PortManager: port pools, capro routing, ServiceRegistry            |
//! +---------------------------------------------------------------------+
//! |  ConnectionRegistry (handshake state)  ->  IntrospectionPublisher   |
//! +---------------------------------------------------------------------+
//! |  client side: ServiceDiscovery over the registry subscriber port    |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Broker`] | Composes everything, owns the background loops |
//! | [`ProcessManager`] | Registration, liveness, removal of processes |
//! | [`PortManager`] | Port pools and capro routing |
//! | [`ConnectionRegistry`] | Handshake state per subscriber, introspection snapshots |
//! | [`ServiceDiscovery`] | Client-side service lookup |

pub mod broker;
pub mod capro;
pub mod config;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod introspection;
pub mod ipc;
pub mod mempool;
pub mod periodic;
pub mod port;
pub mod process;
pub mod trigger;
pub mod version;

pub use broker::{Broker, BrokerBuilder, BrokerError};
pub use capro::{CaproMessage, CaproMessageType, IdString, Interface, Scope, ServiceDescriptor};
pub use config::{BrokerConfig, ConfigError};
pub use discovery::{ServiceDiscovery, ServiceDiscoveryEvent, ServiceRegistry};
pub use dispatch::RequestDispatcher;
pub use error::{ErrorCode, ErrorLevel, ErrorReporter, LogErrorReporter};
pub use introspection::{ConnectionRegistry, ConnectionState, IntrospectionPublisher};
pub use ipc::{Request, Response};
pub use port::{PortManager, PublisherOptions, SubscriberOptions, UniquePortId};
pub use process::{Mailbox, ProcessControl, ProcessManager, Registration};
pub use version::{CompatibilityCheckLevel, VersionInfo};
