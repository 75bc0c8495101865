// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The broker: owns the port pools, the process list, the introspection feed
//! and the two background loops.
//!
//! ```text
//! shmq-discovery  every discovery_interval          route capro, publish registry
//! shmq-monitor    every process_keepalive_interval  evict silent processes
//! shmq-introspection  every introspection_interval  publish introspection topics
//! ```

use crate::capro::{CaproError, IdString};
use crate::config::{BrokerConfig, ConfigError};
use crate::discovery::service_registry_service;
use crate::dispatch::RequestDispatcher;
use crate::error::{ErrorReporter, LogErrorReporter, PortError};
use crate::introspection::topic::{max_sample_size, TopicLimits};
use crate::introspection::{
    introspection_service, ConnectionRegistry, IntrospectionPorts, IntrospectionPublisher,
    ProcessIntrospection, PORT_EVENT, PROCESS_EVENT, SUBSCRIBER_DATA_EVENT, THROUGHPUT_EVENT,
};
use crate::mempool::MemoryPool;
use crate::periodic::PeriodicTask;
use crate::port::{PortLimits, PortManager, PublisherOptions, PublisherPortData};
use crate::process::{
    AccessControl, AllowAll, HeapSegments, PosixSignaler, ProcessCollaborators, ProcessManager,
    ProcessSignaler, SegmentResolver,
};
use crate::version::VersionInfo;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Process name of the broker's own ports.
pub const BROKER_PROCESS_NAME: &str = "shmq-broker";

/// Segment id of the broker's own memory pool.
pub const BROKER_SEGMENT_ID: u64 = 0;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("identifier: {0}")]
    Capro(#[from] CaproError),

    #[error("broker port: {0}")]
    Port(#[from] PortError),

    #[error("failed to spawn broker thread: {0}")]
    Thread(#[from] std::io::Error),

    #[error("introspection sample sizing: {0}")]
    Topic(#[from] serde_json::Error),
}

/// Builder for [`Broker`]. Collaborators default to the POSIX/heap
/// implementations.
pub struct BrokerBuilder {
    config: BrokerConfig,
    reporter: Option<Arc<dyn ErrorReporter>>,
    signaler: Option<Arc<dyn ProcessSignaler>>,
    segments: Option<Arc<dyn SegmentResolver>>,
    access: Option<Arc<dyn AccessControl>>,
    version: Option<VersionInfo>,
}

impl BrokerBuilder {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            reporter: None,
            signaler: None,
            segments: None,
            access: None,
            version: None,
        }
    }

    pub fn reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn signaler(mut self, signaler: Arc<dyn ProcessSignaler>) -> Self {
        self.signaler = Some(signaler);
        self
    }

    pub fn segments(mut self, segments: Arc<dyn SegmentResolver>) -> Self {
        self.segments = Some(segments);
        self
    }

    pub fn access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = Some(access);
        self
    }

    /// Version registering processes are checked against.
    pub fn version(mut self, version: VersionInfo) -> Self {
        self.version = Some(version);
        self
    }

    pub fn build(self) -> Result<Broker, BrokerError> {
        let config = self.config;
        config.validate()?;

        let reporter = self
            .reporter
            .unwrap_or_else(|| Arc::new(LogErrorReporter));
        let connections = Arc::new(ConnectionRegistry::new(
            config.max_publishers,
            config.max_subscribers,
        ));
        let ports = Arc::new(PortManager::new(
            PortLimits::from(&config),
            Arc::clone(&connections),
            Arc::clone(&reporter),
        ));

        let broker_name = IdString::new(BROKER_PROCESS_NAME)?;
        let pool = MemoryPool::new(
            BROKER_SEGMENT_ID,
            broker_chunk_size(&config)?,
            config.introspection_chunk_count,
        );

        let registry_service = service_registry_service()?;
        let registry_publisher = ports.acquire_publisher_port(
            registry_service.clone(),
            &PublisherOptions {
                history_capacity: 1,
                ..Default::default()
            },
            &broker_name,
            pool.clone(),
        )?;
        ports.set_registry_publisher(registry_publisher);

        let introspection_port = |event: &str| -> Result<Arc<PublisherPortData>, BrokerError> {
            let options = PublisherOptions {
                history_capacity: 1,
                offer_on_create: false,
                ..Default::default()
            };
            Ok(ports.acquire_publisher_port(
                introspection_service(event)?,
                &options,
                &broker_name,
                pool.clone(),
            )?)
        };
        let introspection_ports = IntrospectionPorts {
            ports: introspection_port(PORT_EVENT)?,
            throughput: introspection_port(THROUGHPUT_EVENT)?,
            subscriber_data: introspection_port(SUBSCRIBER_DATA_EVENT)?,
            processes: introspection_port(PROCESS_EVENT)?,
        };

        let process_introspection = Arc::new(ProcessIntrospection::new());
        let introspection = IntrospectionPublisher::new(
            Arc::clone(&connections),
            Arc::clone(&process_introspection),
            config.introspection_interval(),
            Arc::clone(&reporter),
        );
        introspection.register_publisher_ports(introspection_ports);

        let collaborators = ProcessCollaborators {
            segments: self.segments.unwrap_or_else(|| {
                Arc::new(HeapSegments::new(
                    config.user_chunk_size,
                    config.user_chunk_count,
                ))
            }),
            access: self.access.unwrap_or_else(|| Arc::new(AllowAll)),
            signaler: self.signaler.unwrap_or_else(|| Arc::new(PosixSignaler)),
            reporter,
        };
        let mut processes = ProcessManager::new(
            &config,
            Arc::clone(&ports),
            process_introspection,
            registry_service,
            collaborators,
        );
        if let Some(version) = self.version {
            processes = processes.with_version(version);
        }
        let processes = Arc::new(processes);

        Ok(Broker {
            dispatcher: RequestDispatcher::new(Arc::clone(&processes)),
            config,
            connections,
            ports,
            processes,
            introspection,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

/// Chunk size of the broker pool: the configured size, raised until a full
/// sample at the configured port and process limits fits.
fn broker_chunk_size(config: &BrokerConfig) -> Result<usize, BrokerError> {
    let required = max_sample_size(TopicLimits {
        max_publishers: config.max_publishers,
        max_subscribers: config.max_subscribers,
        max_processes: config.max_processes,
    })?;
    if required > config.introspection_chunk_size {
        log::info!(
            "[Broker] introspection chunks raised from {} to {} bytes to hold a full sample",
            config.introspection_chunk_size,
            required
        );
        return Ok(required);
    }
    Ok(config.introspection_chunk_size)
}

pub struct Broker {
    config: BrokerConfig,
    connections: Arc<ConnectionRegistry>,
    ports: Arc<PortManager>,
    processes: Arc<ProcessManager>,
    introspection: IntrospectionPublisher,
    dispatcher: RequestDispatcher<ProcessManager>,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Result<Self, BrokerError> {
        BrokerBuilder::new(config).build()
    }

    pub fn builder(config: BrokerConfig) -> BrokerBuilder {
        BrokerBuilder::new(config)
    }

    /// Start discovery, monitoring and introspection. No-op if running.
    pub fn start(&self) -> Result<(), BrokerError> {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return Ok(());
        }

        if !self.introspection.run() {
            log::warn!("[Broker] introspection not started");
        }
        self.ports.do_discovery();

        let ports = Arc::clone(&self.ports);
        tasks.push(PeriodicTask::start(
            "shmq-discovery",
            self.config.discovery_interval(),
            move || ports.do_discovery(),
        )?);

        if self.config.monitoring {
            let processes = Arc::clone(&self.processes);
            tasks.push(PeriodicTask::start(
                "shmq-monitor",
                self.config.keepalive_interval(),
                move || {
                    processes.monitor_processes();
                },
            )?);
        }

        log::info!(
            "[Broker] running (discovery {:?}, keepalive timeout {:?})",
            self.config.discovery_interval(),
            self.config.keepalive_timeout()
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Stop the loops and terminate all registered processes.
    pub fn shutdown(&self) {
        self.tasks.lock().clear();
        self.introspection.stop();
        self.processes.kill_all_processes();
        log::info!("[Broker] shut down");
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &RequestDispatcher<ProcessManager> {
        &self.dispatcher
    }

    pub fn process_manager(&self) -> &Arc<ProcessManager> {
        &self.processes
    }

    pub fn port_manager(&self) -> &Arc<PortManager> {
        &self.ports
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn introspection(&self) -> &IntrospectionPublisher {
        &self.introspection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> BrokerConfig {
        BrokerConfig {
            max_publishers: 16,
            max_subscribers: 16,
            introspection_chunk_count: 16,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = BrokerConfig {
            max_processes: 0,
            ..Default::default()
        };
        assert!(matches!(Broker::new(config), Err(BrokerError::Config(_))));
    }

    #[test]
    fn test_build_creates_broker_ports() {
        let broker = Broker::new(small_config()).unwrap();
        // Registry publisher plus four introspection publishers.
        assert_eq!(broker.port_manager().port_counts(), (5, 0, 0));
        assert_eq!(broker.connections().publisher_count(), 5);
    }

    #[test]
    fn test_broker_pool_holds_a_full_port_graph() {
        let config = BrokerConfig {
            max_publishers: 4,
            max_subscribers: 400,
            introspection_chunk_size: 64 * 1024,
            ..Default::default()
        };
        assert!(broker_chunk_size(&config).unwrap() > 400 * 1024);
        assert!(Broker::new(config).is_ok());

        let roomy = BrokerConfig {
            max_publishers: 1,
            max_subscribers: 1,
            max_processes: 1,
            introspection_chunk_size: 1 << 20,
            ..Default::default()
        };
        assert_eq!(broker_chunk_size(&roomy).unwrap(), 1 << 20);
    }

    #[test]
    fn test_start_offers_registry_and_introspection() {
        let broker = Broker::new(small_config()).unwrap();
        broker.start().unwrap();
        assert!(broker.is_running());
        assert!(broker.introspection().is_running());

        let registry = broker.port_manager().service_registry();
        assert_eq!(registry.publisher_count(&service_registry_service().unwrap()), 1);
        assert_eq!(
            registry.publisher_count(&introspection_service(PORT_EVENT).unwrap()),
            1
        );

        broker.shutdown();
        assert!(!broker.is_running());
        assert!(!broker.introspection().is_running());
    }

    #[test]
    fn test_start_is_idempotent() {
        let broker = Broker::new(small_config()).unwrap();
        broker.start().unwrap();
        broker.start().unwrap();
        assert_eq!(broker.tasks.lock().len(), 2);
        broker.shutdown();
    }
}
