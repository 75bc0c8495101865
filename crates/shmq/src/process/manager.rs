// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process manager: registration, liveness, removal and port creation on
//! behalf of processes.
//!
//! Lock order: process list, then the port manager. Process teardown always
//! happens with the process list locked, so a name can never be observed half
//! removed.

use super::entry::ProcessEntry;
use super::registry::ProcessRegistry;
use super::{
    AccessControl, Mailbox, ProcessControl, ProcessSignaler, Registration, SegmentResolver,
};
use crate::capro::{IdString, Interface, Scope, ServiceDescriptor};
use crate::config::BrokerConfig;
use crate::error::{ErrorCode, ErrorLevel, ErrorReporter, PortError};
use crate::introspection::ProcessIntrospection;
use crate::ipc::{IpcErrorCode, Response};
use crate::port::{
    PortManager, PublisherOptions, PublisherPort, SubscriberOptions, SubscriberPort,
};
use crate::version::{CompatibilityCheckLevel, VersionInfo};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Poll period while waiting for processes to exit after SIGTERM.
const TERMINATION_POLL: Duration = Duration::from_millis(50);

/// Injected collaborators of a [`ProcessManager`].
pub struct ProcessCollaborators {
    pub segments: Arc<dyn SegmentResolver>,
    pub access: Arc<dyn AccessControl>,
    pub signaler: Arc<dyn ProcessSignaler>,
    pub reporter: Arc<dyn ErrorReporter>,
}

pub struct ProcessManager {
    processes: Mutex<ProcessRegistry>,
    ports: Arc<PortManager>,
    introspection: Arc<ProcessIntrospection>,
    registry_service: ServiceDescriptor,
    collaborators: ProcessCollaborators,
    version: VersionInfo,
    compatibility: CompatibilityCheckLevel,
    monitoring: bool,
    keepalive_interval: Duration,
    keepalive_timeout: Duration,
    termination_delay: Duration,
}

fn port_error_code(error: &PortError) -> IpcErrorCode {
    match error {
        PortError::PublisherListFull(_) => IpcErrorCode::PublisherListFull,
        PortError::SubscriberListFull(_) => IpcErrorCode::SubscriberListFull,
        PortError::InterfaceListFull(_) => IpcErrorCode::InterfaceListFull,
    }
}

fn reply(mailbox: &dyn Mailbox, code: IpcErrorCode, message: String) {
    if let Err(e) = mailbox.send(Response::error(code, message)) {
        log::debug!("[ProcessManager] rejection not delivered: {}", e);
    }
}

impl ProcessManager {
    pub fn new(
        config: &BrokerConfig,
        ports: Arc<PortManager>,
        introspection: Arc<ProcessIntrospection>,
        registry_service: ServiceDescriptor,
        collaborators: ProcessCollaborators,
    ) -> Self {
        Self {
            processes: Mutex::new(ProcessRegistry::new(config.max_processes)),
            ports,
            introspection,
            registry_service,
            collaborators,
            version: VersionInfo::current(),
            compatibility: config.compatibility_check,
            monitoring: config.monitoring,
            keepalive_interval: config.keepalive_interval(),
            keepalive_timeout: config.keepalive_timeout(),
            termination_delay: config.termination_delay(),
        }
    }

    /// Replace the broker version processes are checked against.
    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    pub fn port_manager(&self) -> &Arc<PortManager> {
        &self.ports
    }

    /// Remove `name` and all its ports. Caller holds the process list.
    fn teardown(&self, processes: &mut ProcessRegistry, name: &IdString) -> Option<ProcessEntry> {
        let entry = processes.remove(name)?;
        self.ports.delete_ports_of_process(name);
        self.introspection.remove_process(name);
        Some(entry)
    }

    /// Entry of `name` if `session_id` is its current session.
    fn session<'a>(
        processes: &'a MutexGuard<'_, ProcessRegistry>,
        name: &IdString,
        session_id: u64,
    ) -> Option<&'a ProcessEntry> {
        match processes.find(name) {
            None => {
                log::warn!("[ProcessManager] unknown process {}", name);
                None
            }
            Some(entry) if entry.session_id() != session_id => {
                log::debug!(
                    "[ProcessManager] dropping request of {} from stale session {} (current {})",
                    name,
                    session_id,
                    entry.session_id()
                );
                None
            }
            Some(entry) => Some(entry),
        }
    }

    /// Remove a process and tear down its ports. False if unknown.
    pub fn remove_process(&self, name: &IdString) -> bool {
        let removed = {
            let mut processes = self.processes.lock();
            self.teardown(&mut processes, name)
        };
        match removed {
            Some(entry) => {
                log::info!("[ProcessManager] removed process {} (pid {})", name, entry.pid());
                true
            }
            None => {
                log::debug!("[ProcessManager] cannot remove unknown process {}", name);
                false
            }
        }
    }

    /// Terminate every monitored process, then forget every process.
    ///
    /// Sends SIGTERM, waits up to the termination delay for the processes to
    /// exit and sends SIGKILL to the survivors. No lock is held while waiting.
    pub fn kill_all_processes(&self) {
        let targets: Vec<(IdString, u32)> = self
            .processes
            .lock()
            .iter()
            .filter(|e| e.is_monitored())
            .map(|e| (e.name().clone(), e.pid()))
            .collect();

        let signaler = &self.collaborators.signaler;
        for (name, pid) in &targets {
            log::info!("[ProcessManager] terminating {} (pid {})", name, pid);
            signaler.terminate(*pid);
        }

        let deadline = Instant::now() + self.termination_delay;
        let mut alive: Vec<&(IdString, u32)> = targets.iter().collect();
        loop {
            alive.retain(|(_, pid)| signaler.is_alive(*pid));
            let now = Instant::now();
            if alive.is_empty() || now >= deadline {
                break;
            }
            thread::sleep(TERMINATION_POLL.min(deadline - now));
        }
        for (name, pid) in alive {
            log::warn!(
                "[ProcessManager] {} (pid {}) still alive after {:?}, killing",
                name,
                pid,
                self.termination_delay
            );
            signaler.kill(*pid);
        }

        let mut processes = self.processes.lock();
        let names: Vec<IdString> = processes.iter().map(|e| e.name().clone()).collect();
        for name in names {
            self.teardown(&mut processes, &name);
        }
    }

    /// Evict monitored processes whose heartbeat timed out. Returns their names.
    pub fn monitor_processes(&self) -> Vec<IdString> {
        let mut processes = self.processes.lock();
        let expired = processes.expired(self.keepalive_timeout);
        for name in &expired {
            if let Some(entry) = self.teardown(&mut processes, name) {
                log::warn!(
                    "[ProcessManager] process {} (pid {}) sent no keepalive for {:?}, removed",
                    name,
                    entry.pid(),
                    self.keepalive_timeout
                );
            }
        }
        expired
    }

    /// Run a discovery pass so new ports and offers propagate.
    pub fn discovery_update(&self) {
        self.ports.do_discovery();
    }

    pub fn are_all_subscriber_ports_subscribed(&self, name: &IdString) -> bool {
        self.ports.are_all_subscriber_ports_subscribed(name)
    }

    pub fn process_count(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn is_registered(&self, name: &IdString) -> bool {
        self.processes.lock().find(name).is_some()
    }

    pub fn session_of(&self, name: &IdString) -> Option<u64> {
        self.processes.lock().find(name).map(ProcessEntry::session_id)
    }
}

impl ProcessControl for ProcessManager {
    fn register_process(&self, registration: Registration, mailbox: Arc<dyn Mailbox>) -> bool {
        let name = registration.name.clone();
        if !self.collaborators.access.allows(&registration) {
            log::warn!("[ProcessManager] registration of {} denied", name);
            reply(&*mailbox, IpcErrorCode::AccessDenied, format!("{} may not register", name));
            return false;
        }
        if !self.version.is_compatible(&registration.version, self.compatibility) {
            log::error!(
                "[ProcessManager] {} has version {}, broker has {} (check: {:?})",
                name,
                registration.version,
                self.version,
                self.compatibility
            );
            reply(
                &*mailbox,
                IpcErrorCode::VersionMismatch,
                format!("broker {} / client {}", self.version, registration.version),
            );
            return false;
        }
        let monitored = registration.monitored && self.monitoring;

        {
            let mut processes = self.processes.lock();
            if let Some(existing) = processes.find(&name) {
                if existing.is_monitored() {
                    log::warn!(
                        "[ProcessManager] {} is already registered (pid {}) and monitored, rejecting",
                        name,
                        existing.pid()
                    );
                    reply(&*mailbox, IpcErrorCode::AlreadyRegistered, name.to_string());
                    return false;
                }
                log::info!("[ProcessManager] {} registers again, dropping old entry", name);
                self.teardown(&mut processes, &name);
            }

            if processes.is_full() {
                log::warn!("[ProcessManager] process list full, {} rejected", name);
                self.collaborators
                    .reporter
                    .report(ErrorCode::ProcessListFull, ErrorLevel::Moderate);
                reply(&*mailbox, IpcErrorCode::ProcessListFull, name.to_string());
                return false;
            }

            let Some(pool) = self.collaborators.segments.segment_for_user(registration.user) else {
                log::warn!(
                    "[ProcessManager] no segment for user {} of {}",
                    registration.user,
                    name
                );
                reply(
                    &*mailbox,
                    IpcErrorCode::NoSegment,
                    format!("user {}", registration.user),
                );
                return false;
            };

            let options = SubscriberOptions {
                queue_capacity: 1,
                history_request: 1,
                subscribe_on_create: true,
                scope: Scope::Local,
                ..Default::default()
            };
            let registry_port =
                match self
                    .ports
                    .acquire_subscriber_port(self.registry_service.clone(), &options, &name)
                {
                    Ok(port) => port,
                    Err(e) => {
                        reply(&*mailbox, port_error_code(&e), e.to_string());
                        return false;
                    }
                };

            let mut entry = ProcessEntry::new(
                &registration,
                monitored,
                pool,
                mailbox,
                registry_port.unique_id(),
            );
            let acked = entry.send(Response::RegisterAck {
                session_id: registration.session_id,
                transmission_timestamp: registration.transmission_timestamp,
                segment_id: entry.segment_id(),
                keepalive_interval_ms: self.keepalive_interval.as_millis() as u64,
                registry_port: registry_port.unique_id(),
            });
            if !acked {
                self.ports.delete_ports_of_process(&name);
                return false;
            }
            entry.touch();

            if processes.insert(entry).is_err() {
                self.ports.delete_ports_of_process(&name);
                return false;
            }
            self.introspection.add_process(
                registration.pid,
                &name,
                registration.session_id,
                monitored,
            );
            log::info!(
                "[ProcessManager] registered {} (pid {}, session {}, monitored: {})",
                name,
                registration.pid,
                registration.session_id,
                monitored
            );
        }

        self.ports.do_discovery();
        true
    }

    fn deregister_process(&self, name: &IdString, session_id: u64) -> bool {
        let mut processes = self.processes.lock();
        let Some(entry) = Self::session(&processes, name, session_id) else {
            return false;
        };
        entry.send(Response::DeregisterAck);
        self.teardown(&mut processes, name);
        log::info!("[ProcessManager] {} deregistered", name);
        true
    }

    fn update_liveliness_of_process(&self, name: &IdString) -> bool {
        let touched = self.processes.lock().touch(name);
        if !touched {
            log::debug!("[ProcessManager] keepalive from unknown process {}", name);
        }
        touched
    }

    fn add_publisher_for_process(
        &self,
        name: &IdString,
        session_id: u64,
        service: ServiceDescriptor,
        options: &PublisherOptions,
    ) -> bool {
        {
            let processes = self.processes.lock();
            let Some(entry) = Self::session(&processes, name, session_id) else {
                return false;
            };
            match self
                .ports
                .acquire_publisher_port(service, options, name, entry.pool().clone())
            {
                Ok(port) => {
                    entry.send(Response::CreatePublisherAck {
                        port_id: port.unique_id(),
                        service: port.info().service.clone(),
                    });
                }
                Err(e) => {
                    entry.send(Response::error(port_error_code(&e), e.to_string()));
                    return false;
                }
            }
        }
        self.ports.do_discovery();
        true
    }

    fn add_subscriber_for_process(
        &self,
        name: &IdString,
        session_id: u64,
        service: ServiceDescriptor,
        options: &SubscriberOptions,
    ) -> bool {
        {
            let processes = self.processes.lock();
            let Some(entry) = Self::session(&processes, name, session_id) else {
                return false;
            };
            match self.ports.acquire_subscriber_port(service, options, name) {
                Ok(port) => {
                    entry.send(Response::CreateSubscriberAck {
                        port_id: port.unique_id(),
                        service: port.service().clone(),
                    });
                }
                Err(e) => {
                    entry.send(Response::error(port_error_code(&e), e.to_string()));
                    return false;
                }
            }
        }
        self.ports.do_discovery();
        true
    }

    fn add_interface_for_process(
        &self,
        name: &IdString,
        session_id: u64,
        interface: Interface,
        node_name: &IdString,
    ) -> bool {
        {
            let processes = self.processes.lock();
            let Some(entry) = Self::session(&processes, name, session_id) else {
                return false;
            };
            match self.ports.acquire_interface_port(interface, name, node_name) {
                Ok(port) => {
                    entry.send(Response::CreateInterfaceAck {
                        port_id: port.info().unique_id,
                    });
                }
                Err(e) => {
                    entry.send(Response::error(port_error_code(&e), e.to_string()));
                    return false;
                }
            }
        }
        self.ports.do_discovery();
        true
    }

    fn send_message_to_process(&self, name: &IdString, response: Response, session_id: u64) -> bool {
        let processes = self.processes.lock();
        match Self::session(&processes, name, session_id) {
            Some(entry) => entry.send(response),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::CapturingReporter;
    use crate::error::MailboxError;
    use crate::introspection::ConnectionRegistry;
    use crate::mempool::MemoryPool;
    use crate::port::{PortLimits, SubscribeState};
    use crate::process::{AllowAll, HeapSegments};
    use std::collections::BTreeSet;

    #[derive(Default)]
    struct RecordingMailbox {
        sent: Mutex<Vec<Response>>,
    }

    impl RecordingMailbox {
        fn take(&self) -> Vec<Response> {
            std::mem::take(&mut *self.sent.lock())
        }
    }

    impl Mailbox for RecordingMailbox {
        fn send(&self, response: Response) -> Result<(), MailboxError> {
            self.sent.lock().push(response);
            Ok(())
        }
    }

    /// Processes die on SIGTERM unless listed as stubborn.
    #[derive(Default)]
    struct FakeSignaler {
        alive: Mutex<BTreeSet<u32>>,
        stubborn: BTreeSet<u32>,
        log: Mutex<Vec<(&'static str, u32)>>,
    }

    impl ProcessSignaler for FakeSignaler {
        fn terminate(&self, pid: u32) -> bool {
            self.log.lock().push(("term", pid));
            if !self.stubborn.contains(&pid) {
                self.alive.lock().remove(&pid);
            }
            true
        }

        fn kill(&self, pid: u32) -> bool {
            self.log.lock().push(("kill", pid));
            self.alive.lock().remove(&pid);
            true
        }

        fn is_alive(&self, pid: u32) -> bool {
            self.alive.lock().contains(&pid)
        }
    }

    struct DenyUser(u32);

    impl AccessControl for DenyUser {
        fn allows(&self, registration: &Registration) -> bool {
            registration.user != self.0
        }
    }

    struct Fixture {
        manager: ProcessManager,
        ports: Arc<PortManager>,
        introspection: Arc<ProcessIntrospection>,
        signaler: Arc<FakeSignaler>,
        reporter: Arc<CapturingReporter>,
    }

    fn config() -> BrokerConfig {
        BrokerConfig {
            max_processes: 3,
            process_keepalive_timeout_ms: 30,
            process_keepalive_interval_ms: 10,
            process_termination_delay_ms: 100,
            ..Default::default()
        }
    }

    fn fixture_with(
        config: BrokerConfig,
        signaler: FakeSignaler,
        access: Arc<dyn AccessControl>,
    ) -> Fixture {
        let reporter = Arc::new(CapturingReporter::default());
        let connections = Arc::new(ConnectionRegistry::new(16, 16));
        let ports = Arc::new(PortManager::new(
            PortLimits {
                max_publishers: 16,
                max_subscribers: 16,
                max_interfaces: 2,
            },
            connections,
            reporter.clone(),
        ));
        let registry_options = PublisherOptions {
            history_capacity: 1,
            ..Default::default()
        };
        let registry_publisher = ports
            .acquire_publisher_port(
                crate::discovery::service_registry_service().unwrap(),
                &registry_options,
                &IdString::new("shmq-broker").unwrap(),
                MemoryPool::new(0, 4096, 16),
            )
            .unwrap();
        ports.set_registry_publisher(registry_publisher);

        let introspection = Arc::new(ProcessIntrospection::new());
        let signaler = Arc::new(signaler);
        let manager = ProcessManager::new(
            &config,
            Arc::clone(&ports),
            Arc::clone(&introspection),
            crate::discovery::service_registry_service().unwrap(),
            ProcessCollaborators {
                segments: Arc::new(HeapSegments::new(256, 16).restricted_to([1000, 1001])),
                access,
                signaler: signaler.clone(),
                reporter: reporter.clone(),
            },
        );
        Fixture {
            manager,
            ports,
            introspection,
            signaler,
            reporter,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(config(), FakeSignaler::default(), Arc::new(AllowAll))
    }

    fn name(n: &str) -> IdString {
        IdString::new(n).unwrap()
    }

    fn registration(n: &str, pid: u32, session_id: u64, monitored: bool) -> Registration {
        Registration {
            name: name(n),
            pid,
            user: 1000,
            monitored,
            transmission_timestamp: 1234,
            session_id,
            version: VersionInfo::current(),
        }
    }

    fn register(f: &Fixture, n: &str, session_id: u64, monitored: bool) -> Arc<RecordingMailbox> {
        let mailbox = Arc::new(RecordingMailbox::default());
        assert!(f
            .manager
            .register_process(registration(n, 100, session_id, monitored), mailbox.clone()));
        mailbox
    }

    fn sd(s: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(s, "1", "x").unwrap()
    }

    #[test]
    fn test_register_acks_with_session_and_segment() {
        let f = fixture();
        let mailbox = register(&f, "radar", 7, true);
        let sent = mailbox.take();
        assert_eq!(sent.len(), 1);
        match &sent[0] {
            Response::RegisterAck {
                session_id,
                transmission_timestamp,
                segment_id,
                keepalive_interval_ms,
                registry_port,
            } => {
                assert_eq!(*session_id, 7);
                assert_eq!(*transmission_timestamp, 1234);
                assert_eq!(*segment_id, 1);
                assert_eq!(*keepalive_interval_ms, 10);
                let port = f.ports.subscriber_port(*registry_port).unwrap();
                assert_eq!(port.subscription_state(), SubscribeState::Subscribed);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(f.introspection.is_new());
        assert_eq!(f.introspection.prepare_topic().processes[0].session_id, 7);
    }

    #[test]
    fn test_monitored_duplicate_is_rejected() {
        let f = fixture();
        register(&f, "radar", 1, true);
        let second = Arc::new(RecordingMailbox::default());
        assert!(!f
            .manager
            .register_process(registration("radar", 200, 2, true), second.clone()));
        assert_eq!(f.manager.session_of(&name("radar")), Some(1));
        assert!(matches!(
            second.take().as_slice(),
            [Response::Error {
                code: IpcErrorCode::AlreadyRegistered,
                ..
            }]
        ));
    }

    #[test]
    fn test_unmonitored_duplicate_replaces_entry() {
        let f = fixture();
        let first = register(&f, "tool", 1, false);
        assert!(f.manager.add_publisher_for_process(
            &name("tool"),
            1,
            sd("A"),
            &PublisherOptions::default()
        ));
        first.take();
        register(&f, "tool", 2, false);

        assert_eq!(f.manager.session_of(&name("tool")), Some(2));
        assert_eq!(f.manager.process_count(), 1);
        // Old publisher gone, only the new registry subscriber left.
        assert_eq!(f.ports.port_counts(), (1, 1, 0));
        assert_eq!(f.ports.service_registry().publisher_count(&sd("A")), 0);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let f = fixture();
        let mailbox = Arc::new(RecordingMailbox::default());
        let mut reg = registration("old", 1, 1, true);
        reg.version.major += 1;
        assert!(!f.manager.register_process(reg, mailbox.clone()));
        assert!(!f.manager.is_registered(&name("old")));
        assert!(matches!(
            mailbox.take().as_slice(),
            [Response::Error {
                code: IpcErrorCode::VersionMismatch,
                ..
            }]
        ));
    }

    #[test]
    fn test_access_and_segment_rejections() {
        let f = fixture_with(config(), FakeSignaler::default(), Arc::new(DenyUser(1001)));
        let mailbox = Arc::new(RecordingMailbox::default());

        let mut denied = registration("a", 1, 1, false);
        denied.user = 1001;
        assert!(!f.manager.register_process(denied, mailbox.clone()));

        let mut homeless = registration("b", 1, 1, false);
        homeless.user = 5;
        assert!(!f.manager.register_process(homeless, mailbox.clone()));

        let codes: Vec<IpcErrorCode> = mailbox
            .take()
            .into_iter()
            .filter_map(|r| match r {
                Response::Error { code, .. } => Some(code),
                _ => None,
            })
            .collect();
        assert_eq!(codes, vec![IpcErrorCode::AccessDenied, IpcErrorCode::NoSegment]);
        assert_eq!(f.manager.process_count(), 0);
    }

    #[test]
    fn test_process_list_full_reported() {
        let f = fixture();
        for (i, n) in ["a", "b", "c"].iter().enumerate() {
            register(&f, n, i as u64, false);
        }
        let mailbox = Arc::new(RecordingMailbox::default());
        assert!(!f.manager.register_process(registration("d", 1, 9, false), mailbox));
        assert_eq!(
            f.reporter.reports(),
            vec![(ErrorCode::ProcessListFull, ErrorLevel::Moderate)]
        );
    }

    #[test]
    fn test_stale_session_is_a_noop() {
        let f = fixture();
        let mailbox = register(&f, "radar", 5, true);
        mailbox.take();

        assert!(!f
            .manager
            .send_message_to_process(&name("radar"), Response::DeregisterAck, 4));
        assert!(!f.manager.add_publisher_for_process(
            &name("radar"),
            4,
            sd("A"),
            &PublisherOptions::default()
        ));
        assert!(!f.manager.deregister_process(&name("radar"), 4));
        assert!(mailbox.take().is_empty());
        assert!(f.manager.is_registered(&name("radar")));

        assert!(f
            .manager
            .send_message_to_process(&name("radar"), Response::DeregisterAck, 5));
        assert_eq!(mailbox.take(), vec![Response::DeregisterAck]);
    }

    #[test]
    fn test_port_creation_acks_and_connects() {
        let f = fixture();
        let publisher_box = register(&f, "pub", 1, true);
        let subscriber_box = register(&f, "sub", 2, true);
        publisher_box.take();
        subscriber_box.take();

        assert!(f.manager.add_publisher_for_process(
            &name("pub"),
            1,
            sd("A"),
            &PublisherOptions::default()
        ));
        assert!(f.manager.add_subscriber_for_process(
            &name("sub"),
            2,
            sd("A"),
            &SubscriberOptions::default()
        ));

        let Response::CreatePublisherAck { port_id, .. } = publisher_box.take()[0].clone() else {
            panic!("no publisher ack");
        };
        assert!(f.ports.publisher_port(port_id).is_some_and(|p| p.is_offered()));
        assert!(matches!(
            subscriber_box.take().as_slice(),
            [Response::CreateSubscriberAck { .. }]
        ));
        assert!(f.manager.are_all_subscriber_ports_subscribed(&name("sub")));
    }

    #[test]
    fn test_interface_limit_answered_with_error() {
        let f = fixture();
        let mailbox = register(&f, "gw", 1, false);
        mailbox.take();
        for _ in 0..2 {
            assert!(f.manager.add_interface_for_process(
                &name("gw"),
                1,
                Interface::Dds,
                &name("node")
            ));
        }
        assert!(!f.manager.add_interface_for_process(
            &name("gw"),
            1,
            Interface::Dds,
            &name("node")
        ));
        let sent = mailbox.take();
        assert!(matches!(sent[0], Response::CreateInterfaceAck { .. }));
        assert!(matches!(
            sent[2],
            Response::Error {
                code: IpcErrorCode::InterfaceListFull,
                ..
            }
        ));
    }

    #[test]
    fn test_monitor_evicts_silent_monitored_processes() {
        let f = fixture();
        register(&f, "watched", 1, true);
        register(&f, "free", 2, false);
        assert!(f.manager.add_publisher_for_process(
            &name("watched"),
            1,
            sd("A"),
            &PublisherOptions::default()
        ));

        std::thread::sleep(Duration::from_millis(50));
        assert!(f.manager.update_liveliness_of_process(&name("free")));
        assert_eq!(f.manager.monitor_processes(), vec![name("watched")]);
        assert!(!f.manager.is_registered(&name("watched")));
        assert!(f.manager.is_registered(&name("free")));
        assert_eq!(f.ports.service_registry().publisher_count(&sd("A")), 0);
        assert!(f.manager.monitor_processes().is_empty());
    }

    #[test]
    fn test_monitoring_disabled_by_config() {
        let mut config = config();
        config.monitoring = false;
        let f = fixture_with(config, FakeSignaler::default(), Arc::new(AllowAll));
        register(&f, "radar", 1, true);
        std::thread::sleep(Duration::from_millis(50));
        assert!(f.manager.monitor_processes().is_empty());
    }

    #[test]
    fn test_remove_and_deregister() {
        let f = fixture();
        let mailbox = register(&f, "a", 1, true);
        register(&f, "b", 2, true);
        mailbox.take();

        assert!(f.manager.deregister_process(&name("a"), 1));
        assert_eq!(mailbox.take(), vec![Response::DeregisterAck]);
        assert!(f.manager.remove_process(&name("b")));
        assert!(!f.manager.remove_process(&name("b")));
        assert_eq!(f.manager.process_count(), 0);
        assert_eq!(f.ports.port_counts(), (1, 0, 0));
    }

    #[test]
    fn test_kill_all_terminates_monitored_and_kills_survivors() {
        let signaler = FakeSignaler {
            alive: Mutex::new([11, 12].into_iter().collect()),
            stubborn: [12].into_iter().collect(),
            log: Mutex::new(Vec::new()),
        };
        let f = fixture_with(config(), signaler, Arc::new(AllowAll));
        let mailbox = Arc::new(RecordingMailbox::default());
        assert!(f
            .manager
            .register_process(registration("polite", 11, 1, true), mailbox.clone()));
        assert!(f
            .manager
            .register_process(registration("stubborn", 12, 2, true), mailbox.clone()));
        assert!(f
            .manager
            .register_process(registration("unwatched", 13, 3, false), mailbox));

        let started = Instant::now();
        f.manager.kill_all_processes();
        assert!(started.elapsed() >= Duration::from_millis(100));

        let log = f.signaler.log.lock().clone();
        assert_eq!(log, vec![("term", 11), ("term", 12), ("kill", 12)]);
        assert_eq!(f.manager.process_count(), 0);
    }
}
