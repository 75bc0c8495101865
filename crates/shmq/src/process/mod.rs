// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process lifecycle: registration, liveness monitoring, removal.
//!
//! The broker talks to processes only through the [`Mailbox`] each one
//! registered with; everything else about a process (its memory segment, access
//! rights, how to signal it) is resolved through injected collaborators.

mod entry;
mod manager;
mod registry;
mod segment;
mod signal;

pub use entry::ProcessEntry;
pub use manager::{ProcessCollaborators, ProcessManager};
pub use registry::ProcessRegistry;
pub use segment::{HeapSegments, SegmentResolver};
pub use signal::{PosixSignaler, ProcessSignaler};

use crate::capro::{IdString, Interface, ServiceDescriptor};
use crate::error::MailboxError;
use crate::ipc::Response;
use crate::port::{PublisherOptions, SubscriberOptions};
use crate::version::VersionInfo;
use std::sync::Arc;

/// Outbound control channel of one process.
pub trait Mailbox: Send + Sync {
    /// Queue `response` without blocking.
    fn send(&self, response: Response) -> Result<(), MailboxError>;
}

/// Registration request, after the broker assigned a session id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: IdString,
    pub pid: u32,
    /// Posix user id, selects the memory segment
    pub user: u32,
    pub monitored: bool,
    pub transmission_timestamp: u64,
    pub session_id: u64,
    pub version: VersionInfo,
}

/// Decides whether a process may register at all.
pub trait AccessControl: Send + Sync {
    fn allows(&self, registration: &Registration) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn allows(&self, _registration: &Registration) -> bool {
        true
    }
}

/// Process operations reachable from the control channel.
pub trait ProcessControl: Send + Sync {
    fn register_process(&self, registration: Registration, mailbox: Arc<dyn Mailbox>) -> bool;

    fn deregister_process(&self, name: &IdString, session_id: u64) -> bool;

    fn update_liveliness_of_process(&self, name: &IdString) -> bool;

    fn add_publisher_for_process(
        &self,
        name: &IdString,
        session_id: u64,
        service: ServiceDescriptor,
        options: &PublisherOptions,
    ) -> bool;

    fn add_subscriber_for_process(
        &self,
        name: &IdString,
        session_id: u64,
        service: ServiceDescriptor,
        options: &SubscriberOptions,
    ) -> bool;

    fn add_interface_for_process(
        &self,
        name: &IdString,
        session_id: u64,
        interface: Interface,
        node_name: &IdString,
    ) -> bool;

    /// Deliver `response` only if `session_id` is the process's current one.
    fn send_message_to_process(&self, name: &IdString, response: Response, session_id: u64) -> bool;
}
