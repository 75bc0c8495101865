// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Routing of control-channel requests to the process manager.
//!
//! Requests of one connection must be dispatched in receipt order; the session
//! check of later requests relies on it.

use crate::ipc::Request;
use crate::process::{Mailbox, ProcessControl, Registration};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct RequestDispatcher<C: ProcessControl> {
    control: Arc<C>,
    next_session: AtomicU64,
}

impl<C: ProcessControl> RequestDispatcher<C> {
    pub fn new(control: Arc<C>) -> Self {
        Self {
            control,
            next_session: AtomicU64::new(1),
        }
    }

    pub fn control(&self) -> &Arc<C> {
        &self.control
    }

    /// Handle one request. Replies, if any, go to `mailbox` for a registration
    /// and to the registered process's own mailbox otherwise.
    pub fn dispatch(&self, request: Request, mailbox: &Arc<dyn Mailbox>) -> bool {
        match request {
            Request::Register {
                name,
                pid,
                user,
                monitored,
                transmission_timestamp,
                version,
            } => {
                let session_id = self.next_session.fetch_add(1, Ordering::Relaxed);
                let registration = Registration {
                    name,
                    pid,
                    user,
                    monitored,
                    transmission_timestamp,
                    session_id,
                    version,
                };
                self.control
                    .register_process(registration, Arc::clone(mailbox))
            }
            Request::CreatePublisher {
                name,
                session_id,
                service,
                options,
            } => self
                .control
                .add_publisher_for_process(&name, session_id, service, &options),
            Request::CreateSubscriber {
                name,
                session_id,
                service,
                options,
            } => self
                .control
                .add_subscriber_for_process(&name, session_id, service, &options),
            Request::CreateInterface {
                name,
                session_id,
                interface,
                node_name,
            } => self
                .control
                .add_interface_for_process(&name, session_id, interface, &node_name),
            Request::Keepalive { name } => self.control.update_liveliness_of_process(&name),
            Request::Deregister { name, session_id } => {
                self.control.deregister_process(&name, session_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capro::{IdString, Interface, ServiceDescriptor};
    use crate::error::MailboxError;
    use crate::ipc::Response;
    use crate::port::{PublisherOptions, SubscriberOptions};
    use crate::version::VersionInfo;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeControl {
        calls: Mutex<Vec<String>>,
    }

    impl FakeControl {
        fn record(&self, call: String) -> bool {
            self.calls.lock().push(call);
            true
        }
    }

    impl ProcessControl for FakeControl {
        fn register_process(&self, registration: Registration, _mailbox: Arc<dyn Mailbox>) -> bool {
            self.record(format!("register {} {}", registration.name, registration.session_id))
        }

        fn deregister_process(&self, name: &IdString, session_id: u64) -> bool {
            self.record(format!("deregister {} {}", name, session_id))
        }

        fn update_liveliness_of_process(&self, name: &IdString) -> bool {
            self.record(format!("keepalive {}", name))
        }

        fn add_publisher_for_process(
            &self,
            name: &IdString,
            session_id: u64,
            service: ServiceDescriptor,
            _options: &PublisherOptions,
        ) -> bool {
            self.record(format!("publisher {} {} {}", name, session_id, service))
        }

        fn add_subscriber_for_process(
            &self,
            name: &IdString,
            session_id: u64,
            service: ServiceDescriptor,
            options: &SubscriberOptions,
        ) -> bool {
            self.record(format!(
                "subscriber {} {} {} {}",
                name, session_id, service, options.queue_capacity
            ))
        }

        fn add_interface_for_process(
            &self,
            name: &IdString,
            session_id: u64,
            interface: Interface,
            node_name: &IdString,
        ) -> bool {
            self.record(format!("interface {} {} {:?} {}", name, session_id, interface, node_name))
        }

        fn send_message_to_process(
            &self,
            name: &IdString,
            _response: Response,
            session_id: u64,
        ) -> bool {
            self.record(format!("send {} {}", name, session_id))
        }
    }

    struct NullMailbox;

    impl Mailbox for NullMailbox {
        fn send(&self, _response: Response) -> Result<(), MailboxError> {
            Ok(())
        }
    }

    fn name(n: &str) -> IdString {
        IdString::new(n).unwrap()
    }

    fn register(n: &str) -> Request {
        Request::Register {
            name: name(n),
            pid: 1,
            user: 0,
            monitored: true,
            transmission_timestamp: 0,
            version: VersionInfo::current(),
        }
    }

    #[test]
    fn test_sessions_are_distinct_per_registration() {
        let dispatcher = RequestDispatcher::new(Arc::new(FakeControl::default()));
        let mailbox: Arc<dyn Mailbox> = Arc::new(NullMailbox);
        dispatcher.dispatch(register("a"), &mailbox);
        dispatcher.dispatch(register("a"), &mailbox);
        dispatcher.dispatch(register("b"), &mailbox);
        assert_eq!(
            *dispatcher.control().calls.lock(),
            vec!["register a 1", "register a 2", "register b 3"]
        );
    }

    #[test]
    fn test_requests_reach_matching_operation_in_order() {
        let dispatcher = RequestDispatcher::new(Arc::new(FakeControl::default()));
        let mailbox: Arc<dyn Mailbox> = Arc::new(NullMailbox);
        let service = ServiceDescriptor::new("Radar", "Front", "Objects").unwrap();
        let requests = vec![
            Request::CreatePublisher {
                name: name("a"),
                session_id: 4,
                service: service.clone(),
                options: PublisherOptions::default(),
            },
            Request::CreateSubscriber {
                name: name("a"),
                session_id: 4,
                service,
                options: SubscriberOptions::default(),
            },
            Request::CreateInterface {
                name: name("a"),
                session_id: 4,
                interface: Interface::Mqtt,
                node_name: name("n"),
            },
            Request::Keepalive { name: name("a") },
            Request::Deregister {
                name: name("a"),
                session_id: 4,
            },
        ];
        for request in requests {
            assert!(dispatcher.dispatch(request, &mailbox));
        }
        assert_eq!(
            *dispatcher.control().calls.lock(),
            vec![
                "publisher a 4 Radar/Front/Objects",
                "subscriber a 4 Radar/Front/Objects 256",
                "interface a 4 Mqtt n",
                "keepalive a",
                "deregister a 4",
            ]
        );
    }
}
