// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Event notification for subscriber ports and service discovery.
//!
//! A [`TriggerHandle`] is attached to an event source (a subscriber port); when
//! the source has news it pushes an [`EventInfo`] into the shared
//! [`ConditionVariable`], waking whoever waits on it.
//!
//! # Example
//! ```ignore
//! let cv = ConditionVariable::shared();
//! discovery.enable_event(ServiceDiscoveryEvent::ServiceRegistryChanged,
//!     TriggerHandle::new(&cv, 1, origin, reporter));
//! for event in cv.wait_timeout(Duration::from_millis(100)) { ... }
//! ```

use crate::error::{ErrorCode, ErrorLevel, ErrorReporter};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Object an event originated from.
pub type EventOrigin = Arc<dyn Any + Send + Sync>;

/// Collects fired events and wakes waiters.
#[derive(Default)]
pub struct ConditionVariable {
    pending: Mutex<Vec<EventInfo>>,
    condvar: Condvar,
}

impl ConditionVariable {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn notify(&self, event: EventInfo) {
        let mut pending = self.pending.lock();
        if !pending.iter().any(|e| e.event_id == event.event_id) {
            pending.push(event);
        }
        self.condvar.notify_all();
    }

    /// Block until at least one event fired; returns and clears them.
    pub fn wait(&self) -> Vec<EventInfo> {
        let mut pending = self.pending.lock();
        while pending.is_empty() {
            self.condvar.wait(&mut pending);
        }
        std::mem::take(&mut *pending)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout` (empty result).
    pub fn wait_timeout(&self, timeout: Duration) -> Vec<EventInfo> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            let _ = self.condvar.wait_for(&mut pending, timeout);
        }
        std::mem::take(&mut *pending)
    }

    /// Non-blocking: return and clear the fired events.
    pub fn take_events(&self) -> Vec<EventInfo> {
        std::mem::take(&mut *self.pending.lock())
    }
}

/// Registration of one event source with a condition variable.
#[derive(Clone)]
pub struct TriggerHandle {
    condition: Arc<ConditionVariable>,
    event_id: u64,
    origin: EventOrigin,
    reporter: Arc<dyn ErrorReporter>,
}

impl TriggerHandle {
    pub fn new(
        condition: &Arc<ConditionVariable>,
        event_id: u64,
        origin: EventOrigin,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            condition: Arc::clone(condition),
            event_id,
            origin,
            reporter,
        }
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    pub fn trigger(&self) {
        self.condition.notify(EventInfo {
            event_id: self.event_id,
            origin: Arc::clone(&self.origin),
            reporter: Arc::clone(&self.reporter),
        });
    }
}

/// A fired event.
#[derive(Clone)]
pub struct EventInfo {
    event_id: u64,
    origin: EventOrigin,
    reporter: Arc<dyn ErrorReporter>,
}

impl EventInfo {
    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    /// True if `candidate` is the very object the event was attached to.
    pub fn does_originate_from<T: Any + Send + Sync>(&self, candidate: &Arc<T>) -> bool {
        Arc::as_ptr(&self.origin) as *const () == Arc::as_ptr(candidate) as *const ()
    }

    /// Retrieve the origin as `T`.
    ///
    /// Asking for the wrong type yields `None` and is reported as a moderate
    /// error.
    pub fn get_origin<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match Arc::clone(&self.origin).downcast::<T>() {
            Ok(origin) => Some(origin),
            Err(_) => {
                log::warn!(
                    "[EventInfo] origin of event {} is not a {}",
                    self.event_id,
                    std::any::type_name::<T>()
                );
                self.reporter.report(
                    ErrorCode::EventInfoTypeInconsistencyInGetOrigin,
                    ErrorLevel::Moderate,
                );
                None
            }
        }
    }
}

impl std::fmt::Debug for EventInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventInfo").field("event_id", &self.event_id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::CapturingReporter;
    use std::time::Instant;

    struct Source(u32);

    fn handle(
        cv: &Arc<ConditionVariable>,
        id: u64,
        origin: Arc<Source>,
    ) -> (TriggerHandle, Arc<CapturingReporter>) {
        let reporter = Arc::new(CapturingReporter::default());
        let handle = TriggerHandle::new(cv, id, origin, reporter.clone());
        (handle, reporter)
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let cv = ConditionVariable::shared();
        let (handle, _) = handle(&cv, 7, Arc::new(Source(1)));

        let waiter = {
            let cv = Arc::clone(&cv);
            std::thread::spawn(move || cv.wait())
        };
        std::thread::sleep(Duration::from_millis(10));
        handle.trigger();

        let events = waiter.join().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id(), 7);
    }

    #[test]
    fn test_repeated_trigger_collapses() {
        let cv = ConditionVariable::shared();
        let (handle, _) = handle(&cv, 1, Arc::new(Source(1)));
        handle.trigger();
        handle.trigger();
        assert_eq!(cv.take_events().len(), 1);
        assert!(cv.take_events().is_empty());
    }

    #[test]
    fn test_wait_timeout_returns_empty() {
        let cv = ConditionVariable::shared();
        let started = Instant::now();
        assert!(cv.wait_timeout(Duration::from_millis(10)).is_empty());
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_origin_checks() {
        let cv = ConditionVariable::shared();
        let source = Arc::new(Source(42));
        let other = Arc::new(Source(42));
        let (handle, reporter) = handle(&cv, 3, Arc::clone(&source));
        handle.trigger();

        let event = cv.take_events().remove(0);
        assert!(event.does_originate_from(&source));
        assert!(!event.does_originate_from(&other));
        assert_eq!(event.get_origin::<Source>().map(|s| s.0), Some(42));
        assert!(reporter.reports().is_empty());

        assert!(event.get_origin::<String>().is_none());
        assert_eq!(
            reporter.reports(),
            vec![(
                ErrorCode::EventInfoTypeInconsistencyInGetOrigin,
                ErrorLevel::Moderate
            )]
        );
    }
}
