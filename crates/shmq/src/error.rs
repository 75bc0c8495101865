// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types and the injected error-reporting facility.
//!
//! Fallible collaborator operations return `Result` with the enums below.
//! Protocol inconsistencies that must not abort the broker are instead handed to
//! an [`ErrorReporter`] passed to each component at construction, so tests can
//! capture them.

use thiserror::Error;

/// Severity of a reported error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    /// Unrecoverable; the caller is expected to shut down.
    Fatal,
    /// Serious but the broker keeps running.
    Severe,
    /// Logged and otherwise ignored.
    Moderate,
}

/// Codes reported through [`ErrorReporter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ServiceDiscoveryUnknownEventProvided,
    EventInfoTypeInconsistencyInGetOrigin,
    PublisherListFull,
    SubscriberListFull,
    InterfaceListFull,
    ProcessListFull,
    IntrospectionPortsAlreadyRegistered,
}

/// Sink for protocol inconsistencies and resource exhaustion.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, code: ErrorCode, level: ErrorLevel);
}

/// Reporter forwarding everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, code: ErrorCode, level: ErrorLevel) {
        match level {
            ErrorLevel::Moderate => log::warn!("[ErrorReporter] {:?} ({:?})", code, level),
            ErrorLevel::Severe | ErrorLevel::Fatal => {
                log::error!("[ErrorReporter] {:?} ({:?})", code, level)
            }
        }
    }
}

/// Chunk allocation and send failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("requested {requested} bytes but chunks hold {chunk_size}")]
    TooLarge { requested: usize, chunk_size: usize },

    #[error("all {chunk_count} chunks are in use")]
    PoolExhausted { chunk_count: usize },

    #[error("payload of {len} bytes overflows chunk capacity {capacity}")]
    PayloadOverflow { len: usize, capacity: usize },
}

/// Delivery of a control message to a process failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailboxError {
    #[error("process channel closed")]
    Closed,

    #[error("process channel full")]
    Full,
}

/// Port creation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("publisher list full ({0} ports)")]
    PublisherListFull(usize),

    #[error("subscriber list full ({0} ports)")]
    SubscriberListFull(usize),

    #[error("interface list full ({0} ports)")]
    InterfaceListFull(usize),
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Reporter collecting every report for later assertions.
    #[derive(Default)]
    pub(crate) struct CapturingReporter {
        reports: Mutex<Vec<(ErrorCode, ErrorLevel)>>,
    }

    impl CapturingReporter {
        pub(crate) fn reports(&self) -> Vec<(ErrorCode, ErrorLevel)> {
            self.reports.lock().clone()
        }
    }

    impl ErrorReporter for CapturingReporter {
        fn report(&self, code: ErrorCode, level: ErrorLevel) {
            self.reports.lock().push((code, level));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CapturingReporter;
    use super::*;

    #[test]
    fn test_capturing_reporter_records_in_order() {
        let reporter = CapturingReporter::default();
        reporter.report(ErrorCode::ProcessListFull, ErrorLevel::Moderate);
        reporter.report(ErrorCode::PublisherListFull, ErrorLevel::Severe);
        assert_eq!(
            reporter.reports(),
            vec![
                (ErrorCode::ProcessListFull, ErrorLevel::Moderate),
                (ErrorCode::PublisherListFull, ErrorLevel::Severe),
            ]
        );
    }

    #[test]
    fn test_error_messages() {
        let err = ChunkError::TooLarge {
            requested: 10,
            chunk_size: 4,
        };
        assert_eq!(err.to_string(), "requested 10 bytes but chunks hold 4");
        assert_eq!(PortError::InterfaceListFull(4).to_string(), "interface list full (4 ports)");
    }
}
