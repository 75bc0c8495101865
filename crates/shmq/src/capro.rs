// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service descriptors and capro messages.
//!
//! Capro ("canonical protocol") messages are the control messages ports exchange
//! while a connection is set up or torn down:
//!
//! ```text
//! subscriber --SUB-->   publisher        publisher --STOP_OFFER--> subscribers
//! subscriber <--ACK--   publisher        subscriber --UNSUB-->     publisher
//! subscriber <--NACK--  publisher
//! ```
//!
//! The broker observes every routed message and feeds it to the connection
//! registry, which tracks the handshake state per subscriber.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum length of a service, instance, event or process identifier (bytes).
pub const MAX_ID_STRING_LENGTH: usize = 100;

/// Errors raised while building identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaproError {
    #[error("identifier is {0} bytes long, limit is {MAX_ID_STRING_LENGTH}")]
    IdTooLong(usize),
}

/// Bounded identifier string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdString(String);

impl IdString {
    /// Create an identifier, rejecting values longer than [`MAX_ID_STRING_LENGTH`].
    pub fn new(value: impl Into<String>) -> Result<Self, CaproError> {
        let value = value.into();
        if value.len() > MAX_ID_STRING_LENGTH {
            return Err(CaproError::IdTooLong(value.len()));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Longest identifier with the costliest JSON encoding (every byte escaped).
    pub(crate) fn widest() -> Self {
        Self("\u{1}".repeat(MAX_ID_STRING_LENGTH))
    }
}

impl TryFrom<String> for IdString {
    type Error = CaproError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for IdString {
    type Error = CaproError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdString> for String {
    fn from(id: IdString) -> Self {
        id.0
    }
}

impl PartialEq<str> for IdString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl fmt::Display for IdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// (service, instance, event) triple naming a topic.
///
/// Ordering is lexicographic over the three fields, which gives the registries a
/// stable iteration order. The default descriptor has three empty fields and
/// names no topic; interface ports carry it.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    service: IdString,
    instance: IdString,
    event: IdString,
}

impl ServiceDescriptor {
    pub fn new(service: &str, instance: &str, event: &str) -> Result<Self, CaproError> {
        Ok(Self {
            service: IdString::new(service)?,
            instance: IdString::new(instance)?,
            event: IdString::new(event)?,
        })
    }

    pub(crate) fn widest() -> Self {
        Self {
            service: IdString::widest(),
            instance: IdString::widest(),
            event: IdString::widest(),
        }
    }

    pub fn service(&self) -> &IdString {
        &self.service
    }

    pub fn instance(&self) -> &IdString {
        &self.instance
    }

    pub fn event(&self) -> &IdString {
        &self.event
    }

    /// Match against optional fields; `None` is a wildcard.
    pub fn matches(&self, service: Option<&str>, instance: Option<&str>, event: Option<&str>) -> bool {
        service.is_none_or(|s| self.service == *s)
            && instance.is_none_or(|i| self.instance == *i)
            && event.is_none_or(|e| self.event == *e)
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.service, self.instance, self.event)
    }
}

/// How far offers of a port are propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Visible to ports on this host only, never forwarded to gateways.
    Local,
    /// Forwarded to interface (gateway) ports.
    #[default]
    Global,
}

/// Origin interface of a port. Gateways bridging to other middlewares use
/// anything but `Internal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    #[default]
    Internal,
    Dds,
    SomeIp,
    Mqtt,
    Custom,
}

/// Capro message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaproMessageType {
    Find,
    Offer,
    StopOffer,
    Sub,
    Unsub,
    Ack,
    Nack,
}

impl fmt::Display for CaproMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Find => "FIND",
            Self::Offer => "OFFER",
            Self::StopOffer => "STOP_OFFER",
            Self::Sub => "SUB",
            Self::Unsub => "UNSUB",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
        };
        f.write_str(name)
    }
}

/// A single capro control message for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaproMessage {
    pub kind: CaproMessageType,
    pub service: ServiceDescriptor,
    /// Requested history depth (SUB only).
    #[serde(default)]
    pub history_request: usize,
}

impl CaproMessage {
    pub fn new(kind: CaproMessageType, service: ServiceDescriptor) -> Self {
        Self {
            kind,
            service,
            history_request: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_string_limit() {
        assert!(IdString::new("a".repeat(MAX_ID_STRING_LENGTH)).is_ok());
        assert_eq!(
            IdString::new("a".repeat(MAX_ID_STRING_LENGTH + 1)),
            Err(CaproError::IdTooLong(MAX_ID_STRING_LENGTH + 1))
        );
    }

    #[test]
    fn test_id_string_rejected_when_deserializing() {
        let json = format!("\"{}\"", "x".repeat(MAX_ID_STRING_LENGTH + 5));
        assert!(serde_json::from_str::<IdString>(&json).is_err());
    }

    #[test]
    fn test_descriptor_wildcard_match() {
        let sd = ServiceDescriptor::new("Radar", "FrontLeft", "Objects").unwrap();
        assert!(sd.matches(None, None, None));
        assert!(sd.matches(Some("Radar"), None, Some("Objects")));
        assert!(!sd.matches(Some("Radar"), Some("FrontRight"), None));
        assert!(!sd.matches(None, None, Some("Counter")));
    }

    #[test]
    fn test_descriptor_ordering_is_lexicographic() {
        let a = ServiceDescriptor::new("A", "2", "x").unwrap();
        let b = ServiceDescriptor::new("A", "10", "x").unwrap();
        let c = ServiceDescriptor::new("B", "0", "a").unwrap();
        assert!(b < a);
        assert!(a < c);
    }

    #[test]
    fn test_descriptor_display() {
        let sd = ServiceDescriptor::new("Radar", "FrontLeft", "Objects").unwrap();
        assert_eq!(sd.to_string(), "Radar/FrontLeft/Objects");
    }
}
