// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control channel messages between processes and the broker.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! Service lookups have no request of their own: clients read the service
//! registry sample through the `registry_port` handed out in [`Response::RegisterAck`].

use crate::capro::{IdString, Interface, ServiceDescriptor};
use crate::port::{PublisherOptions, SubscriberOptions, UniquePortId};
use crate::version::VersionInfo;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the frame header.
pub const FRAME_HEADER_LEN: usize = 4;

/// Requests sent by a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Register {
        name: IdString,
        pid: u32,
        #[serde(default)]
        user: u32,
        #[serde(default)]
        monitored: bool,
        #[serde(default)]
        transmission_timestamp: u64,
        version: VersionInfo,
    },

    CreatePublisher {
        name: IdString,
        session_id: u64,
        service: ServiceDescriptor,
        #[serde(default)]
        options: PublisherOptions,
    },

    CreateSubscriber {
        name: IdString,
        session_id: u64,
        service: ServiceDescriptor,
        #[serde(default)]
        options: SubscriberOptions,
    },

    CreateInterface {
        name: IdString,
        session_id: u64,
        interface: Interface,
        #[serde(default)]
        node_name: IdString,
    },

    /// Heartbeat; no response.
    Keepalive { name: IdString },

    Deregister { name: IdString, session_id: u64 },
}

impl Request {
    /// Name of the process the request claims to come from.
    pub fn process_name(&self) -> &IdString {
        match self {
            Self::Register { name, .. }
            | Self::CreatePublisher { name, .. }
            | Self::CreateSubscriber { name, .. }
            | Self::CreateInterface { name, .. }
            | Self::Keepalive { name }
            | Self::Deregister { name, .. } => name,
        }
    }
}

/// Responses sent by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    RegisterAck {
        session_id: u64,
        /// Echo of the request's timestamp
        transmission_timestamp: u64,
        segment_id: u64,
        keepalive_interval_ms: u64,
        /// Subscriber port carrying the service registry
        registry_port: UniquePortId,
    },

    CreatePublisherAck {
        port_id: UniquePortId,
        service: ServiceDescriptor,
    },

    CreateSubscriberAck {
        port_id: UniquePortId,
        service: ServiceDescriptor,
    },

    CreateInterfaceAck { port_id: UniquePortId },

    DeregisterAck,

    Error { code: IpcErrorCode, message: String },
}

impl Response {
    pub fn error(code: IpcErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

/// Error codes carried by [`Response::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpcErrorCode {
    MessageNotSupported,
    VersionMismatch,
    ProcessListFull,
    NoSegment,
    AccessDenied,
    AlreadyRegistered,
    PublisherListFull,
    SubscriberListFull,
    InterfaceListFull,
    UnknownProcess,
}

/// Framing errors.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("empty frame")]
    EmptyFrame,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serialize `message` into a complete frame (header + body).
pub fn encode_frame<T: Serialize>(message: &T, max: usize) -> Result<Vec<u8>, IpcError> {
    let body = serde_json::to_vec(message)?;
    if body.len() > max || u32::try_from(body.len()).is_err() {
        return Err(IpcError::FrameTooLarge {
            len: body.len(),
            max,
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Body length announced by a frame header.
pub fn frame_len(header: [u8; FRAME_HEADER_LEN], max: usize) -> Result<usize, IpcError> {
    let len = u32::from_be_bytes(header) as usize;
    if len == 0 {
        return Err(IpcError::EmptyFrame);
    }
    if len > max {
        return Err(IpcError::FrameTooLarge { len, max });
    }
    Ok(len)
}

/// Parse a frame body.
pub fn decode_frame<T: DeserializeOwned>(body: &[u8]) -> Result<T, IpcError> {
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> IdString {
        IdString::new(n).unwrap()
    }

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&Request::Keepalive { name: name("app") }, 1024).unwrap();
        let len = frame_len([frame[0], frame[1], frame[2], frame[3]], 1024).unwrap();
        assert_eq!(len, frame.len() - FRAME_HEADER_LEN);

        let decoded: Request = decode_frame(&frame[FRAME_HEADER_LEN..]).unwrap();
        assert_eq!(decoded, Request::Keepalive { name: name("app") });
    }

    #[test]
    fn test_frame_limits() {
        assert!(matches!(
            frame_len(2048u32.to_be_bytes(), 1024),
            Err(IpcError::FrameTooLarge { len: 2048, max: 1024 })
        ));
        assert!(matches!(frame_len([0; 4], 1024), Err(IpcError::EmptyFrame)));
        assert!(matches!(
            encode_frame(&Request::Keepalive { name: name("app") }, 4),
            Err(IpcError::FrameTooLarge { max: 4, .. })
        ));
    }

    #[test]
    fn test_request_wire_shape() {
        let json = r#"{
            "type": "create_subscriber",
            "name": "app",
            "session_id": 3,
            "service": {"service": "Radar", "instance": "Front", "event": "Objects"}
        }"#;
        let request: Request = serde_json::from_str(json).unwrap();
        match &request {
            Request::CreateSubscriber {
                session_id,
                options,
                ..
            } => {
                assert_eq!(*session_id, 3);
                assert_eq!(*options, SubscriberOptions::default());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(request.process_name(), &name("app"));
    }

    #[test]
    fn test_error_response_wire_shape() {
        let response = Response::error(IpcErrorCode::VersionMismatch, "broker 1.0 / client 2.0");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["code"], "version_mismatch");
    }

    #[test]
    fn test_garbage_body_rejected() {
        assert!(matches!(
            decode_frame::<Request>(b"{\"type\":\"launch_rockets\"}"),
            Err(IpcError::Json(_))
        ));
    }
}
