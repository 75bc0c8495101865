// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! shmq broker daemon: configuration and the Unix-socket control channel
//! around [`shmq::Broker`].

pub mod config;
pub mod server;

pub use config::{ConfigError, DaemonConfig};
pub use server::{BrokerServer, ServerError};
