// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! shmq broker daemon
//!
//! Central broker of the shared-memory middleware. Applications register over
//! a Unix socket, create their ports and send keepalives; the broker connects
//! matching publishers and subscribers and publishes introspection data.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (/tmp/shmq-broker.sock)
//! shmq-daemon
//!
//! # Custom socket and config file
//! shmq-daemon --socket /run/shmq.sock --config broker.json
//!
//! # Relaxed version check, verbose library logs
//! shmq-daemon --compatibility minor --log-level "info,shmq=debug"
//! ```

use clap::Parser;
use shmq::CompatibilityCheckLevel;
use shmq_daemon::{BrokerServer, DaemonConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// shmq broker daemon - process registry and port discovery
#[derive(Parser, Debug)]
#[command(name = "shmq-daemon")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Unix socket clients connect to
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter (trace, debug, info, warn, error or env-filter directives)
    #[arg(long)]
    log_level: Option<String>,

    /// Heartbeat age after which a monitored process is removed
    #[arg(long)]
    keepalive_timeout_ms: Option<u64>,

    /// Introspection publish period
    #[arg(long)]
    introspection_interval_ms: Option<u64>,

    /// Version check (off, warn, major, minor, patch, commit_id, build_date)
    #[arg(long)]
    compatibility: Option<CompatibilityCheckLevel>,
}

impl Args {
    /// Command-line flags override the file.
    fn apply(self, config: &mut DaemonConfig) {
        if let Some(socket) = self.socket {
            config.socket_path = socket;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(timeout) = self.keepalive_timeout_ms {
            config.broker.process_keepalive_timeout_ms = timeout;
        }
        if let Some(interval) = self.introspection_interval_ms {
            config.broker.introspection_interval_ms = interval;
        }
        if let Some(level) = self.compatibility {
            config.broker.compatibility_check = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_file(path)?,
        None => DaemonConfig::default(),
    };
    let config_path = args.config.clone();
    args.apply(&mut config);

    // Library records go through the `log` facade and are bridged in here.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level)?)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| e.to_string())?;

    if let Some(path) = config_path {
        info!("Loaded config from {:?}", path);
    }

    info!("+----------------------------------------------------+");
    info!("|       shmq broker v{:<32}|", env!("CARGO_PKG_VERSION"));
    info!("+----------------------------------------------------+");
    info!("|  Socket:      {:37}|", config.socket_path.display());
    info!("|  Processes:   {:37}|", config.broker.max_processes);
    info!(
        "|  Keepalive:   {:37}|",
        format!(
            "{}ms / timeout {}ms",
            config.broker.process_keepalive_interval_ms,
            config.broker.process_keepalive_timeout_ms
        )
    );
    info!(
        "|  Version chk: {:37}|",
        format!("{:?}", config.broker.compatibility_check)
    );
    info!("+----------------------------------------------------+");

    let server = BrokerServer::new(config)?;

    let server_handle = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping broker...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Broker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "shmq-daemon",
            "--socket",
            "/run/test.sock",
            "--keepalive-timeout-ms",
            "900",
            "--compatibility",
            "minor",
        ]);
        let mut config = DaemonConfig::default();
        args.apply(&mut config);

        assert_eq!(config.socket_path, PathBuf::from("/run/test.sock"));
        assert_eq!(config.broker.process_keepalive_timeout_ms, 900);
        assert_eq!(config.broker.compatibility_check, CompatibilityCheckLevel::Minor);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_unknown_compatibility_level_rejected() {
        let result = Args::try_parse_from(["shmq-daemon", "--compatibility", "strict"]);
        assert!(result.is_err());
    }
}
