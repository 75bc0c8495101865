// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Control channel of the broker: a Unix socket carrying framed requests.

use crate::config::DaemonConfig;
use shmq::ipc::{IpcError, IpcErrorCode};
use shmq::{Broker, Mailbox, Response};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

pub mod connection;
pub mod mailbox;

use connection::{bind_peer_identity, write_response, Incoming, PeerCredentials, RequestReader};
pub use mailbox::{ChannelMailbox, OUTBOUND_CAPACITY};

/// Broker daemon server.
#[derive(Clone)]
pub struct BrokerServer {
    config: Arc<DaemonConfig>,
    broker: Arc<Broker>,
    shutdown: Arc<watch::Sender<bool>>,
    running: Arc<AtomicBool>,
    next_connection: Arc<AtomicU64>,
}

impl BrokerServer {
    /// Create a server with a broker built from `config`.
    pub fn new(config: DaemonConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let broker = Broker::new(config.broker.clone())?;
        Ok(Self::with_broker(config, Arc::new(broker)))
    }

    /// Create a server around an already built broker.
    pub fn with_broker(config: DaemonConfig, broker: Arc<Broker>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config: Arc::new(config),
            broker,
            shutdown: Arc::new(shutdown),
            running: Arc::new(AtomicBool::new(false)),
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Accept clients until [`shutdown`](Self::shutdown), then stop the broker
    /// and remove the socket file.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }
        let result = self.serve().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn serve(&self) -> Result<(), ServerError> {
        let path = self.config.socket_path.clone();
        if path.exists() {
            warn!("Removing stale socket {:?}", path);
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path).map_err(|source| ServerError::Bind {
            path: path.clone(),
            source,
        })?;
        if let Err(e) = self.broker.start() {
            if let Err(remove) = std::fs::remove_file(&path) {
                debug!("Socket {:?} not removed: {}", path, remove);
            }
            return Err(e.into());
        }
        info!("Broker listening on {:?}", path);

        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _)) => {
                            let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
                            debug!("Client {} connected", id);

                            let broker = Arc::clone(&self.broker);
                            let max = self.config.max_message_size;
                            let shutdown = self.shutdown.subscribe();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    Self::handle_connection(stream, id, broker, max, shutdown).await
                                {
                                    warn!("Client {} error: {}", id, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        let broker = Arc::clone(&self.broker);
        if let Err(e) = tokio::task::spawn_blocking(move || broker.shutdown()).await {
            error!("Broker shutdown task failed: {}", e);
        }
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("Socket {:?} not removed: {}", path, e);
        }
        Ok(())
    }

    /// Serve one client. Requests are dispatched strictly in receipt order;
    /// responses go out through the connection's [`ChannelMailbox`].
    async fn handle_connection(
        stream: UnixStream,
        id: u64,
        broker: Arc<Broker>,
        max_message_size: usize,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let peer = match PeerCredentials::of(&stream) {
            Ok(peer) => Some(peer),
            Err(e) => {
                warn!("Client {}: peer credentials unavailable: {}", id, e);
                None
            }
        };
        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let mailbox: Arc<dyn Mailbox> = Arc::new(ChannelMailbox::new(tx));
        let writer = tokio::spawn(Self::write_loop(writer, rx, id, max_message_size));

        let mut reader = RequestReader::new(reader, max_message_size);
        let result = loop {
            tokio::select! {
                incoming = reader.read_request() => {
                    match incoming {
                        Ok(Some(Incoming::Request(request))) => {
                            debug!("Client {}: {:?}", id, request);
                            let request = bind_peer_identity(peer, request);
                            broker.dispatcher().dispatch(request, &mailbox);
                        }
                        Ok(Some(Incoming::Malformed(e))) => {
                            warn!("Client {} sent an unsupported message: {}", id, e);
                            let reply = Response::error(IpcErrorCode::MessageNotSupported, e.to_string());
                            if mailbox.send(reply).is_err() {
                                break Ok(());
                            }
                        }
                        Ok(None) => {
                            debug!("Client {} disconnected", id);
                            break Ok(());
                        }
                        Err(e) => break Err(ServerError::Ipc(e)),
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => {
                    debug!("Client {} handler shutting down", id);
                    break Ok(());
                }
            }
        };

        // Processes registered over this connection keep their entries and
        // mailboxes; the monitor evicts them if they stop sending keepalives.
        writer.abort();
        result
    }

    async fn write_loop(
        mut writer: OwnedWriteHalf,
        mut rx: mpsc::Receiver<Response>,
        id: u64,
        max_message_size: usize,
    ) {
        while let Some(response) = rx.recv().await {
            if let Err(e) = write_response(&mut writer, &response, max_message_size).await {
                warn!("Client {} write failed: {}", id, e);
                break;
            }
        }
    }

    /// Signal the server to shut down.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] shmq::BrokerError),

    #[error("Cannot bind {path:?}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Server already running")]
    AlreadyRunning,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Ipc(#[from] IpcError),
}
