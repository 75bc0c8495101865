// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Framed request/response I/O on a client connection.

use shmq::ipc::{self, IpcError, FRAME_HEADER_LEN};
use shmq::{Request, Response};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::warn;

/// Identity of the client process, as reported by the kernel for the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: Option<u32>,
    pub uid: u32,
}

impl PeerCredentials {
    pub fn of(stream: &UnixStream) -> std::io::Result<Self> {
        let cred = stream.peer_cred()?;
        Ok(Self {
            pid: cred.pid().and_then(|pid| u32::try_from(pid).ok()),
            uid: cred.uid(),
        })
    }
}

/// Replace the pid and user a registration claims with the socket's.
///
/// Monitored processes are signalled at shutdown, so a registration whose pid
/// cannot be verified is accepted unmonitored. Other requests pass unchanged.
pub fn bind_peer_identity(peer: Option<PeerCredentials>, request: Request) -> Request {
    let Request::Register {
        name,
        pid,
        user,
        monitored,
        transmission_timestamp,
        version,
    } = request
    else {
        return request;
    };

    let (pid, user, monitored) = match peer {
        Some(PeerCredentials {
            pid: Some(peer_pid),
            uid,
        }) => {
            if peer_pid != pid || uid != user {
                warn!(
                    "Process {} claims pid {} user {}, socket says pid {} user {}",
                    name, pid, user, peer_pid, uid
                );
            }
            (peer_pid, uid, monitored)
        }
        Some(PeerCredentials { pid: None, uid }) => {
            if monitored {
                warn!("Process {}: peer pid unknown, registering unmonitored", name);
            }
            (pid, uid, false)
        }
        None => {
            if monitored {
                warn!("Process {}: peer credentials unknown, registering unmonitored", name);
            }
            (pid, user, false)
        }
    };

    Request::Register {
        name,
        pid,
        user,
        monitored,
        transmission_timestamp,
        version,
    }
}

/// One frame read from a client.
#[derive(Debug)]
pub enum Incoming {
    Request(Request),
    /// Well-framed body that is not a known request.
    Malformed(IpcError),
}

/// Reading half of a client connection.
pub struct RequestReader<R> {
    reader: R,
    max_message_size: usize,
    read_buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RequestReader<R> {
    pub fn new(reader: R, max_message_size: usize) -> Self {
        Self {
            reader,
            max_message_size,
            read_buffer: Vec::with_capacity(4096),
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` if the connection is closed gracefully. Framing
    /// errors are fatal for the connection since the stream cannot be resynced.
    pub async fn read_request(&mut self) -> Result<Option<Incoming>, IpcError> {
        let mut header = [0u8; FRAME_HEADER_LEN];
        match self.reader.read_exact(&mut header).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = ipc::frame_len(header, self.max_message_size)?;

        self.read_buffer.clear();
        self.read_buffer.resize(len, 0);
        self.reader.read_exact(&mut self.read_buffer).await?;

        Ok(Some(match ipc::decode_frame(&self.read_buffer) {
            Ok(request) => Incoming::Request(request),
            Err(e) => Incoming::Malformed(e),
        }))
    }
}

/// Write one response frame.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
    max_message_size: usize,
) -> Result<(), IpcError> {
    let frame = ipc::encode_frame(response, max_message_size)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
