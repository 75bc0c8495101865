// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Outbound queue of one client connection.

use shmq::error::MailboxError;
use shmq::{Mailbox, Response};
use tokio::sync::mpsc;

/// Responses queued per connection before the client is considered stuck.
pub const OUTBOUND_CAPACITY: usize = 64;

/// [`Mailbox`] feeding the writer task of a connection.
///
/// Never blocks: the broker calls it with its process list locked.
pub struct ChannelMailbox {
    tx: mpsc::Sender<Response>,
}

impl ChannelMailbox {
    pub fn new(tx: mpsc::Sender<Response>) -> Self {
        Self { tx }
    }
}

impl Mailbox for ChannelMailbox {
    fn send(&self, response: Response) -> Result<(), MailboxError> {
        self.tx.try_send(response).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => MailboxError::Full,
            mpsc::error::TrySendError::Closed(_) => MailboxError::Closed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_and_closed_channels() {
        let (tx, mut rx) = mpsc::channel(1);
        let mailbox = ChannelMailbox::new(tx);

        assert!(mailbox.send(Response::DeregisterAck).is_ok());
        assert_eq!(mailbox.send(Response::DeregisterAck), Err(MailboxError::Full));
        assert_eq!(rx.try_recv().ok(), Some(Response::DeregisterAck));

        drop(rx);
        assert_eq!(mailbox.send(Response::DeregisterAck), Err(MailboxError::Closed));
    }
}
