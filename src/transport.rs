//! Outbound message contract, and a channel backed implementation.

use std::fmt::Debug;
use std::net::SocketAddr;

use flume::{Receiver, Sender};
use tracing::trace;

use crate::common::{Contact, Message};
use crate::{Error, Result};

/// Sends messages to remote contacts.
///
/// Implementations own queueing, retries and timeouts; handlers only fire
/// and forget.
pub trait Transport: Debug + Send + Sync {
    fn send(&self, to: &Contact, message: Message) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
/// A message waiting to be written to the network.
pub struct Outbound {
    /// Where the message goes, the contact's observed address.
    pub to: SocketAddr,
    pub message: Message,
}

#[derive(Debug, Clone)]
/// [Transport] handing outbound messages to whoever owns the receiving end
/// of a channel, typically a socket writer thread or a test.
pub struct ChannelTransport {
    sender: Sender<Outbound>,
}

impl ChannelTransport {
    pub fn new() -> (Self, Receiver<Outbound>) {
        let (sender, receiver) = flume::unbounded();

        (ChannelTransport { sender }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, to: &Contact, message: Message) -> Result<()> {
        let to = to.observed_address();

        trace!(
            ?to,
            kind = message.kind(),
            tid = message.transaction_id,
            "Sending"
        );

        self.sender
            .send(Outbound { to, message })
            .map_err(|_| Error::TransportClosed(to))
    }
}
