//! Transport abstraction used by [`ConnectionSession`](super::ConnectionSession).

use std::{io, time::Duration};

use thiserror::Error;

use crate::cancel::CancelToken;
use crate::gateway::Credentials;

use super::endpoint::Endpoint;

/// Kind of transport-level message a chunk belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
    Close,
}

/// Outcome of one read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Bytes written into the caller's slice.
    pub count: usize,
    /// Whether this chunk completes a transport message.
    pub end_of_message: bool,
    pub kind: MessageKind,
}

impl Receipt {
    pub fn text(count: usize, end_of_message: bool) -> Self {
        Self {
            count,
            end_of_message,
            kind: MessageKind::Text,
        }
    }

    pub fn binary(count: usize, end_of_message: bool) -> Self {
        Self {
            count,
            end_of_message,
            kind: MessageKind::Binary,
        }
    }

    pub fn close() -> Self {
        Self {
            count: 0,
            end_of_message: true,
            kind: MessageKind::Close,
        }
    }
}

/// Failure while reading from an open transport.
#[derive(Debug, Error)]
pub enum ReceiveError {
    /// The cancellation token fired during the read.
    #[error("receive cancelled")]
    Cancelled,
    /// No transport is open.
    #[error("receive attempted without an open connection")]
    NotConnected,
    #[error("socket read failed: {0}")]
    Io(#[from] io::Error),
    #[error("websocket protocol error: {0}")]
    Protocol(String),
}

/// Failure while opening a connection.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("authentication failed: {0}")]
    Authentication(#[source] crate::gateway::GatewayError),
    #[error("invalid feed endpoint: {0}")]
    Endpoint(String),
    #[error("socket connect failed: {0}")]
    Io(#[from] io::Error),
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("feed activation failed: {0}")]
    Activation(#[source] crate::gateway::GatewayError),
}

/// An open, receive-only connection to the feed.
pub trait FeedTransport: Send {
    /// Block until the next chunk is available and copy it into `buf`.
    ///
    /// `buf` is never empty. Implementations must return
    /// [`ReceiveError::Cancelled`] promptly once `cancel` fires.
    fn receive(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<Receipt, ReceiveError>;

    /// Close the connection, waiting at most `timeout` for the peer.
    fn close(&mut self, timeout: Duration) -> io::Result<()>;
}

/// Opens transports to the feed endpoint.
pub trait Connector: Send {
    type Transport: FeedTransport;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<Self::Transport, ConnectError>;
}
