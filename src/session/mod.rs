//! Connection lifecycle for the log feed.
//!
//! [`ConnectionSession`] owns at most one transport at a time together with
//! the receive buffer and the connection state. "Open" always means the
//! session logged in, completed the socket handshake and activated the
//! server-side broadcast. Every connect attempt starts from an empty buffer so
//! bytes from an earlier connection can never be framed as part of a later
//! one.

mod endpoint;
mod transport;
mod websocket;

#[cfg(test)]
mod tests;

use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::buffer::{DEFAULT_BUFFER_CAPACITY, ReceiveBuffer};
use crate::cancel::CancelToken;
use crate::dispatcher::Dispatcher;
use crate::error::FeedError;
use crate::gateway::{BroadcastSettings, FeedControl};
use crate::state::ConnectionState;

pub use endpoint::{Endpoint, FEED_PATH};
pub use transport::{ConnectError, Connector, FeedTransport, MessageKind, Receipt, ReceiveError};
pub use websocket::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_HEADERS, DEFAULT_KEEP_ALIVE, DEFAULT_POLL_INTERVAL,
    SocketOptions, WebSocketConnector, WebSocketTransport,
};

/// Default bound on waiting for the peer to acknowledge a close.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-session settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Base URL of the application; the socket endpoint is derived from it.
    pub app_url: String,
    pub broadcast: BroadcastSettings,
    pub buffer_capacity: usize,
    pub close_timeout: Duration,
}

impl SessionOptions {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
            ..Self::default()
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            app_url: String::new(),
            broadcast: BroadcastSettings::default(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Last state published by a session, readable from any thread.
pub type SharedState = Arc<Mutex<ConnectionState>>;

/// A single logical connection to the feed, reconnectable in place.
pub struct ConnectionSession<C: Connector, G: FeedControl> {
    connector: C,
    gateway: G,
    options: SessionOptions,
    transport: Option<C::Transport>,
    buffer: ReceiveBuffer,
    state: SharedState,
    broadcasting: bool,
    dispatcher: Arc<Dispatcher>,
}

impl<C: Connector, G: FeedControl> ConnectionSession<C, G> {
    pub fn new(
        connector: C,
        gateway: G,
        options: SessionOptions,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let buffer = ReceiveBuffer::with_capacity(options.buffer_capacity);
        Self {
            connector,
            gateway,
            options,
            transport: None,
            buffer,
            state: Arc::new(Mutex::new(ConnectionState::Unconnected)),
            broadcasting: false,
            dispatcher,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Handle observing the state from other threads.
    pub fn shared_state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    pub fn buffer(&self) -> &ReceiveBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ReceiveBuffer {
        &mut self.buffer
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Log in, open the socket and activate the broadcast.
    ///
    /// Any previous transport is dropped and the buffer emptied first. On
    /// failure the state is left at `Connecting`; the caller decides whether
    /// to mark the session faulted.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        self.set_state(ConnectionState::Connecting);
        self.buffer.clear();
        self.transport = None;

        let credentials = self.gateway.login().map_err(ConnectError::Authentication)?;
        let endpoint =
            Endpoint::from_app_url(&self.options.app_url).map_err(ConnectError::Endpoint)?;
        debug!("ConnectionSession: opening {}", endpoint.url());
        let transport = self.connector.connect(&endpoint, &credentials)?;
        self.transport = Some(transport);

        if let Err(err) = self.gateway.start_broadcast(&self.options.broadcast) {
            self.transport = None;
            return Err(ConnectError::Activation(err));
        }
        self.broadcasting = true;
        self.set_state(ConnectionState::Open);
        info!("ConnectionSession: connected to {}", endpoint.url());
        Ok(())
    }

    /// Read the next chunk into the buffer's free space.
    ///
    /// Text chunks advance the write cursor. Binary chunks are written to the
    /// free space but not retained.
    pub fn receive(&mut self, cancel: &CancelToken) -> Result<Receipt, FeedError> {
        let transport = self.transport.as_mut().ok_or(ReceiveError::NotConnected)?;
        let spare = self.buffer.spare_mut()?;
        let receipt = transport.receive(spare, cancel)?;
        if receipt.kind == MessageKind::Text {
            self.buffer.advance(receipt.count);
            self.buffer.check_overflow()?;
        }
        Ok(receipt)
    }

    /// Answer a close from the server: `Closing`, bounded close, `Closed`.
    pub fn close_gracefully(&mut self) {
        self.set_state(ConnectionState::Closing);
        self.close_transport();
        self.buffer.clear();
        self.set_state(ConnectionState::Closed);
    }

    /// Abandon the connection after a fault.
    pub fn mark_faulted(&mut self) {
        self.set_state(ConnectionState::Faulted);
        self.transport = None;
        self.buffer.clear();
    }

    /// Stop the broadcast and close the socket. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.broadcasting {
            self.broadcasting = false;
            if let Err(err) = self.gateway.stop_broadcast() {
                warn!("ConnectionSession: stopping broadcast failed: {err}");
            }
        }
        if self.transport.is_some() {
            self.set_state(ConnectionState::Closing);
            self.close_transport();
        }
        self.buffer.clear();
        self.set_state(ConnectionState::Closed);
    }

    fn close_transport(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        if let Err(err) = transport.close(self.options.close_timeout) {
            warn!("ConnectionSession: close failed: {err}");
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        {
            let mut current = self.state.lock();
            if *current == next {
                return;
            }
            *current = next;
        }
        debug!("ConnectionSession: state -> {next}");
        self.dispatcher.emit_state_change(next);
    }
}

impl<C: Connector, G: FeedControl> std::fmt::Debug for ConnectionSession<C, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("app_url", &self.options.app_url)
            .field("state", &self.state())
            .field("connected", &self.transport.is_some())
            .field("broadcasting", &self.broadcasting)
            .field("buffer", &self.buffer)
            .finish()
    }
}
