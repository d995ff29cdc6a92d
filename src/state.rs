//! Connection lifecycle states reported to observers.

use std::fmt;

/// State of the feed connection.
///
/// A reconnect cycle moves `Connecting → Open` and ends in either
/// `Closing → Closed` or `Faulted`; both terminal states lead to a fresh
/// `Connecting` attempt unless the listener is shutting down.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    #[default]
    Unconnected,
    Connecting,
    Open,
    Closing,
    Closed,
    Faulted,
}

impl ConnectionState {
    /// Whether records can currently be received.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether the receive loop must run `connect` before reading again.
    pub fn needs_connect(self) -> bool {
        !self.is_open()
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Unconnected => "unconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(s)
    }
}
