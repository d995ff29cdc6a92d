//! Session authentication and server-side feed control.
//!
//! The receive loop needs three calls from the remote application: log in,
//! start broadcasting log records to the socket, and stop broadcasting. They
//! are modelled by [`FeedControl`] so the connection logic can be exercised
//! without a server. [`HttpGateway`] is the production implementation built
//! on `ureq`.

mod cookies;
mod http;


use std::fmt;

use thiserror::Error;

use crate::level::LogLevel;

pub use cookies::Cookie;
pub use http::{GatewayConfig, HttpGateway, RequestPolicy};

/// Errors reported by a [`FeedControl`] implementation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The server answered with a non-success status.
    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },
    /// The request never produced a response.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    /// The login endpoint answered but refused the credentials.
    #[error("login rejected (code {code}): {message}")]
    Rejected { code: i64, message: String },
    /// The response body could not be understood.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },
}

/// Authentication material captured at login.
///
/// Values are never printed; `Debug` lists cookie names only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    cookies: Vec<Cookie>,
}

impl Credentials {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|cookie| cookie.name == name)
            .map(|cookie| cookie.value.as_str())
    }

    /// Value for a `Cookie` request header, if any cookies are held.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect();
        Some(pairs.join("; "))
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.cookies.iter().map(|cookie| &cookie.name))
            .finish()
    }
}

/// Parameters sent with the "start broadcast" call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastSettings {
    pub level: LogLevel,
    pub pattern: String,
    pub buffer_size: u32,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::All,
            pattern: String::new(),
            buffer_size: 1,
        }
    }
}

/// Remote calls the connection session depends on.
pub trait FeedControl: Send {
    /// Authenticate and return the material to attach to the socket.
    fn login(&mut self) -> Result<Credentials, GatewayError>;

    /// Ask the server to push log records to connected sockets.
    fn start_broadcast(&mut self, settings: &BroadcastSettings) -> Result<(), GatewayError>;

    /// Ask the server to stop pushing log records.
    fn stop_broadcast(&mut self) -> Result<(), GatewayError>;
}
