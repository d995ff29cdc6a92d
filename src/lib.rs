//! Resilient client for a server-pushed, delimiter-framed log feed.
//!
//! A [`FeedListener`] keeps one WebSocket connection to an application open on
//! a dedicated thread. It logs in and activates the server-side log broadcast
//! on every (re)connect, reassembles `0x1E`-separated JSON records from
//! partial reads, and hands each [`Record`] and each [`ConnectionState`]
//! change to registered observers. Any fault leads to a fixed backoff and a
//! fresh connection; only cancellation stops the loop.
//!
//! ```no_run
//! use logfeed::ListenerBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut listener = ListenerBuilder::new()
//!     .with_app_url("https://crm.example.com")
//!     .with_credentials("Supervisor", "secret")
//!     .on_record(|record| {
//!         println!("{record}");
//!         Ok(())
//!     })
//!     .build()?;
//! listener.start()?;
//! // ...
//! listener.dispose();
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod cancel;
pub mod dispatcher;
pub mod error;
pub mod file_config;
pub mod framer;
pub mod gateway;
pub mod level;
pub mod listener;
mod rate_limited_warner;
pub mod record;
pub mod session;
pub mod state;
pub mod tls;

#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;

pub use buffer::{CapacityFault, DEFAULT_BUFFER_CAPACITY, ReceiveBuffer};
pub use cancel::{CancelSource, CancelToken};
pub use dispatcher::{
    Diagnostic, DiagnosticObserver, Dispatcher, ObserverError, RecordObserver, StateObserver,
};
pub use error::FeedError;
pub use file_config::{ConfigError, load_config};
pub use framer::{RECORD_SEPARATOR, RecordFramer};
pub use gateway::{
    BroadcastSettings, Credentials, FeedControl, GatewayConfig, GatewayError, HttpGateway,
};
pub use level::LogLevel;
pub use listener::{BuildError, FeedListener, ListenerBuilder, ListenerConfig, ReceiveLoop};
pub use rate_limited_warner::{DEFAULT_WARN_INTERVAL, RateLimitedWarner};
pub use record::{DecodeError, DecodeRecord, Record};
pub use session::{
    ConnectError, ConnectionSession, Connector, FeedTransport, MessageKind, Receipt, ReceiveError,
    SessionOptions, SocketOptions, WebSocketConnector,
};
pub use state::ConnectionState;
pub use tls::TrustPolicy;
