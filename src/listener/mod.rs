//! Long-running feed listener.
//!
//! [`ListenerBuilder`] assembles a [`ConnectionSession`](crate::session::ConnectionSession)
//! and its observers into a [`FeedListener`]. Starting the listener moves a
//! [`ReceiveLoop`] onto a dedicated named thread which owns the session, the
//! receive buffer and the framer for its whole life.

mod backoff;
mod builder;
mod config;
mod handle;
mod worker;

pub use backoff::ReconnectBackoff;
pub use builder::{BuildError, ListenerBuilder};
pub use config::{DEFAULT_BACKOFF, ListenerConfig, THREAD_NAME};
pub use handle::FeedListener;
pub use worker::ReceiveLoop;
