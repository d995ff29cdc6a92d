//! Cooperative cancellation for the receive thread.
//!
//! [`CancelSource`] owns the only sender of a zero-capacity channel. Cancelling
//! drops that sender, which disconnects every [`CancelToken`] at once: pending
//! [`CancelToken::wait`] calls wake immediately and later checks observe the
//! disconnect without blocking.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use parking_lot::Mutex;

/// Owner side of a cancellation signal.
#[derive(Debug)]
pub struct CancelSource {
    tx: Mutex<Option<Sender<()>>>,
    token: CancelToken,
}

/// Cheaply cloneable observer of a [`CancelSource`].
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: Receiver<()>,
}

impl CancelSource {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            token: CancelToken { rx },
        }
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        drop(self.tx.lock().take());
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Sleep for up to `timeout`, returning `true` if cancelled meanwhile.
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}
