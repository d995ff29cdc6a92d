//! Public lifecycle surface for the receive thread.

use std::{io, sync::Arc, thread};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::{
    cancel::CancelSource,
    dispatcher::Dispatcher,
    gateway::FeedControl,
    session::{ConnectionSession, Connector, SharedState},
    state::ConnectionState,
};

use super::{config::ListenerConfig, worker::ReceiveLoop};

type Worker<C, G> = thread::JoinHandle<ConnectionSession<C, G>>;

/// Owns the receive thread of one feed connection.
///
/// Built by [`ListenerBuilder`](super::ListenerBuilder). Nothing happens until
/// [`start`](Self::start); [`dispose`](Self::dispose) (also run on drop)
/// cancels the loop and waits for it to stop the feed and close the socket.
pub struct FeedListener<C, G>
where
    C: Connector + 'static,
    G: FeedControl + 'static,
{
    pending: Option<ReceiveLoop<C, G>>,
    cancel: CancelSource,
    state: SharedState,
    thread_name: String,
    worker: Mutex<Option<Worker<C, G>>>,
}

impl<C, G> FeedListener<C, G>
where
    C: Connector + 'static,
    G: FeedControl + 'static,
{
    pub(crate) fn new(
        session: ConnectionSession<C, G>,
        dispatcher: Arc<Dispatcher>,
        config: &ListenerConfig,
    ) -> Self {
        let cancel = CancelSource::new();
        let state = session.shared_state();
        let pending = ReceiveLoop::new(session, dispatcher, config, cancel.token());
        Self {
            pending: Some(pending),
            cancel,
            state,
            thread_name: config.thread_name.clone(),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the receive thread. Calling it again is a no-op.
    pub fn start(&mut self) -> io::Result<()> {
        let Some(receive_loop) = self.pending.take() else {
            debug!("FeedListener: start ignored; already started");
            return Ok(());
        };
        let worker = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || receive_loop.run())?;
        *self.worker.lock() = Some(worker);
        Ok(())
    }

    /// Request cancellation without waiting for the thread.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel and wait for the receive thread to finish. Idempotent.
    pub fn dispose(&mut self) {
        self.cancel();
        self.pending = None;
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        if worker.join().is_err() {
            warn!("FeedListener: receive thread panicked");
        }
    }

    /// Last state published by the session.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Whether the receive thread has been started and has not exited.
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|worker| !worker.is_finished())
    }
}

impl<C, G> Drop for FeedListener<C, G>
where
    C: Connector + 'static,
    G: FeedControl + 'static,
{
    fn drop(&mut self) {
        self.dispose();
    }
}
