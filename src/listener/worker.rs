//! The receive loop run on the listener thread.
//!
//! The loop connects when the session is not open, then pulls chunks until a
//! fault. Text is framed into records and dispatched, a server close is
//! answered with a graceful close followed by an immediate reconnect, and
//! binary messages are dropped and reported as diagnostics. Any other fault
//! marks the session faulted, resets the framer and waits one backoff interval
//! before reconnecting. Only cancellation ends the loop, after the broadcast
//! is stopped and the socket closed.

use std::{mem, sync::Arc};

use log::{debug, info, warn};

use crate::{
    cancel::CancelToken,
    dispatcher::{Diagnostic, Dispatcher},
    error::FeedError,
    framer::RecordFramer,
    gateway::FeedControl,
    rate_limited_warner::RateLimitedWarner,
    record::Record,
    session::{ConnectionSession, Connector, MessageKind},
};

use super::{backoff::ReconnectBackoff, config::ListenerConfig};

/// Control loop owning a [`ConnectionSession`] for its whole lifetime.
pub struct ReceiveLoop<C: Connector, G: FeedControl> {
    session: ConnectionSession<C, G>,
    dispatcher: Arc<Dispatcher>,
    framer: RecordFramer,
    backoff: ReconnectBackoff,
    warner: RateLimitedWarner,
    cancel: CancelToken,
    /// Bytes of the binary message currently being discarded.
    binary_bytes: usize,
}

impl<C: Connector, G: FeedControl> ReceiveLoop<C, G> {
    pub fn new(
        session: ConnectionSession<C, G>,
        dispatcher: Arc<Dispatcher>,
        config: &ListenerConfig,
        cancel: CancelToken,
    ) -> Self {
        Self {
            session,
            dispatcher,
            framer: RecordFramer::new(),
            backoff: ReconnectBackoff::new(config.backoff),
            warner: RateLimitedWarner::new(config.warn_interval),
            cancel,
            binary_bytes: 0,
        }
    }

    /// Run until cancelled, then stop the feed and close the connection.
    pub fn run(mut self) -> ConnectionSession<C, G> {
        debug!("ReceiveLoop: started");
        while !self.cancel.is_cancelled() {
            if let Err(err) = self.turn() {
                if err.is_cancellation() || self.cancel.is_cancelled() {
                    debug!("ReceiveLoop: cancelled ({err})");
                    break;
                }
                self.fault(&err);
                if self.backoff.wait(&self.cancel) {
                    break;
                }
            }
        }
        self.session.disconnect();
        self.warner.flush(|count| {
            warn!("ReceiveLoop: {count} connection faults not reported individually");
        });
        debug!("ReceiveLoop: stopped");
        self.session
    }

    fn turn(&mut self) -> Result<(), FeedError> {
        self.connect_if_needed()?;
        self.step()
    }

    fn connect_if_needed(&mut self) -> Result<(), FeedError> {
        if !self.session.state().needs_connect() {
            return Ok(());
        }
        self.framer.reset();
        self.binary_bytes = 0;
        self.session.connect()?;
        self.backoff.record_success();
        Ok(())
    }

    /// Receive one chunk and act on it.
    fn step(&mut self) -> Result<(), FeedError> {
        let receipt = self.session.receive(&self.cancel)?;
        match receipt.kind {
            MessageKind::Text => {
                let dispatcher = &self.dispatcher;
                self.framer.drain(
                    self.session.buffer_mut(),
                    receipt.end_of_message,
                    |record: Record| {
                        dispatcher.emit_record(&record);
                    },
                )?;
            }
            MessageKind::Binary => {
                self.binary_bytes += receipt.count;
                if receipt.end_of_message {
                    let bytes = mem::take(&mut self.binary_bytes);
                    debug!("ReceiveLoop: discarded {bytes}-byte binary message");
                    self.dispatcher
                        .emit_diagnostic(&Diagnostic::BinaryDiscarded { bytes });
                }
            }
            MessageKind::Close => {
                info!("ReceiveLoop: server closed the connection; reconnecting");
                self.session.close_gracefully();
                self.framer.reset();
            }
        }
        Ok(())
    }

    fn fault(&mut self, err: &FeedError) {
        self.session.mark_faulted();
        self.framer.reset();
        self.binary_bytes = 0;
        let attempt = self.backoff.record_failure();
        debug!("ReceiveLoop: fault #{attempt}: {err}");
        self.warner.record();
        self.warner.warn_if_due(|count| {
            warn!(
                "ReceiveLoop: connection fault ({count} since last report): {err}; \
                 reconnecting in {:?}",
                self.backoff.interval()
            );
        });
        self.dispatcher.emit_diagnostic(&Diagnostic::Reconnecting {
            attempt,
            reason: err.to_string(),
        });
    }
}
