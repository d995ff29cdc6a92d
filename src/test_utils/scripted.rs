//! In-memory [`Connector`] replaying a fixed sequence of socket events.

use std::{
    collections::VecDeque,
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::gateway::Credentials;
use crate::session::{
    ConnectError, Connector, Endpoint, FeedTransport, MessageKind, Receipt, ReceiveError,
};

/// One event delivered by a [`ScriptedTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// Text payload; `end_of_message` marks the last fragment of a message.
    Text { bytes: Vec<u8>, end_of_message: bool },
    /// A complete binary message.
    Binary { bytes: Vec<u8> },
    /// The server closed the connection.
    Close,
    /// The read fails with an I/O error.
    Fail(String),
}

impl Step {
    /// A complete text message.
    pub fn text(payload: impl AsRef<[u8]>) -> Self {
        Self::Text {
            bytes: payload.as_ref().to_vec(),
            end_of_message: true,
        }
    }

    /// A text fragment that does not end the message.
    pub fn fragment(payload: impl AsRef<[u8]>) -> Self {
        Self::Text {
            bytes: payload.as_ref().to_vec(),
            end_of_message: false,
        }
    }

    pub fn binary(len: usize) -> Self {
        Self::Binary {
            bytes: vec![0xAB; len],
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

enum Outcome {
    Refuse(String),
    Open(Vec<Step>),
}

#[derive(Default)]
struct Script {
    outcomes: VecDeque<Outcome>,
    attempts: Vec<Instant>,
    endpoints: Vec<String>,
    credentials: Vec<Credentials>,
    closes: usize,
}

/// Connector whose attempts succeed or fail in a scripted order.
///
/// Once the script is exhausted every further attempt opens a transport that
/// delivers nothing and blocks until cancelled.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failed connect attempt.
    pub fn refuse(self, reason: impl Into<String>) -> Self {
        self.script
            .lock()
            .outcomes
            .push_back(Outcome::Refuse(reason.into()));
        self
    }

    /// Queue a successful connect whose transport plays `steps`.
    pub fn open(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script
            .lock()
            .outcomes
            .push_back(Outcome::Open(steps.into_iter().collect()));
        self
    }

    /// Instants at which `connect` was called.
    pub fn attempts(&self) -> Vec<Instant> {
        self.script.lock().attempts.clone()
    }

    /// Socket URLs requested, one per attempt.
    pub fn endpoints(&self) -> Vec<String> {
        self.script.lock().endpoints.clone()
    }

    /// Credentials presented, one per attempt.
    pub fn credentials(&self) -> Vec<Credentials> {
        self.script.lock().credentials.clone()
    }

    /// Number of transports closed through [`FeedTransport::close`].
    pub fn closes(&self) -> usize {
        self.script.lock().closes
    }
}

impl Connector for ScriptedConnector {
    type Transport = ScriptedTransport;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        credentials: &Credentials,
    ) -> Result<ScriptedTransport, ConnectError> {
        let mut script = self.script.lock();
        script.attempts.push(Instant::now());
        script.endpoints.push(endpoint.url().to_owned());
        script.credentials.push(credentials.clone());
        let steps = match script.outcomes.pop_front() {
            Some(Outcome::Refuse(reason)) => return Err(ConnectError::Handshake(reason)),
            Some(Outcome::Open(steps)) => steps,
            None => Vec::new(),
        };
        Ok(ScriptedTransport {
            steps: steps.into(),
            pending: None,
            script: Arc::clone(&self.script),
        })
    }
}

struct Pending {
    kind: MessageKind,
    bytes: Vec<u8>,
    offset: usize,
    end_of_message: bool,
}

/// Transport produced by [`ScriptedConnector`].
pub struct ScriptedTransport {
    steps: VecDeque<Step>,
    pending: Option<Pending>,
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    fn hand_out(&mut self, buf: &mut [u8]) -> Option<Receipt> {
        let pending = self.pending.as_mut()?;
        let rest = &pending.bytes[pending.offset..];
        let count = rest.len().min(buf.len());
        buf[..count].copy_from_slice(&rest[..count]);
        pending.offset += count;
        let drained = pending.offset == pending.bytes.len();
        let receipt = Receipt {
            count,
            end_of_message: drained && pending.end_of_message,
            kind: pending.kind,
        };
        if drained {
            self.pending = None;
        }
        Some(receipt)
    }
}

impl FeedTransport for ScriptedTransport {
    fn receive(&mut self, buf: &mut [u8], cancel: &CancelToken) -> Result<Receipt, ReceiveError> {
        if cancel.is_cancelled() {
            return Err(ReceiveError::Cancelled);
        }
        if let Some(receipt) = self.hand_out(buf) {
            return Ok(receipt);
        }
        let pending = match self.steps.pop_front() {
            Some(Step::Text {
                bytes,
                end_of_message,
            }) => Pending {
                kind: MessageKind::Text,
                bytes,
                offset: 0,
                end_of_message,
            },
            Some(Step::Binary { bytes }) => Pending {
                kind: MessageKind::Binary,
                bytes,
                offset: 0,
                end_of_message: true,
            },
            Some(Step::Close) => return Ok(Receipt::close()),
            Some(Step::Fail(message)) => {
                return Err(ReceiveError::Io(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    message,
                )));
            }
            None => {
                while !cancel.wait(Duration::from_millis(50)) {}
                return Err(ReceiveError::Cancelled);
            }
        };
        self.pending = Some(pending);
        self.hand_out(buf).ok_or(ReceiveError::NotConnected)
    }

    fn close(&mut self, _timeout: Duration) -> io::Result<()> {
        self.script.lock().closes += 1;
        Ok(())
    }
}
