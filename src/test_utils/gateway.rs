//! [`FeedControl`] double recording every call.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::gateway::{BroadcastSettings, Cookie, Credentials, FeedControl, GatewayError};

/// A call received by [`RecordingGateway`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayCall {
    Login,
    StartBroadcast(BroadcastSettings),
    StopBroadcast,
}

#[derive(Default)]
struct Log {
    calls: Vec<GatewayCall>,
    failing_logins: usize,
    failing_starts: usize,
}

/// Gateway that always succeeds unless told to fail the next calls.
#[derive(Clone, Default)]
pub struct RecordingGateway {
    log: Arc<Mutex<Log>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` logins.
    pub fn fail_logins(self, count: usize) -> Self {
        self.log.lock().failing_logins = count;
        self
    }

    /// Fail the next `count` broadcast activations.
    pub fn fail_starts(self, count: usize) -> Self {
        self.log.lock().failing_starts = count;
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.log.lock().calls.clone()
    }

    pub fn count(&self, call: &GatewayCall) -> usize {
        let log = self.log.lock();
        log.calls
            .iter()
            .filter(|seen| std::mem::discriminant(*seen) == std::mem::discriminant(call))
            .count()
    }

    /// Credentials handed out by every successful login.
    pub fn credentials() -> Credentials {
        Credentials::new(vec![
            Cookie::new(".ASPXAUTH", "auth-token"),
            Cookie::new("BPMCSRF", "csrf-token"),
        ])
    }
}

impl FeedControl for RecordingGateway {
    fn login(&mut self) -> Result<Credentials, GatewayError> {
        let mut log = self.log.lock();
        log.calls.push(GatewayCall::Login);
        if log.failing_logins > 0 {
            log.failing_logins -= 1;
            return Err(GatewayError::Rejected {
                code: 1,
                message: "scripted rejection".into(),
            });
        }
        Ok(Self::credentials())
    }

    fn start_broadcast(&mut self, settings: &BroadcastSettings) -> Result<(), GatewayError> {
        let mut log = self.log.lock();
        log.calls.push(GatewayCall::StartBroadcast(settings.clone()));
        if log.failing_starts > 0 {
            log.failing_starts -= 1;
            return Err(GatewayError::Status {
                url: "scripted".into(),
                status: 503,
            });
        }
        Ok(())
    }

    fn stop_broadcast(&mut self) -> Result<(), GatewayError> {
        self.log.lock().calls.push(GatewayCall::StopBroadcast);
        Ok(())
    }
}
