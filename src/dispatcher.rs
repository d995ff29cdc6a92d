//! Fan-out of records, state changes and diagnostics to observers.
//!
//! Observers are invoked synchronously, in registration order, on the receive
//! thread. Every call is isolated: an observer returning an error or panicking
//! is logged and skipped, and the remaining observers still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use log::warn;

use crate::record::Record;
use crate::state::ConnectionState;

/// Error type observers may return.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Events that are neither records nor state changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A binary message arrived and was discarded.
    BinaryDiscarded { bytes: usize },
    /// The connection faulted and a reconnect is scheduled.
    Reconnecting { attempt: u64, reason: String },
}

/// Receives every decoded record.
pub trait RecordObserver: Send + Sync {
    fn on_record(&self, record: &Record) -> Result<(), ObserverError>;
}

/// Receives every connection state transition.
pub trait StateObserver: Send + Sync {
    fn on_state_change(&self, state: ConnectionState) -> Result<(), ObserverError>;
}

/// Receives diagnostic events.
pub trait DiagnosticObserver: Send + Sync {
    fn on_diagnostic(&self, event: &Diagnostic) -> Result<(), ObserverError>;
}

impl<F> RecordObserver for F
where
    F: Fn(&Record) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_record(&self, record: &Record) -> Result<(), ObserverError> {
        self(record)
    }
}

impl<F> StateObserver for F
where
    F: Fn(ConnectionState) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_state_change(&self, state: ConnectionState) -> Result<(), ObserverError> {
        self(state)
    }
}

impl<F> DiagnosticObserver for F
where
    F: Fn(&Diagnostic) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_diagnostic(&self, event: &Diagnostic) -> Result<(), ObserverError> {
        self(event)
    }
}

/// Ordered observer registries.
#[derive(Clone, Default)]
pub struct Dispatcher {
    records: Vec<Arc<dyn RecordObserver>>,
    states: Vec<Arc<dyn StateObserver>>,
    diagnostics: Vec<Arc<dyn DiagnosticObserver>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_records(&mut self, observer: Arc<dyn RecordObserver>) {
        self.records.push(observer);
    }

    pub fn subscribe_states(&mut self, observer: Arc<dyn StateObserver>) {
        self.states.push(observer);
    }

    pub fn subscribe_diagnostics(&mut self, observer: Arc<dyn DiagnosticObserver>) {
        self.diagnostics.push(observer);
    }

    /// Register a closure receiving every record.
    pub fn on_record<F>(&mut self, observer: F)
    where
        F: Fn(&Record) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.records.push(Arc::new(observer));
    }

    /// Register a closure receiving every state transition.
    pub fn on_state_change<F>(&mut self, observer: F)
    where
        F: Fn(ConnectionState) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.states.push(Arc::new(observer));
    }

    /// Register a closure receiving diagnostic events.
    pub fn on_diagnostic<F>(&mut self, observer: F)
    where
        F: Fn(&Diagnostic) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        self.diagnostics.push(Arc::new(observer));
    }

    /// Deliver `record` to every record observer. Returns how many failed.
    pub fn emit_record(&self, record: &Record) -> usize {
        self.records
            .iter()
            .enumerate()
            .filter(|(index, observer)| !invoke("record", *index, || observer.on_record(record)))
            .count()
    }

    /// Deliver `state` to every state observer. Returns how many failed.
    pub fn emit_state_change(&self, state: ConnectionState) -> usize {
        self.states
            .iter()
            .enumerate()
            .filter(|(index, observer)| {
                !invoke("state", *index, || observer.on_state_change(state))
            })
            .count()
    }

    /// Deliver `event` to every diagnostic observer. Returns how many failed.
    pub fn emit_diagnostic(&self, event: &Diagnostic) -> usize {
        self.diagnostics
            .iter()
            .enumerate()
            .filter(|(index, observer)| {
                !invoke("diagnostic", *index, || observer.on_diagnostic(event))
            })
            .count()
    }

    pub fn record_observers(&self) -> usize {
        self.records.len()
    }

    pub fn state_observers(&self) -> usize {
        self.states.len()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("records", &self.records.len())
            .field("states", &self.states.len())
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}

/// Run one observer call, returning `true` when it succeeded.
fn invoke(kind: &str, index: usize, call: impl FnOnce() -> Result<(), ObserverError>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            warn!("Dispatcher: {kind} observer #{index} failed: {err}");
            false
        }
        Err(_) => {
            warn!("Dispatcher: {kind} observer #{index} panicked");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtest::Logger;
    use parking_lot::Mutex;
    use rstest::rstest;
    use serial_test::serial;

    fn record(text: &str) -> Record {
        Record {
            message: Some(text.to_owned()),
            ..Record::default()
        }
    }

    #[rstest]
    fn records_reach_observers_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            dispatcher.on_record(move |r: &Record| {
                seen.lock().push(format!("{tag}:{}", r.text()));
                Ok(())
            });
        }
        assert_eq!(dispatcher.emit_record(&record("x")), 0);
        assert_eq!(*seen.lock(), ["first:x", "second:x"]);
    }

    #[rstest]
    #[serial]
    fn failing_observer_does_not_block_later_ones() {
        let mut logger = Logger::start();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.on_record(|_: &Record| Err("observer rejected record".into()));
        let sink = Arc::clone(&seen);
        dispatcher.on_record(move |r: &Record| {
            sink.lock().push(r.text().to_owned());
            Ok(())
        });

        assert_eq!(dispatcher.emit_record(&record("kept")), 1);
        assert_eq!(*seen.lock(), ["kept"]);
        let logged = std::iter::from_fn(|| logger.pop()).any(|log| {
            log.level() == log::Level::Warn && log.args().contains("observer rejected record")
        });
        assert!(logged, "observer failure must be logged");
    }

    #[rstest]
    fn panicking_observer_is_isolated() {
        let states = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        dispatcher.on_state_change(|_: ConnectionState| panic!("observer bug"));
        let sink = Arc::clone(&states);
        dispatcher.on_state_change(move |s: ConnectionState| {
            sink.lock().push(s);
            Ok(())
        });

        assert_eq!(dispatcher.emit_state_change(ConnectionState::Open), 1);
        assert_eq!(*states.lock(), [ConnectionState::Open]);
    }

    #[rstest]
    fn diagnostics_are_delivered() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = Dispatcher::new();
        let sink = Arc::clone(&events);
        dispatcher.on_diagnostic(move |e: &Diagnostic| {
            sink.lock().push(e.clone());
            Ok(())
        });
        dispatcher.emit_diagnostic(&Diagnostic::BinaryDiscarded { bytes: 3 });
        assert_eq!(*events.lock(), [Diagnostic::BinaryDiscarded { bytes: 3 }]);
    }

    #[rstest]
    fn empty_dispatcher_is_a_no_op() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.emit_record(&record("x")), 0);
        assert_eq!(dispatcher.emit_state_change(ConnectionState::Closed), 0);
    }
}
