//! Scripted collaborators for exercising the session and receive loop.
//!
//! Compiled for unit tests and, behind the `test-util` feature, for the
//! integration tests under `tests/`. The doubles share their state through
//! `Arc<Mutex<_>>` so a test keeps a clone for inspection after handing the
//! original to a listener.

mod gateway;
mod scripted;

pub use gateway::{GatewayCall, RecordingGateway};
pub use scripted::{ScriptedConnector, ScriptedTransport, Step};

use std::sync::Arc;

use parking_lot::Mutex;

use crate::dispatcher::{Diagnostic, Dispatcher};
use crate::record::Record;
use crate::state::ConnectionState;

/// Everything a [`Dispatcher`] delivered, in order.
#[derive(Clone, Default)]
pub struct Collector {
    records: Arc<Mutex<Vec<Record>>>,
    states: Arc<Mutex<Vec<ConnectionState>>>,
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register closures on `dispatcher` that append to this collector.
    pub fn attach(&self, dispatcher: &mut Dispatcher) {
        let records = Arc::clone(&self.records);
        dispatcher.on_record(move |record| {
            records.lock().push(record.clone());
            Ok(())
        });
        let states = Arc::clone(&self.states);
        dispatcher.on_state_change(move |state| {
            states.lock().push(state);
            Ok(())
        });
        let diagnostics = Arc::clone(&self.diagnostics);
        dispatcher.on_diagnostic(move |event| {
            diagnostics.lock().push(event.clone());
            Ok(())
        });
    }

    pub fn records(&self) -> Vec<Record> {
        self.records.lock().clone()
    }

    /// Message text of every record received so far.
    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|record| record.text().to_owned())
            .collect()
    }

    pub fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }
}

/// Wire form of a record carrying only a message.
pub fn message_json(message: &str) -> String {
    serde_json::json!({ "message": message }).to_string()
}
