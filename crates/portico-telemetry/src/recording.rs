//! In-memory trace recording for tests and local development.
//!
//! [`RecordingTraceApp`] implements the tracing collaborator seams without
//! any external agent: transactions accumulate their attributes in memory
//! and count their `end` calls, so tests can assert exactly-once lifecycle
//! behavior and inspect what the pipeline recorded.

use portico_core::trace::{AttributeError, TraceApp, Transaction};
use portico_core::writer::ResponseWriter;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A [`TraceApp`] that records transactions in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingTraceApp {
    transactions: Arc<Mutex<Vec<RecordedTransaction>>>,
}

impl RecordingTraceApp {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns handles to every transaction started so far.
    #[must_use]
    pub fn transactions(&self) -> Vec<RecordedTransaction> {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the single transaction started so far, or `None` when zero
    /// or more than one exist.
    #[must_use]
    pub fn single_transaction(&self) -> Option<RecordedTransaction> {
        let transactions = self.transactions();
        match transactions.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        }
    }
}

impl TraceApp for RecordingTraceApp {
    fn start_transaction(&self, name: &str) -> Box<dyn Transaction> {
        let transaction = RecordedTransaction::new(name);
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(transaction.clone());
        Box::new(transaction)
    }
}

/// A transaction handle whose attributes and lifecycle are observable.
#[derive(Debug, Clone)]
pub struct RecordedTransaction {
    inner: Arc<Recorded>,
}

#[derive(Debug)]
struct Recorded {
    name: String,
    attributes: Mutex<Vec<(String, String)>>,
    end_calls: AtomicUsize,
}

impl RecordedTransaction {
    fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(Recorded {
                name: name.to_string(),
                attributes: Mutex::new(Vec::new()),
                end_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// The name the transaction was started with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Snapshot of the recorded attributes, in insertion order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner
            .attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The value most recently recorded for `key`, if any.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// How many times `end` has been called.
    #[must_use]
    pub fn end_calls(&self) -> usize {
        self.inner.end_calls.load(Ordering::SeqCst)
    }
}

impl Transaction for RecordedTransaction {
    fn add_attribute(&self, key: &str, value: &str) -> Result<(), AttributeError> {
        self.inner
            .attributes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn wrap(&self, inner: Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter> {
        inner
    }

    fn end(&self) {
        self.inner.end_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn ended(&self) -> bool {
        self.end_calls() > 0
    }
}
