//! Capturing error reporter for testing.

use crate::application::batch::FlushError;
use crate::application::ports::ErrorReporter;
use crate::domain::correlate::Correlated;
use std::sync::{Arc, Mutex};

/// One fault captured by a [`CapturingReporter`], rendered for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFault {
    /// Display rendering of the flush error.
    pub error: String,
    /// Correlation key of the representative item.
    pub key: String,
    /// Sequence number of the representative item.
    pub sequence: i64,
}

/// Error reporter recording every reported fault.
///
/// Clones share the same underlying buffer, so a clone can be handed to a
/// manager while the test keeps one for assertions.
#[derive(Debug, Clone, Default)]
pub struct CapturingReporter {
    faults: Arc<Mutex<Vec<CapturedFault>>>,
}

impl CapturingReporter {
    /// Create an empty capturing reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of faults reported so far.
    pub fn count(&self) -> usize {
        self.faults
            .lock()
            .expect("CapturingReporter mutex poisoned")
            .len()
    }

    /// Snapshot of the captured faults, in report order.
    pub fn faults(&self) -> Vec<CapturedFault> {
        self.faults
            .lock()
            .expect("CapturingReporter mutex poisoned")
            .clone()
    }
}

impl<E: Correlated> ErrorReporter<E> for CapturingReporter {
    fn report(&self, err: FlushError, item: &E) {
        self.faults
            .lock()
            .expect("CapturingReporter mutex poisoned")
            .push(CapturedFault {
                error: err.to_string(),
                key: item.correlation_key(),
                sequence: item.sequence(),
            });
    }
}
