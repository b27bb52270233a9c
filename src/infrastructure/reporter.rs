//! Default error reporter backed by `tracing`.

use crate::application::batch::FlushError;
use crate::application::ports::ErrorReporter;
use crate::domain::correlate::Correlated;
use tracing::error;

/// Reporter routing flush faults to the `tracing` subscriber.
///
/// The right default for embedders that just want failed flushes in their
/// logs; inject a custom [`ErrorReporter`] to route them elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl LogReporter {
    /// Create a new log reporter.
    pub fn new() -> Self {
        Self
    }
}

impl<E: Correlated> ErrorReporter<E> for LogReporter {
    fn report(&self, err: FlushError, item: &E) {
        error!(
            group = %item.correlation_key(),
            sequence = item.sequence(),
            error = %err,
            "batch flush failed"
        );
    }
}
