//! Batching managers grouping related inbound items.
//!
//! Items arriving as part of one user action (the messages of a media
//! album) reach the application as separate deliveries. A batching manager
//! buffers them and invokes the registered handler exactly once per settled
//! group, with the group restored to intrinsic order.
//!
//! Three policies are provided:
//! - [`SequentialBatcher`] for hosts that dispatch updates one at a time
//!   and need groups handled in arrival order
//! - [`DebounceBatcher`], the default: a group settles once a full delay
//!   has passed with no timer still outstanding
//! - [`WindowBatcher`], which ignores keys and delivers everything observed
//!   within a fixed wall-clock window as one batch
//!
//! Handlers run under a fault boundary: a panic inside the handler is
//! converted into a [`FlushError`] instead of unwinding the timer task.

pub mod debounce;
pub mod sequential;
pub mod window;

pub use debounce::DebounceBatcher;
pub use sequential::SequentialBatcher;
pub use window::WindowBatcher;

use crate::domain::correlate::Correlated;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Error raised by a batch handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// User callback receiving one settled group, sorted ascending by sequence.
pub type BatchHandler<E> = Arc<dyn Fn(&[E]) -> Result<(), HandlerError> + Send + Sync>;

/// A batch flush that did not complete normally.
#[derive(Debug)]
pub enum FlushError {
    /// The handler returned an error.
    Handler(HandlerError),
    /// The handler panicked; the payload is rendered best-effort.
    Panicked(String),
}

impl std::fmt::Display for FlushError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushError::Handler(err) => write!(f, "batch handler failed: {}", err),
            FlushError::Panicked(msg) => write!(f, "batch handler panicked: {}", msg),
        }
    }
}

impl std::error::Error for FlushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FlushError::Handler(err) => Some(err.as_ref()),
            FlushError::Panicked(_) => None,
        }
    }
}

/// Capability consumed by the event-dispatch layer.
pub trait Batcher<E: Correlated>: Send + Sync {
    /// Feed one inbound item into the manager.
    ///
    /// Never blocks the caller beyond the manager's internal critical
    /// section. An error is returned only when the policy flushes inline on
    /// the caller's task (the sequential manager's key transition); delayed
    /// flushes route their faults to the manager's
    /// [`ErrorReporter`](crate::application::ports::ErrorReporter) instead,
    /// so callers must not assume success or failure feedback.
    ///
    /// Must be called within a tokio runtime: delayed flushes are spawned
    /// tasks.
    fn add(&self, item: E) -> Result<(), FlushError>;
}

/// Invoke `handler` under a fault-isolation boundary.
pub(crate) fn invoke_contained<E>(
    handler: &BatchHandler<E>,
    items: &[E],
) -> Result<(), FlushError> {
    match panic::catch_unwind(AssertUnwindSafe(|| (handler.as_ref())(items))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(FlushError::Handler(err)),
        Err(payload) => Err(FlushError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
