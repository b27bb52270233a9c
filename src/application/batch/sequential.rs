//! Eager-keyed batching for synchronous, in-order hosts.

use crate::application::batch::{invoke_contained, BatchHandler, Batcher, FlushError};
use crate::application::ports::ErrorReporter;
use crate::domain::correlate::{sort_by_sequence, Correlated};
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct State<E> {
    current: Option<String>,
    buf: Vec<E>,
}

/// Batching manager for hosts that dispatch updates one at a time.
///
/// A group is flushed either when an item with a different key arrives, or
/// once the idle delay elapses, whichever comes first. The key-transition
/// flush runs inline on the caller's task, so groups are handled in arrival
/// order and the handler's error comes back from [`add`](Batcher::add); the
/// idle flush runs on a timer task and reports faults through the injected
/// reporter.
pub struct SequentialBatcher<E: Correlated> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    delay: Duration,
    handler: BatchHandler<E>,
    reporter: Arc<dyn ErrorReporter<E>>,
    state: Mutex<State<E>>,
}

impl<E: Correlated> SequentialBatcher<E> {
    /// Create a manager flushing idle groups after `delay`.
    pub fn new(
        delay: Duration,
        handler: BatchHandler<E>,
        reporter: Arc<dyn ErrorReporter<E>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                handler,
                reporter,
                state: Mutex::new(State {
                    current: None,
                    buf: Vec::new(),
                }),
            }),
        }
    }

    fn arm_timer(&self, key: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.flush_if_current(&key);
        });
    }
}

impl<E: Correlated> Inner<E> {
    /// Idle flush: fires only if no newer group has superseded `key`.
    fn flush_if_current(&self, key: &str) {
        let items = {
            let mut state = self.state.lock().expect("batcher state lock poisoned");
            if state.buf.is_empty() {
                return;
            }
            if state.current.as_deref() != Some(key) {
                return;
            }
            state.current = None;
            mem::take(&mut state.buf)
        };

        self.flush_reported(items);
    }

    fn flush_reported(&self, mut items: Vec<E>) {
        sort_by_sequence(&mut items);
        if let Err(err) = invoke_contained(&self.handler, &items) {
            self.reporter.report(err, &items[0]);
        }
    }
}

impl<E: Correlated> Batcher<E> for SequentialBatcher<E> {
    fn add(&self, item: E) -> Result<(), FlushError> {
        let key = item.correlation_key();
        let mut state = self.inner.state.lock().expect("batcher state lock poisoned");

        if state.current.as_deref() == Some(key.as_str()) {
            state.buf.push(item);
            return Ok(());
        }

        // A different group starts: the previous one is settled and handled
        // right here, so the host observes groups in arrival order.
        let mut result = Ok(());
        if !state.buf.is_empty() {
            let mut previous = mem::take(&mut state.buf);
            sort_by_sequence(&mut previous);
            result = invoke_contained(&self.inner.handler, &previous);
        }

        state.current = Some(key.clone());
        state.buf.push(item);
        drop(state);

        self.arm_timer(key);
        result
    }
}
