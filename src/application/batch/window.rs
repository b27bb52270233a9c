//! Fixed-window batching.

use crate::application::batch::{invoke_contained, BatchHandler, Batcher, FlushError};
use crate::application::ports::ErrorReporter;
use crate::domain::correlate::{sort_by_sequence, Correlated};
use std::mem;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct State<E> {
    open: bool,
    items: Vec<E>,
}

/// Key-blind batching manager.
///
/// The first arrival after an empty buffer opens a window and arms a single
/// timer; everything observed until the timer fires is delivered as one
/// batch, whatever its correlation keys. Grouping precision is traded for
/// simplicity.
pub struct WindowBatcher<E: Correlated> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    delay: Duration,
    handler: BatchHandler<E>,
    reporter: Arc<dyn ErrorReporter<E>>,
    state: Mutex<State<E>>,
}

impl<E: Correlated> WindowBatcher<E> {
    /// Create a manager with a window of `delay`.
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
                    open: false,
                    items: Vec::new(),
                }),
            }),
        }
    }

    fn arm_timer(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.close_window();
        });
    }
}

impl<E: Correlated> Inner<E> {
    fn close_window(&self) {
        let items = {
            let mut state = self.state.lock().expect("batcher state lock poisoned");
            state.open = false;
            mem::take(&mut state.items)
        };

        if items.is_empty() {
            return;
        }

        let mut items = items;
        sort_by_sequence(&mut items);
        if let Err(err) = invoke_contained(&self.handler, &items) {
            self.reporter.report(err, &items[0]);
        }
    }
}

impl<E: Correlated> Batcher<E> for WindowBatcher<E> {
    fn add(&self, item: E) -> Result<(), FlushError> {
        let opened = {
            let mut state = self.inner.state.lock().expect("batcher state lock poisoned");
            state.items.push(item);
            if state.open {
                false
            } else {
                state.open = true;
                true
            }
        };

        if opened {
            self.arm_timer();
        }
        Ok(())
    }
}
