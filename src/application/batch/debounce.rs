//! Counting-debounce batching, the default policy.

use crate::application::batch::{invoke_contained, BatchHandler, Batcher, FlushError};
use crate::application::ports::ErrorReporter;
use crate::domain::correlate::{sort_by_sequence, Correlated};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

struct GroupUnit<E> {
    pending: u32,
    items: Vec<E>,
}

/// Default batching manager.
///
/// Every arrival appends to its group and schedules one more delayed timer,
/// so an N-item group ends up with N timers. Each firing decrements the
/// group's outstanding count; the group settles when the count reaches
/// zero - that is, once a full delay has passed measured from the last
/// scheduled timer. Flushes run on timer tasks; faults go to the injected
/// reporter.
pub struct DebounceBatcher<E: Correlated> {
    inner: Arc<Inner<E>>,
}

struct Inner<E> {
    delay: Duration,
    handler: BatchHandler<E>,
    reporter: Arc<dyn ErrorReporter<E>>,
    units: DashMap<String, GroupUnit<E>>,
}

impl<E: Correlated + Sync> DebounceBatcher<E> {
    /// Create a manager settling groups after `delay` of quiet.
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
                units: DashMap::new(),
            }),
        }
    }

    /// Number of groups currently buffered.
    pub fn pending_groups(&self) -> usize {
        self.inner.units.len()
    }

    fn arm_timer(&self, key: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;
            inner.on_timer(&key);
        });
    }
}

impl<E: Correlated> Inner<E> {
    fn on_timer(&self, key: &str) {
        // The entry guard makes decrement-and-remove atomic against
        // concurrent arrivals for the same key.
        let settled = match self.units.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                let unit = occupied.get_mut();
                unit.pending -= 1;
                if unit.pending == 0 {
                    Some(occupied.remove())
                } else {
                    None
                }
            }
            Entry::Vacant(_) => None,
        };

        if let Some(unit) = settled {
            let mut items = unit.items;
            sort_by_sequence(&mut items);
            if let Err(err) = invoke_contained(&self.handler, &items) {
                self.reporter.report(err, &items[0]);
            }
        }
    }
}

impl<E: Correlated + Sync> Batcher<E> for DebounceBatcher<E> {
    fn add(&self, item: E) -> Result<(), FlushError> {
        let key = item.correlation_key();

        match self.inner.units.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let unit = occupied.get_mut();
                unit.items.push(item);
                unit.pending += 1;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(GroupUnit {
                    pending: 1,
                    items: vec![item],
                });
            }
        }

        self.arm_timer(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::CapturingReporter;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Msg {
        group: &'static str,
        id: i64,
    }

    impl Correlated for Msg {
        fn correlation_key(&self) -> String {
            self.group.to_owned()
        }

        fn sequence(&self) -> i64 {
            self.id
        }
    }

    type Flushes = Arc<Mutex<Vec<Vec<i64>>>>;

    fn collecting_handler(flushes: Flushes) -> BatchHandler<Msg> {
        Arc::new(move |items| {
            let ids: Vec<i64> = items.iter().map(|m| m.id).collect();
            flushes.lock().unwrap().push(ids);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_group_settles_after_last_timer() {
        let flushes: Flushes = Arc::default();
        let batcher = DebounceBatcher::new(
            Duration::from_millis(100),
            collecting_handler(Arc::clone(&flushes)),
            Arc::new(CapturingReporter::new()),
        );

        batcher.add(Msg { group: "a", id: 3 }).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        batcher.add(Msg { group: "a", id: 1 }).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        batcher.add(Msg { group: "a", id: 2 }).unwrap();

        // First timers have fired, but the last one is still outstanding.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(flushes.lock().unwrap().is_empty());
        assert_eq!(batcher.pending_groups(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*flushes.lock().unwrap(), vec![vec![1, 2, 3]]);
        assert_eq!(batcher.pending_groups(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_settle_independently() {
        let flushes: Flushes = Arc::default();
        let batcher = DebounceBatcher::new(
            Duration::from_millis(50),
            collecting_handler(Arc::clone(&flushes)),
            Arc::new(CapturingReporter::new()),
        );

        batcher.add(Msg { group: "a", id: 1 }).unwrap();
        batcher.add(Msg { group: "b", id: 10 }).unwrap();
        batcher.add(Msg { group: "a", id: 2 }).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut flushed = flushes.lock().unwrap().clone();
        flushed.sort();
        assert_eq!(flushed, vec![vec![1, 2], vec![10]]);
    }

    #[tokio::test]
    async fn test_single_item_settles_alone() {
        let flushes: Flushes = Arc::default();
        let batcher = DebounceBatcher::new(
            Duration::from_millis(30),
            collecting_handler(Arc::clone(&flushes)),
            Arc::new(CapturingReporter::new()),
        );

        batcher.add(Msg { group: "solo", id: 5 }).unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(*flushes.lock().unwrap(), vec![vec![5]]);
    }

    #[tokio::test]
    async fn test_panic_reported_once_and_later_groups_flush() {
        let reporter = Arc::new(CapturingReporter::new());
        let flushes: Flushes = Arc::default();
        let handler: BatchHandler<Msg> = {
            let flushes = Arc::clone(&flushes);
            Arc::new(move |items| {
                if items[0].group == "bad" {
                    panic!("corrupt album");
                }
                let ids: Vec<i64> = items.iter().map(|m| m.id).collect();
                flushes.lock().unwrap().push(ids);
                Ok(())
            })
        };
        let batcher =
            DebounceBatcher::new(Duration::from_millis(30), handler, reporter.clone());

        batcher.add(Msg { group: "bad", id: 1 }).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(reporter.count(), 1);
        let fault = &reporter.faults()[0];
        assert_eq!(fault.key, "bad");
        assert!(fault.error.contains("corrupt album"));

        // The manager keeps working for independent groups.
        batcher.add(Msg { group: "good", id: 2 }).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*flushes.lock().unwrap(), vec![vec![2]]);
        assert_eq!(reporter.count(), 1);
    }

    #[tokio::test]
    async fn test_handler_error_routed_to_reporter() {
        let reporter = Arc::new(CapturingReporter::new());
        let handler: BatchHandler<Msg> = Arc::new(|_| Err("rejected".into()));
        let batcher =
            DebounceBatcher::new(Duration::from_millis(30), handler, reporter.clone());

        batcher.add(Msg { group: "a", id: 9 }).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(reporter.count(), 1);
        assert_eq!(reporter.faults()[0].sequence, 9);
    }
}
