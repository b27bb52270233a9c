//! Integration tests for the outbound call scheduler.

use chat_throttle::infrastructure::mocks::MockClock;
use chat_throttle::{Limits, NoopScheduler, QuotaScheduler, RawCall, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn ok_call() -> RawCall {
    Box::new(|| Box::pin(async { Ok(Vec::new()) }))
}

fn recording_call(log: Arc<AtomicUsize>) -> RawCall {
    Box::new(move || {
        Box::pin(async move {
            log.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        })
    })
}

#[tokio::test]
async fn test_noop_scheduler_has_zero_wait() {
    let scheduler: Arc<dyn Scheduler> = Arc::new(NoopScheduler::new());

    let started = Instant::now();
    for _ in 0..100 {
        scheduler.run(1, "-1", ok_call()).await.unwrap();
    }

    // No ledger, no polling: a hundred calls finish in well under one
    // polling interval.
    assert!(started.elapsed() < Duration::from_millis(10));
}

#[tokio::test]
async fn test_throttled_calls_wait_for_the_window() {
    let limits = Limits {
        global: 2,
        per_chat: 100,
        global_window: Duration::from_millis(100),
        chat_window: Duration::from_secs(60),
        polling: Duration::from_millis(5),
    };
    let scheduler = QuotaScheduler::custom(limits).unwrap();

    let started = Instant::now();
    for _ in 0..4 {
        scheduler.run(1, "7", ok_call()).await.unwrap();
    }

    // Calls three and four had to wait for the first window to elapse.
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_blocked_caller_resumes_after_release() {
    let start = Instant::now();
    let clock = Arc::new(MockClock::new(start));
    let limits = Limits {
        global: 1,
        per_chat: 100,
        global_window: Duration::from_secs(1),
        chat_window: Duration::from_secs(60),
        polling: Duration::from_millis(1),
    };
    let scheduler = Arc::new(
        QuotaScheduler::custom(limits)
            .unwrap()
            .with_clock(clock.clone()),
    );

    scheduler.run(1, "7", ok_call()).await.unwrap();

    let ran = Arc::new(AtomicUsize::new(0));
    let waiter = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        let ran = Arc::clone(&ran);
        async move { scheduler.run(1, "7", recording_call(ran)).await }
    });

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ran.load(Ordering::SeqCst), 0, "ran before capacity freed");

    clock.advance(Duration::from_secs(2));
    waiter.await.unwrap().unwrap();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_call_error_reaches_the_caller() {
    let scheduler: Arc<dyn Scheduler> = Arc::new(QuotaScheduler::api_defaults());

    let call: RawCall = Box::new(|| Box::pin(async { Err("telegram says no".into()) }));
    let err = scheduler.run(1, "42", call).await.unwrap_err();

    assert_eq!(err.to_string(), "telegram says no");
}

#[tokio::test]
async fn test_personal_chats_only_consume_global_capacity() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let limits = Limits {
        global: 100,
        per_chat: 1,
        global_window: Duration::from_secs(1),
        chat_window: Duration::from_secs(60),
        polling: Duration::from_millis(1),
    };
    let scheduler = QuotaScheduler::custom(limits)
        .unwrap()
        .with_clock(clock.clone());

    // Way past the per-chat quota, but a personal chat is exempt.
    for _ in 0..20 {
        scheduler.run(1, "42", ok_call()).await.unwrap();
    }
}
