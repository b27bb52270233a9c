//! The gate every outbound API call passes through.
//!
//! The scheduler serializes outgoing requests so they never exceed the
//! global rate or the per-chat rate. A caller blocks (cooperatively, via
//! polling) until the ledger has headroom; this is deliberate backpressure,
//! not fire-and-forget. Admission itself never fails - the only outcome of
//! contention is waiting.

use crate::application::ports::Clock;
use crate::domain::quota::{
    QuotaLedger, CHAT_QUOTA, CHAT_WINDOW, GLOBAL_QUOTA, GLOBAL_WINDOW,
};
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::trace;

/// Default interval at which waiting callers re-check the ledger.
pub const DEFAULT_POLLING: Duration = Duration::from_millis(10);

/// Result of a raw API call: the response body, or whatever the transport
/// raised.
pub type CallResult = Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;

/// Future produced by a [`RawCall`].
pub type CallFuture = Pin<Box<dyn Future<Output = CallResult> + Send>>;

/// A deferred API call, executed once the scheduler admits it.
pub type RawCall = Box<dyn FnOnce() -> CallFuture + Send>;

/// Capability consumed by the HTTP-call execution layer.
///
/// Invoke [`run`](Scheduler::run) once per outbound call. `chat` is the
/// remote conversation identifier as a string; identifiers that parse as a
/// non-negative integer address private conversations and are exempt from
/// the per-chat limit.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Run `call` once `cost` units of capacity are admitted for `chat`.
    ///
    /// Blocks the calling task until admission succeeds, then executes the
    /// call and returns its result unchanged. Call errors propagate to the
    /// caller; only the admission wait is internal.
    async fn run(&self, cost: u32, chat: &str, call: RawCall) -> CallResult;
}

/// Error returned when limit configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitsError {
    /// Global quota must be greater than zero
    ZeroGlobalQuota,
    /// Per-chat quota must be greater than zero
    ZeroChatQuota,
    /// Polling interval must be greater than zero
    ZeroPollingInterval,
}

impl std::fmt::Display for LimitsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitsError::ZeroGlobalQuota => {
                write!(f, "global quota must be greater than 0")
            }
            LimitsError::ZeroChatQuota => {
                write!(f, "per-chat quota must be greater than 0")
            }
            LimitsError::ZeroPollingInterval => {
                write!(f, "polling interval must be greater than 0")
            }
        }
    }
}

impl std::error::Error for LimitsError {}

/// Rate limit configuration for a [`QuotaScheduler`].
///
/// Serde-derived so embedders can load limits from their config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Calls admitted per `global_window`, across all chats.
    pub global: u32,
    /// Calls admitted per `chat_window` for one group chat.
    pub per_chat: u32,
    /// Length of the global window.
    pub global_window: Duration,
    /// Length of the per-chat window.
    pub chat_window: Duration,
    /// How often waiting callers re-check the ledger.
    pub polling: Duration,
}

impl Limits {
    /// The remote API's documented limits: 30 calls/second globally,
    /// 20 calls/minute per group chat.
    pub fn api_defaults() -> Self {
        Self {
            global: GLOBAL_QUOTA,
            per_chat: CHAT_QUOTA,
            global_window: GLOBAL_WINDOW,
            chat_window: CHAT_WINDOW,
            polling: DEFAULT_POLLING,
        }
    }

    /// 20% headroom below [`api_defaults`](Limits::api_defaults), with
    /// proportionally slower polling, in case something goes wrong.
    pub fn conservative() -> Self {
        Self {
            global: GLOBAL_QUOTA * 4 / 5,
            per_chat: CHAT_QUOTA * 4 / 5,
            polling: DEFAULT_POLLING * 10,
            ..Self::api_defaults()
        }
    }

    /// 50% headroom below [`api_defaults`](Limits::api_defaults).
    ///
    /// The right choice when continuously uploading large amounts of media
    /// into a single chat.
    pub fn extra_conservative() -> Self {
        Self {
            global: GLOBAL_QUOTA / 2,
            per_chat: CHAT_QUOTA / 2,
            polling: DEFAULT_POLLING * 100,
            ..Self::api_defaults()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns a [`LimitsError`] if a quota or the polling interval is zero.
    pub fn validate(&self) -> Result<(), LimitsError> {
        if self.global == 0 {
            return Err(LimitsError::ZeroGlobalQuota);
        }
        if self.per_chat == 0 {
            return Err(LimitsError::ZeroChatQuota);
        }
        if self.polling.is_zero() {
            return Err(LimitsError::ZeroPollingInterval);
        }
        Ok(())
    }
}

/// Quota-aware scheduler enforcing the configured limits.
///
/// All callers contend for one ledger behind one lock; the sweep, the
/// headroom check, and the reservation happen atomically, and the admitted
/// call finishes before the next caller is admitted.
pub struct QuotaScheduler {
    ledger: Mutex<QuotaLedger>,
    polling: Duration,
    clock: Arc<dyn Clock>,
}

impl QuotaScheduler {
    /// Scheduler matching the remote API's documented limits.
    pub fn api_defaults() -> Self {
        Self::from_limits(&Limits::api_defaults())
    }

    /// Scheduler with 20% headroom below the documented limits.
    pub fn conservative() -> Self {
        Self::from_limits(&Limits::conservative())
    }

    /// Scheduler with 50% headroom below the documented limits.
    pub fn extra_conservative() -> Self {
        Self::from_limits(&Limits::extra_conservative())
    }

    /// Scheduler with custom limits.
    ///
    /// # Errors
    /// Returns a [`LimitsError`] if the configuration is invalid.
    pub fn custom(limits: Limits) -> Result<Self, LimitsError> {
        limits.validate()?;
        Ok(Self::from_limits(&limits))
    }

    /// Replace the clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn from_limits(limits: &Limits) -> Self {
        Self {
            ledger: Mutex::new(QuotaLedger::new(
                limits.global,
                limits.per_chat,
                limits.global_window,
                limits.chat_window,
            )),
            polling: limits.polling,
            clock: Arc::new(SystemClock::new()),
        }
    }
}

#[async_trait]
impl Scheduler for QuotaScheduler {
    async fn run(&self, cost: u32, chat: &str, call: RawCall) -> CallResult {
        loop {
            let mut ledger = self.ledger.lock().await;
            let now = self.clock.now();
            ledger.sweep(now);

            if ledger.try_admit(cost, chat, now) {
                // The ledger lock doubles as the request serializer: the
                // call completes before the next caller is admitted.
                return call().await;
            }

            drop(ledger);
            trace!(cost, chat, "quota exhausted, waiting");
            tokio::time::sleep(self.polling).await;
        }
    }
}

/// Disabled scheduler: admits every call immediately.
///
/// For tests and for environments where rate enforcement is someone else's
/// job.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl NoopScheduler {
    /// Create a no-op scheduler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Scheduler for NoopScheduler {
    async fn run(&self, _cost: u32, _chat: &str, call: RawCall) -> CallResult {
        call().await
    }
}
