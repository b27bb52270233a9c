//! # chat-throttle
//!
//! Client-side throttling and batching for rate-limited messaging APIs.
//!
//! Messaging platforms enforce hard call quotas - typically a global rate
//! plus a stricter per-conversation rate - and deliver logically related
//! inbound messages (a media album, say) as separate updates. This crate
//! provides the two pieces that sit between such an API and application
//! code:
//!
//! - a **call scheduler** that gates every outbound request, blocking the
//!   caller until both the global window and the per-chat window have
//!   headroom
//! - **batching managers** that buffer related inbound items and invoke a
//!   handler exactly once per settled group, in intrinsic order
//!
//! ## Throttling outbound calls
//!
//! ```rust,no_run
//! use chat_throttle::{QuotaScheduler, RawCall, Scheduler};
//!
//! # async fn demo() -> chat_throttle::CallResult {
//! // 30 calls/second globally, 20 calls/minute per group chat.
//! let scheduler = QuotaScheduler::api_defaults();
//!
//! let call: RawCall = Box::new(|| Box::pin(async { Ok(b"{\"ok\":true}".to_vec()) }));
//! let body = scheduler.run(1, "-100200300", call).await?;
//! # Ok(body)
//! # }
//! ```
//!
//! Chat identifiers that parse as a non-negative integer address private
//! conversations and only consume global capacity. Use
//! [`QuotaScheduler::conservative`] or
//! [`QuotaScheduler::extra_conservative`] for 20%/50% safety margins, and
//! [`NoopScheduler`] where rate enforcement is not wanted.
//!
//! ## Batching inbound items
//!
//! Implement [`Correlated`] for your item type, then pick a policy:
//!
//! ```rust,no_run
//! use chat_throttle::{Batcher, Correlated, DebounceBatcher, LogReporter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Photo {
//!     album: String,
//!     message_id: i64,
//! }
//!
//! impl Correlated for Photo {
//!     fn correlation_key(&self) -> String {
//!         self.album.clone()
//!     }
//!
//!     fn sequence(&self) -> i64 {
//!         self.message_id
//!     }
//! }
//!
//! # fn demo(photo: Photo) {
//! let albums = DebounceBatcher::new(
//!     Duration::from_millis(500),
//!     Arc::new(|album: &[Photo]| {
//!         println!("album of {} photos", album.len());
//!         Ok(())
//!     }),
//!     Arc::new(LogReporter::new()),
//! );
//!
//! // Called from the update-dispatch loop, inside a tokio runtime.
//! albums.add(photo).unwrap();
//! # }
//! ```
//!
//! [`DebounceBatcher`] settles a group once a full delay has passed since
//! the last scheduled timer. [`SequentialBatcher`] flushes inline the
//! moment a different group starts (for single-threaded, in-order hosts),
//! and [`WindowBatcher`] batches everything seen in a fixed window,
//! ignoring keys.
//!
//! Handler errors from a delayed flush go to the injected
//! [`ErrorReporter`]; a handler panic is caught, converted to a
//! [`FlushError`], and reported the same way, so one bad batch never takes
//! the timers down.

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    correlate::Correlated,
    quota::{ExpiryQueue, QuotaLedger, Reservation},
};

pub use application::{
    batch::{
        BatchHandler, Batcher, DebounceBatcher, FlushError, HandlerError, SequentialBatcher,
        WindowBatcher,
    },
    ports::{Clock, ErrorReporter},
    scheduler::{
        CallFuture, CallResult, Limits, LimitsError, NoopScheduler, QuotaScheduler, RawCall,
        Scheduler, DEFAULT_POLLING,
    },
};

pub use infrastructure::{clock::SystemClock, reporter::LogReporter};
