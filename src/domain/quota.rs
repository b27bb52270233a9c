//! Quota bookkeeping for the call scheduler.
//!
//! The ledger tracks how much capacity outgoing calls have consumed, both
//! globally and per chat. Every admitted call reserves capacity for the
//! length of the relevant rate window; the expiry queue holds those
//! reservations until their release time passes and a sweep returns the
//! capacity to the ledger.

use ahash::AHashMap;
use std::time::{Duration, Instant};

/// Calls admitted per [`GLOBAL_WINDOW`] across all chats.
pub const GLOBAL_QUOTA: u32 = 30;

/// Length of the global rate window.
pub const GLOBAL_WINDOW: Duration = Duration::from_secs(1);

/// Calls admitted per [`CHAT_WINDOW`] for a single group chat.
pub const CHAT_QUOTA: u32 = 20;

/// Length of the per-chat rate window.
pub const CHAT_WINDOW: Duration = Duration::from_secs(60);

/// Capacity consumed by one admitted call, returned at `release_at`.
///
/// A reservation with no scope releases global capacity; a scoped one
/// releases that chat's capacity. Admitting a call for a group chat creates
/// one of each, since the two windows run independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    release_at: Instant,
    cost: u32,
    scope: Option<String>,
}

impl Reservation {
    /// Create a reservation releasing at `release_at`.
    pub fn new(release_at: Instant, cost: u32, scope: Option<String>) -> Self {
        Self {
            release_at,
            cost,
            scope,
        }
    }

    /// When this reservation's capacity is returned.
    pub fn release_at(&self) -> Instant {
        self.release_at
    }

    /// How much capacity this reservation holds.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// The chat this reservation counts against, if any.
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

/// Time-ordered queue of pending [`Reservation`]s.
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    entries: Vec<Reservation>,
}

impl ExpiryQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a reservation, keeping the queue ordered by release time.
    ///
    /// Cardinality is bounded by the configured quotas, so a full re-sort
    /// per insertion stays cheap.
    pub fn push(&mut self, reservation: Reservation) {
        self.entries.push(reservation);
        self.entries.sort_by_key(|r| r.release_at);
    }

    /// Remove and return every reservation due at `now`, earliest first.
    pub fn drain_due(&mut self, now: Instant) -> Vec<Reservation> {
        let due = self
            .entries
            .iter()
            .take_while(|r| r.release_at <= now)
            .count();
        self.entries.drain(..due).collect()
    }

    /// Number of pending reservations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether any reservations are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Consumed-capacity ledger with two independent rate windows.
///
/// The ledger itself is not synchronized; the scheduler guards it with a
/// single lock so that sweep, headroom check, and reservation happen
/// atomically with respect to other callers.
#[derive(Debug)]
pub struct QuotaLedger {
    global_limit: u32,
    global_used: u32,
    chat_limit: u32,
    chat_used: AHashMap<String, u32>,
    queue: ExpiryQueue,
    global_window: Duration,
    chat_window: Duration,
}

impl QuotaLedger {
    /// Create a ledger with explicit limits and window lengths.
    pub fn new(
        global_limit: u32,
        chat_limit: u32,
        global_window: Duration,
        chat_window: Duration,
    ) -> Self {
        Self {
            global_limit,
            global_used: 0,
            chat_limit,
            chat_used: AHashMap::new(),
            queue: ExpiryQueue::new(),
            global_window,
            chat_window,
        }
    }

    /// Ledger matching the remote API's documented limits.
    pub fn api_defaults() -> Self {
        Self::new(GLOBAL_QUOTA, CHAT_QUOTA, GLOBAL_WINDOW, CHAT_WINDOW)
    }

    fn has_headroom(&self, cost: u32, chat: &str) -> bool {
        if self.global_used + cost > self.global_limit {
            return false;
        }
        if is_personal(chat) {
            return true;
        }
        let used = self.chat_used.get(chat).copied().unwrap_or(0);
        used + cost <= self.chat_limit
    }

    /// Reserve `cost` units for a call to `chat`, if headroom allows.
    ///
    /// Admission succeeds iff the global window has `cost` units left and,
    /// for non-personal chats, the chat window does too. On success one
    /// global reservation is enqueued, plus a chat reservation for group
    /// chats.
    pub fn try_admit(&mut self, cost: u32, chat: &str, now: Instant) -> bool {
        if !self.has_headroom(cost, chat) {
            return false;
        }

        self.global_used += cost;
        self.queue
            .push(Reservation::new(now + self.global_window, cost, None));

        if !is_personal(chat) {
            *self.chat_used.entry(chat.to_owned()).or_insert(0) += cost;
            self.queue.push(Reservation::new(
                now + self.chat_window,
                cost,
                Some(chat.to_owned()),
            ));
        }

        true
    }

    /// Release every reservation due at `now`, earliest first.
    ///
    /// Chat entries are dropped from the usage map once they reach zero, so
    /// the map only holds chats with live consumption.
    pub fn sweep(&mut self, now: Instant) {
        for reservation in self.queue.drain_due(now) {
            match reservation.scope {
                None => {
                    self.global_used = self.global_used.saturating_sub(reservation.cost);
                }
                Some(chat) => {
                    if let Some(used) = self.chat_used.get_mut(&chat) {
                        *used = used.saturating_sub(reservation.cost);
                        if *used == 0 {
                            self.chat_used.remove(&chat);
                        }
                    }
                }
            }
        }
    }

    /// Capacity currently consumed against the global window.
    pub fn global_used(&self) -> u32 {
        self.global_used
    }

    /// Capacity currently consumed by `chat`.
    pub fn chat_used(&self, chat: &str) -> u32 {
        self.chat_used.get(chat).copied().unwrap_or(0)
    }

    /// Number of chats with live consumption.
    pub fn tracked_chats(&self) -> usize {
        self.chat_used.len()
    }

    /// Number of reservations not yet released.
    pub fn pending_reservations(&self) -> usize {
        self.queue.len()
    }
}

/// Check whether `chat` is a personal destination.
///
/// Private conversations are addressed by non-negative integer ids and are
/// exempt from the per-chat limit; group chats and channels have negative
/// ids, and named destinations don't parse at all.
///
/// # Example
/// ```
/// use chat_throttle::domain::quota::is_personal;
///
/// assert!(is_personal("42"));
/// assert!(!is_personal("-100200300"));
/// assert!(!is_personal("@somechannel"));
/// ```
pub fn is_personal(chat: &str) -> bool {
    matches!(chat.parse::<i64>(), Ok(id) if id >= 0)
}
