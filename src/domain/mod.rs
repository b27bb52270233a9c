//! Domain layer - pure quota and grouping logic.
//!
//! This layer contains the core concepts and invariants of the throttling
//! system:
//! - Quota bookkeeping (ledger, reservations, expiry queue)
//! - The grouping contract for batched items
//!
//! Time is always passed in as a parameter; nothing here reads the system
//! clock or performs I/O, so everything is easily testable.

pub mod correlate;
pub mod quota;
