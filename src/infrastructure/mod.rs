//! Infrastructure layer - external adapters.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Error reporting (tracing-backed, or capturing for tests)

pub mod clock;
pub mod reporter;

/// Mock implementations for testing.
///
/// Available with the `test-helpers` feature or in test builds. Provides
/// controllable test doubles for throttling and batching behavior:
///
/// ```toml
/// [dev-dependencies]
/// chat-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
