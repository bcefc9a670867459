//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the broker runtime from system time.
//! Protocol state machines in this crate never read a clock — simulated time
//! is data they are handed — but the runtime's bounded waits (broker startup,
//! optional grant timeout) need to sleep and to measure elapsed wall time.
//! Routing those through a trait lets the test harness run them on a virtual
//! clock where a ten-second timeout costs no wall time at all.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Isolation: implementations must not share global state

use std::time::{Duration, Instant};

/// Abstract environment providing wall-clock time and async sleeping.
///
/// Implementations MUST guarantee that `now()` never goes backwards within a
/// single execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current wall-clock instant.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the only async method in the trait and is used solely by
    /// runtime code for bounded waits, never by protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}
