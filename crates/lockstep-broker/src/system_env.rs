//! Production Environment implementation.

use std::time::{Duration, Instant};

use lockstep_core::Environment;

/// Production environment: system time and tokio sleeping.
///
/// The test harness substitutes an implementation on tokio's paused clock;
/// nothing in the broker distinguishes the two.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
