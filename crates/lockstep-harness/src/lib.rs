//! Deterministic test harness for the lockstep protocol.
//!
//! Provides [`SimEnv`], an `Environment` on tokio's pausable virtual clock,
//! and ready-made federation fixtures for the integration tests. Under a
//! paused runtime (`#[tokio::test(start_paused = true)]`) every bounded wait
//! in the broker — startup, grant timeouts — elapses instantly and
//! reproducibly, so timeout paths are tested without wall-clock cost.
//!
//! Seeded randomness for interleaving tests comes from `rand_chacha`: the
//! seed is part of the test, so a failure replays exactly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::time::{Duration, Instant};

use lockstep_broker::{Broker, BrokerConfig};
use lockstep_core::Environment;
use lockstep_federate::{Federate, FederateConfig, FederateError, PubHandle, SubHandle};
use lockstep_proto::{SimTime, ValueType};

/// Virtual-clock environment for tests.
///
/// Delegates to tokio's clock, which the test runtime pauses and
/// auto-advances; identical code runs against [`SystemEnv`] in production.
///
/// [`SystemEnv`]: lockstep_broker::SystemEnv
#[derive(Debug, Clone, Copy, Default)]
pub struct SimEnv;

impl SimEnv {
    /// Create a new simulation environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SimEnv {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Shorthand for [`SimTime::from_seconds`].
pub fn secs(seconds: f64) -> SimTime {
    SimTime::from_seconds(seconds)
}

/// Deterministic RNG for interleaving tests; the seed names the schedule.
pub fn seeded_rng(seed: u64) -> rand_chacha::ChaCha8Rng {
    use rand::SeedableRng;
    rand_chacha::ChaCha8Rng::seed_from_u64(seed)
}

/// A broker on the virtual clock, expecting `federates` participants.
pub fn sim_broker(federates: usize) -> Broker<SimEnv> {
    Broker::with_env(BrokerConfig::with_federates(federates), SimEnv::new())
}

/// The canonical two-federate fixture: `sender` publishing `data`,
/// `receiver` subscribing to it, both taken through the executing barrier.
pub struct ValuePair {
    /// The federation's broker.
    pub broker: Broker<SimEnv>,
    /// Publishing federate.
    pub sender: Federate<SimEnv>,
    /// Subscribing federate.
    pub receiver: Federate<SimEnv>,
    /// The sender's publication handle.
    pub output: PubHandle,
    /// The receiver's subscription handle.
    pub input: SubHandle,
}

impl ValuePair {
    /// Build the fixture with the given receiver input delay.
    ///
    /// # Errors
    ///
    /// Propagates any lifecycle error, which in a correct fixture is a test
    /// bug.
    pub async fn start(input_delay: SimTime) -> Result<Self, FederateError> {
        Self::start_with_periods(input_delay, SimTime::ZERO).await
    }

    /// Build the fixture with an input delay and a shared grant period.
    ///
    /// # Errors
    ///
    /// Propagates any lifecycle error.
    pub async fn start_with_periods(
        input_delay: SimTime,
        period: SimTime,
    ) -> Result<Self, FederateError> {
        let broker = sim_broker(2);

        let mut sender =
            Federate::create(FederateConfig::new("sender").with_period(period));
        let mut receiver = Federate::create(
            FederateConfig::new("receiver").with_period(period).with_input_delay(input_delay),
        );
        sender.connect(&broker).await?;
        receiver.connect(&broker).await?;

        let output = sender.register_publication("data", ValueType::Double).await?;
        let input = receiver.register_subscription("data").await?;

        sender.enter_initializing().await?;
        receiver.enter_initializing().await?;

        let (a, b) = tokio::join!(sender.enter_executing(), receiver.enter_executing());
        a?;
        b?;

        Ok(Self { broker, sender, receiver, output, input })
    }
}
