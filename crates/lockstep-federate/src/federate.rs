//! Federate handle.
//!
//! Owns one participant's view of the federation: its configuration, its
//! lifecycle phase, and — once connected — its identity at the broker. All
//! coordination happens broker-side; this type enforces the client-visible
//! lifecycle (a handle that never connected, or already finalized, fails
//! locally with a precise error instead of a broker round trip).

use std::time::Duration;

use lockstep_broker::Broker;
use lockstep_core::Environment;
use lockstep_proto::{FederateId, Phase, PublicationId, SimTime, SubscriptionId, ValueType};

use crate::{config::FederateConfig, error::FederateError};

/// Handle to a publication this federate owns.
#[derive(Debug, Clone)]
pub struct PubHandle {
    id: PublicationId,
    name: String,
}

impl PubHandle {
    /// Broker-assigned id.
    pub fn id(&self) -> PublicationId {
        self.id
    }

    /// Federation-unique publication name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Handle to a subscription this federate owns.
#[derive(Debug, Clone)]
pub struct SubHandle {
    id: SubscriptionId,
    target: String,
}

impl SubHandle {
    /// Broker-assigned id.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the publication this subscription references.
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Connection to a broker, established by [`Federate::connect`].
struct Link<E: Environment> {
    broker: Broker<E>,
    id: FederateId,
}

/// An independent simulation participant.
///
/// Created detached, connected to a broker once, then driven through the
/// lifecycle: declare interfaces, enter initializing, enter executing, loop
/// on `request_time`/`publish`/`value`, finalize.
pub struct Federate<E: Environment> {
    config: FederateConfig,
    phase: Phase,
    granted: SimTime,
    link: Option<Link<E>>,
}

impl<E: Environment> Federate<E> {
    /// Create a detached federate from its configuration.
    pub fn create(config: FederateConfig) -> Self {
        Self { config, phase: Phase::Created, granted: SimTime::ZERO, link: None }
    }

    /// Federate name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Broker-assigned id, once connected.
    pub fn id(&self) -> Option<FederateId> {
        self.link.as_ref().map(|l| l.id)
    }

    /// Last granted time (zero before the first grant).
    pub fn granted_time(&self) -> SimTime {
        self.granted
    }

    /// Register with a broker, moving from created to registered.
    ///
    /// # Errors
    ///
    /// `AlreadyConnected` on a second call; broker errors for a closed or
    /// full federation or a duplicate name.
    pub async fn connect(&mut self, broker: &Broker<E>) -> Result<(), FederateError> {
        if self.link.is_some() {
            return Err(FederateError::AlreadyConnected);
        }
        self.check_not_finalized()?;

        let id = broker
            .register_federate(&self.config.name, self.config.input_delay, self.config.period)
            .await?;
        self.link = Some(Link { broker: broker.clone(), id });
        self.phase = Phase::Registered;
        tracing::info!(name = %self.config.name, federate = %id, "connected to broker");
        Ok(())
    }

    /// Declare a publication (a named output this federate writes).
    ///
    /// # Errors
    ///
    /// Fails after leaving the initializing phase or for a duplicate name.
    pub async fn register_publication(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> Result<PubHandle, FederateError> {
        let link = self.link()?;
        let id = link.broker.register_publication(link.id, name, value_type).await?;
        Ok(PubHandle { id, name: name.to_owned() })
    }

    /// Declare a subscription referencing a publication by name.
    ///
    /// # Errors
    ///
    /// Fails after leaving the initializing phase.
    pub async fn register_subscription(&mut self, target: &str) -> Result<SubHandle, FederateError> {
        let link = self.link()?;
        let id = link.broker.register_subscription(link.id, target).await?;
        Ok(SubHandle { id, target: target.to_owned() })
    }

    /// Enter the initializing phase; declarations are finalized on leaving
    /// it.
    ///
    /// # Errors
    ///
    /// Fails unless the federate is in the registered phase.
    pub async fn enter_initializing(&mut self) -> Result<(), FederateError> {
        let link = self.link()?;
        link.broker.enter_initializing(link.id).await?;
        self.phase = Phase::Initializing;
        Ok(())
    }

    /// Enter the executing phase.
    ///
    /// Suspends until every registered federate has also entered.
    ///
    /// # Errors
    ///
    /// Fails unless the federate is initializing; in strict-references mode
    /// the barrier fails on subscription targets that never resolved.
    pub async fn enter_executing(&mut self) -> Result<(), FederateError> {
        let link = self.link()?;
        link.broker.enter_executing(link.id).await?;
        self.phase = Phase::Executing;
        tracing::info!(name = %self.config.name, "entered executing mode");
        Ok(())
    }

    /// Request an advance to `target`; suspends until granted.
    ///
    /// Returns the granted time, which can exceed `target` when a period is
    /// configured and never goes backwards.
    ///
    /// # Errors
    ///
    /// Fails unless the federate is executing.
    pub async fn request_time(&mut self, target: SimTime) -> Result<SimTime, FederateError> {
        self.request_time_inner(target, None).await
    }

    /// [`Federate::request_time`] with a bound on the wait.
    ///
    /// # Errors
    ///
    /// `BrokerError::GrantTimeout` (retryable) if the rule is not satisfied
    /// within `timeout`.
    pub async fn request_time_with_timeout(
        &mut self,
        target: SimTime,
        timeout: Duration,
    ) -> Result<SimTime, FederateError> {
        self.request_time_inner(target, Some(timeout)).await
    }

    async fn request_time_inner(
        &mut self,
        target: SimTime,
        timeout: Option<Duration>,
    ) -> Result<SimTime, FederateError> {
        let link = self.link()?;
        let granted = link.broker.request_time(link.id, target, timeout).await?;
        self.granted = granted;
        tracing::debug!(name = %self.config.name, %granted, "time granted");
        Ok(granted)
    }

    /// Publish `value` on one of this federate's publications, at the
    /// current granted time.
    ///
    /// # Errors
    ///
    /// Fails unless the federate is executing and owns the handle.
    pub async fn publish(&mut self, handle: &PubHandle, value: f64) -> Result<(), FederateError> {
        let link = self.link()?;
        link.broker.publish(link.id, handle.id, value).await?;
        Ok(())
    }

    /// Whether the subscription received a value this federate has not read
    /// yet.
    ///
    /// # Errors
    ///
    /// Fails unless the federate is executing and owns the handle.
    pub async fn is_updated(&self, handle: &SubHandle) -> Result<bool, FederateError> {
        let link = self.link()?;
        Ok(link.broker.is_updated(link.id, handle.id).await?)
    }

    /// Read the subscription's value and clear its updated flag.
    ///
    /// Reading a stale subscription silently returns the previous value
    /// (zero before the first delivery).
    ///
    /// # Errors
    ///
    /// Fails unless the federate is executing and owns the handle.
    pub async fn value(&self, handle: &SubHandle) -> Result<f64, FederateError> {
        let link = self.link()?;
        Ok(link.broker.read_value(link.id, handle.id).await?)
    }

    /// Finalize: terminal and idempotent.
    ///
    /// Releases this federate's broker-side participation; any federate
    /// blocked solely on this one is unblocked.
    ///
    /// # Errors
    ///
    /// Never fails on repeated calls; broker errors only for runtime
    /// failures.
    pub async fn finalize(&mut self) -> Result<(), FederateError> {
        if self.phase == Phase::Finalized {
            return Ok(());
        }
        if let Some(link) = &self.link {
            link.broker.finalize(link.id).await?;
        }
        self.phase = Phase::Finalized;
        tracing::info!(name = %self.config.name, "federate finalized");
        Ok(())
    }

    fn link(&self) -> Result<&Link<E>, FederateError> {
        self.check_not_finalized()?;
        self.link.as_ref().ok_or(FederateError::NotConnected)
    }

    fn check_not_finalized(&self) -> Result<(), FederateError> {
        if self.phase == Phase::Finalized {
            return Err(FederateError::Finalized);
        }
        Ok(())
    }
}

impl<E: Environment> std::fmt::Debug for Federate<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federate")
            .field("name", &self.config.name)
            .field("phase", &self.phase)
            .field("granted", &self.granted)
            .field("connected", &self.link.is_some())
            .finish()
    }
}
