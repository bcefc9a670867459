//! Broker runtime.
//!
//! Wraps the pure [`Federation`] state machine with the one piece of real
//! concurrency in the system: a single async mutex serializing every
//! mutation, and per-federate oneshot channels on which callers park while
//! the grant rule or the executing barrier holds them back.
//!
//! Every `FederationAction` produced under the lock is executed before the
//! lock is released, so a waking federate always observes the state that
//! justified its wake-up.

use std::{collections::HashMap, sync::Arc, time::Duration};

use lockstep_core::{Environment, Federation, FederationAction};
use lockstep_proto::{
    CoreKind, FederateId, LogLevel, PublicationId, SimTime, SubscriptionId, ValueType,
};
use tokio::sync::{Mutex, oneshot, watch};

use crate::{SystemEnv, error::BrokerError};

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Transport selection; only the in-process core exists.
    pub core: CoreKind,
    /// Number of federates that must register before the federation is
    /// complete.
    pub expected_federates: usize,
    /// Verbosity the broker was asked for (carried for operators; the
    /// subscriber installation is the binary's job).
    pub log_level: LogLevel,
    /// Fail the executing barrier on subscription targets that never
    /// resolved, instead of leaving them silently inert.
    pub strict_references: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            core: CoreKind::InProcess,
            expected_federates: 1,
            log_level: LogLevel::Info,
            strict_references: false,
        }
    }
}

impl BrokerConfig {
    /// Config for a federation of `expected_federates` on the in-process
    /// core.
    pub fn with_federates(expected_federates: usize) -> Self {
        Self { expected_federates, ..Self::default() }
    }
}

/// Observable lifecycle of the federation, published on a watch channel so
/// that startup and shutdown waits need no polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Lifecycle {
    registered: usize,
    terminated: bool,
}

/// State behind the broker lock.
struct State {
    federation: Federation,
    /// Parked `request_time` callers, by federate.
    grant_waiters: HashMap<FederateId, oneshot::Sender<SimTime>>,
    /// Parked `enter_executing` callers, by federate.
    barrier_waiters: HashMap<FederateId, oneshot::Sender<()>>,
}

struct Shared<E> {
    env: E,
    config: BrokerConfig,
    state: Mutex<State>,
    lifecycle: watch::Sender<Lifecycle>,
}

/// The rendezvous object of a federation.
///
/// Cheap to clone; all clones observe the same federation. The broker owns
/// no values of its own beyond the federation table — it routes and
/// synchronizes.
pub struct Broker<E: Environment = SystemEnv> {
    shared: Arc<Shared<E>>,
}

impl<E: Environment> Clone for Broker<E> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl Broker {
    /// Create a broker on the production environment.
    pub fn create(config: BrokerConfig) -> Self {
        Self::with_env(config, SystemEnv::new())
    }
}

impl<E: Environment> Broker<E> {
    /// Create a broker on a caller-supplied environment.
    pub fn with_env(config: BrokerConfig, env: E) -> Self {
        let federation =
            Federation::new(config.expected_federates, config.strict_references);
        let (lifecycle, _) = watch::channel(Lifecycle::default());
        tracing::info!(
            core = %config.core,
            expected = config.expected_federates,
            "broker created"
        );
        Self {
            shared: Arc::new(Shared {
                env,
                config,
                state: Mutex::new(State {
                    federation,
                    grant_waiters: HashMap::new(),
                    barrier_waiters: HashMap::new(),
                }),
                lifecycle,
            }),
        }
    }

    /// Broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.shared.config
    }

    /// Whether the broker is still serving its federation.
    ///
    /// True from creation until a complete federation has fully finalized.
    pub fn is_connected(&self) -> bool {
        !self.shared.lifecycle.borrow().terminated
    }

    /// Wait until the declared number of federates has registered.
    ///
    /// # Errors
    ///
    /// `BrokerError::Startup` if the count is not reached within `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<(), BrokerError> {
        let expected = self.shared.config.expected_federates;
        let mut rx = self.shared.lifecycle.subscribe();
        tokio::select! {
            result = rx.wait_for(|l| l.registered >= expected) => {
                result.map(|_| ()).map_err(|_| BrokerError::Closed)
            },
            () = self.shared.env.sleep(timeout) => {
                let connected = self.shared.lifecycle.borrow().registered;
                tracing::warn!(expected, connected, "broker startup wait expired");
                Err(BrokerError::Startup { expected, connected })
            },
        }
    }

    /// Wait until every federate of a complete federation has finalized.
    ///
    /// The suspension-based replacement for polling `is_connected` in a
    /// sleep loop.
    pub async fn wait_closed(&self) {
        let mut rx = self.shared.lifecycle.subscribe();
        // Closed channel means the broker is gone, which is also "closed".
        let _ = rx.wait_for(|l| l.terminated).await;
    }

    /// Register a federate under `name`.
    ///
    /// # Errors
    ///
    /// See [`Federation::register_federate`].
    pub async fn register_federate(
        &self,
        name: &str,
        input_delay: SimTime,
        period: SimTime,
    ) -> Result<FederateId, BrokerError> {
        let mut state = self.shared.state.lock().await;
        let id = state.federation.register_federate(name, input_delay, period)?;
        self.publish_lifecycle(&state.federation);
        Ok(id)
    }

    /// Declare a publication owned by `federate`.
    ///
    /// # Errors
    ///
    /// See [`Federation::register_publication`].
    pub async fn register_publication(
        &self,
        federate: FederateId,
        name: &str,
        value_type: ValueType,
    ) -> Result<PublicationId, BrokerError> {
        let mut state = self.shared.state.lock().await;
        Ok(state.federation.register_publication(federate, name, value_type)?)
    }

    /// Declare a subscription owned by `federate`.
    ///
    /// # Errors
    ///
    /// See [`Federation::register_subscription`].
    pub async fn register_subscription(
        &self,
        federate: FederateId,
        target: &str,
    ) -> Result<SubscriptionId, BrokerError> {
        let mut state = self.shared.state.lock().await;
        Ok(state.federation.register_subscription(federate, target)?)
    }

    /// Move `federate` into the initializing phase.
    ///
    /// # Errors
    ///
    /// See [`Federation::enter_initializing`].
    pub async fn enter_initializing(&self, federate: FederateId) -> Result<(), BrokerError> {
        let mut state = self.shared.state.lock().await;
        Ok(state.federation.enter_initializing(federate)?)
    }

    /// Enter executing mode; suspends until every registered federate has
    /// also entered.
    ///
    /// # Errors
    ///
    /// See [`Federation::enter_executing`]; `BrokerError::Closed` if the
    /// broker is dropped while parked.
    pub async fn enter_executing(&self, federate: FederateId) -> Result<(), BrokerError> {
        let rx = {
            let mut state = self.shared.state.lock().await;
            let actions = state.federation.enter_executing(federate)?;
            if Self::execute(&mut state, federate, &actions).released {
                return Ok(());
            }
            let (tx, rx) = oneshot::channel();
            state.barrier_waiters.insert(federate, tx);
            rx
        };
        rx.await.map_err(|_| BrokerError::Closed)
    }

    /// Request a time advance; suspends until the grant rule is satisfied.
    ///
    /// This is the sole blocking point of the protocol. With `timeout` set,
    /// an unsatisfied wait fails with `BrokerError::GrantTimeout`; the
    /// request itself stays recorded and a retry re-parks the caller.
    ///
    /// # Errors
    ///
    /// See [`Federation::request_time`], plus `GrantTimeout` and `Closed`.
    pub async fn request_time(
        &self,
        federate: FederateId,
        target: SimTime,
        timeout: Option<Duration>,
    ) -> Result<SimTime, BrokerError> {
        let mut rx = {
            let mut state = self.shared.state.lock().await;
            let actions = state.federation.request_time(federate, target)?;
            if let Some(time) = Self::execute(&mut state, federate, &actions).granted {
                return Ok(time);
            }
            let (tx, rx) = oneshot::channel();
            state.grant_waiters.insert(federate, tx);
            rx
        };

        match timeout {
            None => rx.await.map_err(|_| BrokerError::Closed),
            Some(bound) => {
                tokio::select! {
                    result = &mut rx => result.map_err(|_| BrokerError::Closed),
                    () = self.shared.env.sleep(bound) => {
                        let mut state = self.shared.state.lock().await;
                        state.grant_waiters.remove(&federate);
                        drop(state);
                        // The grant may have landed between the sleep firing
                        // and the lock being re-acquired.
                        rx.try_recv().map_err(|_| BrokerError::GrantTimeout {
                            federate,
                            requested: target,
                        })
                    },
                }
            },
        }
    }

    /// Store a value published by `federate` at its current granted time.
    ///
    /// # Errors
    ///
    /// See [`Federation::publish`].
    pub async fn publish(
        &self,
        federate: FederateId,
        publication: PublicationId,
        value: f64,
    ) -> Result<(), BrokerError> {
        let mut state = self.shared.state.lock().await;
        Ok(state.federation.publish(federate, publication, value)?)
    }

    /// Whether the subscription has an unread delivered value.
    ///
    /// # Errors
    ///
    /// See [`Federation::is_updated`].
    pub async fn is_updated(
        &self,
        federate: FederateId,
        subscription: SubscriptionId,
    ) -> Result<bool, BrokerError> {
        let state = self.shared.state.lock().await;
        Ok(state.federation.is_updated(federate, subscription)?)
    }

    /// Read the subscription's value, clearing its updated flag.
    ///
    /// # Errors
    ///
    /// See [`Federation::read`].
    pub async fn read_value(
        &self,
        federate: FederateId,
        subscription: SubscriptionId,
    ) -> Result<f64, BrokerError> {
        let mut state = self.shared.state.lock().await;
        Ok(state.federation.read(federate, subscription)?)
    }

    /// Finalize `federate`; idempotent.
    ///
    /// Unblocks every federate whose pending grant or barrier entry depended
    /// solely on the finalized one.
    ///
    /// # Errors
    ///
    /// See [`Federation::finalize`].
    pub async fn finalize(&self, federate: FederateId) -> Result<(), BrokerError> {
        let mut state = self.shared.state.lock().await;
        let actions = state.federation.finalize(federate)?;
        Self::execute(&mut state, federate, &actions);
        // A finalized federate can have nothing parked.
        state.grant_waiters.remove(&federate);
        state.barrier_waiters.remove(&federate);
        self.publish_lifecycle(&state.federation);
        Ok(())
    }

    /// Last granted time of a federate.
    pub async fn granted_time(&self, federate: FederateId) -> Option<SimTime> {
        let state = self.shared.state.lock().await;
        state.federation.granted_time(federate)
    }

    /// Execute federation actions under the lock: wake every named waiter,
    /// and report what applied to `myself`.
    fn execute(state: &mut State, myself: FederateId, actions: &[FederationAction]) -> SelfOutcome {
        let mut outcome = SelfOutcome::default();
        for action in actions {
            match *action {
                FederationAction::Grant { federate, time } => {
                    if federate == myself {
                        outcome.granted = Some(time);
                    } else if let Some(tx) = state.grant_waiters.remove(&federate) {
                        let _ = tx.send(time);
                    } else {
                        // Timed-out waiter: the grant is recorded in the
                        // federation, the federate will pick it up on retry.
                        tracing::debug!(%federate, %time, "grant with no parked waiter");
                    }
                },
                FederationAction::ReleaseExecuting { federate } => {
                    if federate == myself {
                        outcome.released = true;
                    } else if let Some(tx) = state.barrier_waiters.remove(&federate) {
                        let _ = tx.send(());
                    }
                },
            }
        }
        outcome
    }

    fn publish_lifecycle(&self, federation: &Federation) {
        let snapshot = Lifecycle {
            registered: federation.registered_count(),
            terminated: federation.is_terminated(),
        };
        self.shared.lifecycle.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// What a batch of actions did for the federate that triggered it.
#[derive(Debug, Default, Clone, Copy)]
struct SelfOutcome {
    granted: Option<SimTime>,
    released: bool,
}

impl<E: Environment> std::fmt::Debug for Broker<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lifecycle = *self.shared.lifecycle.borrow();
        f.debug_struct("Broker")
            .field("expected", &self.shared.config.expected_federates)
            .field("registered", &lifecycle.registered)
            .field("terminated", &lifecycle.terminated)
            .finish()
    }
}
