//! Federation state machine.
//!
//! Orchestrates the registry, lifecycle phases, time coordination, and value
//! delivery for one federation.
//!
//! ## Responsibilities
//!
//! - Registration: admit federates until the executing barrier releases
//! - Declarations: publications and subscriptions, frozen after initializing
//! - Barrier: executing entry blocks until every registered federate arrives
//! - Time: delegate to the [`Coordinator`], deliver due values on each grant
//!
//! ## Design
//!
//! Action-based: mutating operations return [`FederationAction`] values and
//! perform no I/O. The broker runtime executes the actions by waking parked
//! federate tasks. Everything here is single-threaded state behind the
//! broker's lock.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lockstep_proto::{FederateId, Phase, PublicationId, SimTime, SubscriptionId, ValueType};

use crate::{
    coordinator::Coordinator,
    error::FederationError,
    store::ValueStore,
};

/// Actions returned by the federation for the runtime to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FederationAction {
    /// Wake `federate`: its pending time request is granted at `time`.
    /// Due values have already been delivered to its subscriptions.
    Grant {
        /// Federate to wake.
        federate: FederateId,
        /// The granted time.
        time: SimTime,
    },

    /// Wake `federate`: the executing barrier has released and it is now in
    /// the executing phase.
    ReleaseExecuting {
        /// Federate to wake.
        federate: FederateId,
    },
}

/// Per-federate registry entry.
#[derive(Debug, Clone)]
struct FederateEntry {
    name: String,
    phase: Phase,
    input_delay: SimTime,
}

/// The whole collection: registry, coordinator, and value store for one
/// federation.
#[derive(Debug, Clone)]
pub struct Federation {
    /// Declared federation size; gates startup and the executing barrier.
    expected: usize,
    /// Reject unresolved subscription targets at the barrier.
    strict_references: bool,
    feds: BTreeMap<FederateId, FederateEntry>,
    names: HashMap<String, FederateId>,
    publications: HashMap<String, PublicationId>,
    /// Subscription targets not yet matched by a publication, by target name.
    unresolved: HashMap<String, Vec<SubscriptionId>>,
    /// Federates that called `enter_executing` and are parked at the barrier.
    at_barrier: BTreeSet<FederateId>,
    barrier_released: bool,
    total_registered: usize,
    next_federate: u64,
    next_publication: u64,
    next_subscription: u64,
    coordinator: Coordinator,
    store: ValueStore,
}

impl Federation {
    /// Create a federation expecting `expected` federates.
    pub fn new(expected: usize, strict_references: bool) -> Self {
        Self {
            expected,
            strict_references,
            feds: BTreeMap::new(),
            names: HashMap::new(),
            publications: HashMap::new(),
            unresolved: HashMap::new(),
            at_barrier: BTreeSet::new(),
            barrier_released: false,
            total_registered: 0,
            next_federate: 0,
            next_publication: 0,
            next_subscription: 0,
            coordinator: Coordinator::new(),
            store: ValueStore::new(),
        }
    }

    /// Declared federation size.
    pub fn expected_federates(&self) -> usize {
        self.expected
    }

    /// Number of federates that have registered (including finalized ones).
    pub fn registered_count(&self) -> usize {
        self.total_registered
    }

    /// Whether the declared number of federates has registered.
    pub fn is_complete(&self) -> bool {
        self.total_registered >= self.expected
    }

    /// Whether the federation has run to completion: it filled up and every
    /// registered federate has finalized.
    pub fn is_terminated(&self) -> bool {
        self.total_registered >= self.expected.max(1)
            && self.feds.values().all(|f| f.phase == Phase::Finalized)
    }

    /// Current phase of a federate.
    pub fn phase(&self, federate: FederateId) -> Option<Phase> {
        self.feds.get(&federate).map(|f| f.phase)
    }

    /// Last granted time of a federate.
    pub fn granted_time(&self, federate: FederateId) -> Option<SimTime> {
        self.coordinator.granted(federate)
    }

    /// Register a federate; it enters the federation in the registered
    /// phase.
    ///
    /// # Errors
    ///
    /// `RegistrationClosed` once the executing barrier has released,
    /// `DuplicateFederate` for a reused name.
    pub fn register_federate(
        &mut self,
        name: &str,
        input_delay: SimTime,
        period: SimTime,
    ) -> Result<FederateId, FederationError> {
        if self.barrier_released {
            return Err(FederationError::RegistrationClosed);
        }
        if self.names.contains_key(name) {
            return Err(FederationError::DuplicateFederate(name.to_owned()));
        }

        let id = FederateId(self.next_federate);
        self.next_federate += 1;
        self.total_registered += 1;

        self.names.insert(name.to_owned(), id);
        self.feds.insert(
            id,
            FederateEntry { name: name.to_owned(), phase: Phase::Registered, input_delay },
        );
        self.coordinator.register(id, period);

        tracing::info!(federate = %id, name, %input_delay, "federate registered");
        Ok(id)
    }

    /// Declare a publication owned by `federate`.
    ///
    /// Resolves any subscriptions already waiting on this name: routes are
    /// wired and the subscribers start depending on `federate` for time
    /// grants.
    ///
    /// # Errors
    ///
    /// `LateRegistration` outside the registered/initializing phases,
    /// `DuplicatePublication` for a reused name.
    pub fn register_publication(
        &mut self,
        federate: FederateId,
        name: &str,
        value_type: ValueType,
    ) -> Result<PublicationId, FederationError> {
        self.check_declaration_phase(federate)?;
        if self.publications.contains_key(name) {
            return Err(FederationError::DuplicatePublication(name.to_owned()));
        }

        let id = PublicationId(self.next_publication);
        self.next_publication += 1;
        self.publications.insert(name.to_owned(), id);
        self.store.add_publication(id, federate, value_type);

        if let Some(waiting) = self.unresolved.remove(name) {
            for subscription in waiting {
                self.wire(id, subscription, federate)?;
            }
        }

        tracing::info!(%federate, publication = %id, name, "publication registered");
        Ok(id)
    }

    /// Declare a subscription owned by `federate`, referencing a publication
    /// by name.
    ///
    /// An unmatched target is not an error here: the publication may be
    /// declared later in the initializing phase, and a target that never
    /// resolves leaves the subscription silently inert (strict mode turns
    /// that into a barrier-time error instead).
    ///
    /// # Errors
    ///
    /// `LateRegistration` outside the registered/initializing phases.
    pub fn register_subscription(
        &mut self,
        federate: FederateId,
        target: &str,
    ) -> Result<SubscriptionId, FederationError> {
        self.check_declaration_phase(federate)?;

        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.store.add_subscription(id, federate);

        if let Some(&publication) = self.publications.get(target) {
            let publisher = self
                .store
                .publication_owner(publication)
                .ok_or(FederationError::UnknownFederate(federate))?;
            self.wire(publication, id, publisher)?;
        } else {
            self.unresolved.entry(target.to_owned()).or_default().push(id);
        }

        tracing::info!(%federate, subscription = %id, target, "subscription registered");
        Ok(id)
    }

    /// Move a federate from registered to initializing.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless the federate is in the registered phase.
    pub fn enter_initializing(&mut self, federate: FederateId) -> Result<(), FederationError> {
        let entry = self.entry_mut(federate)?;
        if entry.phase != Phase::Registered {
            return Err(FederationError::InvalidPhase {
                operation: "enter_initializing",
                federate,
                expected: Phase::Registered,
                actual: entry.phase,
            });
        }
        entry.phase = Phase::Initializing;
        tracing::debug!(%federate, "entered initializing");
        Ok(())
    }

    /// Park a federate at the executing barrier.
    ///
    /// The barrier releases once the declared federate count has registered
    /// and every non-finalized federate is parked here; the returned actions
    /// then name every federate to wake. Until then the caller must park the
    /// federate and wait for a `ReleaseExecuting` action naming it.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless the federate is initializing;
    /// `UnresolvedReference` (strict mode) if the barrier would release with
    /// a subscription target no publication ever matched.
    pub fn enter_executing(
        &mut self,
        federate: FederateId,
    ) -> Result<Vec<FederationAction>, FederationError> {
        let entry = self.entry_mut(federate)?;
        if entry.phase != Phase::Initializing {
            return Err(FederationError::InvalidPhase {
                operation: "enter_executing",
                federate,
                expected: Phase::Initializing,
                actual: entry.phase,
            });
        }

        self.at_barrier.insert(federate);
        self.try_release_barrier()
    }

    /// Record a time request; grant whatever the rule now allows.
    ///
    /// Due values are delivered to each granted federate's subscriptions
    /// before its `Grant` action is emitted.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless the federate is executing.
    pub fn request_time(
        &mut self,
        federate: FederateId,
        target: SimTime,
    ) -> Result<Vec<FederationAction>, FederationError> {
        self.check_phase(federate, "request_time", Phase::Executing)?;
        let grants = self.coordinator.request(federate, target)?;
        Ok(self.apply_grants(grants))
    }

    /// Store a value published by `federate` at its current granted time.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless executing, `NotOwner` for a foreign handle.
    pub fn publish(
        &mut self,
        federate: FederateId,
        publication: PublicationId,
        value: f64,
    ) -> Result<(), FederationError> {
        self.check_phase(federate, "publish", Phase::Executing)?;
        if self.store.publication_owner(publication) != Some(federate) {
            return Err(FederationError::NotOwner {
                federate,
                handle: publication.to_string(),
            });
        }
        let at = self
            .coordinator
            .granted(federate)
            .ok_or(FederationError::UnknownFederate(federate))?;
        self.store.publish(publication, value, at)?;
        tracing::debug!(%federate, %publication, value, %at, "value published");
        Ok(())
    }

    /// Whether the subscription has an unread delivered value.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless executing, `NotOwner` for a foreign handle.
    pub fn is_updated(
        &self,
        federate: FederateId,
        subscription: SubscriptionId,
    ) -> Result<bool, FederationError> {
        self.check_phase(federate, "is_updated", Phase::Executing)?;
        self.check_subscription_owner(federate, subscription)?;
        Ok(self.store.is_updated(subscription)?)
    }

    /// Read the subscription's value, clearing its updated flag. Stale reads
    /// return the previous value unchanged.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless executing, `NotOwner` for a foreign handle.
    pub fn read(
        &mut self,
        federate: FederateId,
        subscription: SubscriptionId,
    ) -> Result<f64, FederationError> {
        self.check_phase(federate, "read", Phase::Executing)?;
        self.check_subscription_owner(federate, subscription)?;
        Ok(self.store.read(subscription)?)
    }

    /// Finalize a federate: terminal, idempotent.
    ///
    /// The federate leaves time-granting consideration, so the returned
    /// actions may grant other federates whose requests were pending solely
    /// on it, or release the executing barrier it was holding up.
    ///
    /// # Errors
    ///
    /// `UnknownFederate` for an id that never registered. Finalizing an
    /// already-finalized federate returns no actions and no error.
    pub fn finalize(
        &mut self,
        federate: FederateId,
    ) -> Result<Vec<FederationAction>, FederationError> {
        let entry = self.entry_mut(federate)?;
        if entry.phase == Phase::Finalized {
            return Ok(Vec::new());
        }
        entry.phase = Phase::Finalized;
        self.at_barrier.remove(&federate);
        tracing::info!(%federate, "federate finalized");

        let grants = self.coordinator.disconnect(federate);
        let mut actions = self.apply_grants(grants);
        if !self.barrier_released {
            actions.extend(self.try_release_barrier()?);
        }
        Ok(actions)
    }

    /// Wire a resolved publication/subscription pair: route values and make
    /// the subscriber's grants wait on the publisher.
    fn wire(
        &mut self,
        publication: PublicationId,
        subscription: SubscriptionId,
        publisher: FederateId,
    ) -> Result<(), FederationError> {
        let subscriber = self
            .store
            .subscription_owner(subscription)
            .ok_or(FederationError::UnknownFederate(publisher))?;
        let input_delay = self
            .feds
            .get(&subscriber)
            .map(|f| f.input_delay)
            .unwrap_or(SimTime::ZERO);
        self.store.connect(publication, subscription, input_delay)?;
        self.coordinator.add_dependency(subscriber, publisher);
        tracing::debug!(%publication, %subscription, %publisher, %subscriber, "route wired");
        Ok(())
    }

    /// Deliver due values for each grant, then map to actions.
    fn apply_grants(&mut self, grants: Vec<crate::coordinator::Grant>) -> Vec<FederationAction> {
        grants
            .into_iter()
            .map(|grant| {
                self.store.deliver_due(grant.federate, grant.time);
                FederationAction::Grant { federate: grant.federate, time: grant.time }
            })
            .collect()
    }

    /// Release the barrier if the federation is full and everyone still
    /// active is parked at it.
    fn try_release_barrier(&mut self) -> Result<Vec<FederationAction>, FederationError> {
        if self.barrier_released || !self.is_complete() {
            return Ok(Vec::new());
        }
        let all_parked = self
            .feds
            .iter()
            .all(|(id, entry)| entry.phase == Phase::Finalized || self.at_barrier.contains(id));
        if !all_parked || self.at_barrier.is_empty() {
            return Ok(Vec::new());
        }

        if self.strict_references {
            if let Some(target) = self.unresolved.keys().next() {
                return Err(FederationError::UnresolvedReference(target.clone()));
            }
        }

        self.barrier_released = true;
        let released: Vec<FederateId> = self.at_barrier.iter().copied().collect();
        for id in &released {
            if let Some(entry) = self.feds.get_mut(id) {
                entry.phase = Phase::Executing;
            }
        }
        self.at_barrier.clear();
        tracing::info!(federates = released.len(), "executing barrier released");

        Ok(released
            .into_iter()
            .map(|federate| FederationAction::ReleaseExecuting { federate })
            .collect())
    }

    /// Declarations are allowed only before the federate leaves
    /// initializing.
    fn check_declaration_phase(&self, federate: FederateId) -> Result<(), FederationError> {
        let entry =
            self.feds.get(&federate).ok_or(FederationError::UnknownFederate(federate))?;
        match entry.phase {
            Phase::Registered | Phase::Initializing => Ok(()),
            phase => Err(FederationError::LateRegistration { federate, phase }),
        }
    }

    fn check_phase(
        &self,
        federate: FederateId,
        operation: &'static str,
        expected: Phase,
    ) -> Result<(), FederationError> {
        let entry =
            self.feds.get(&federate).ok_or(FederationError::UnknownFederate(federate))?;
        if entry.phase == expected {
            Ok(())
        } else {
            Err(FederationError::InvalidPhase {
                operation,
                federate,
                expected,
                actual: entry.phase,
            })
        }
    }

    fn check_subscription_owner(
        &self,
        federate: FederateId,
        subscription: SubscriptionId,
    ) -> Result<(), FederationError> {
        match self.store.subscription_owner(subscription) {
            Some(owner) if owner == federate => Ok(()),
            _ => Err(FederationError::NotOwner { federate, handle: subscription.to_string() }),
        }
    }

    fn entry_mut(
        &mut self,
        federate: FederateId,
    ) -> Result<&mut FederateEntry, FederationError> {
        self.feds.get_mut(&federate).ok_or(FederationError::UnknownFederate(federate))
    }
}
