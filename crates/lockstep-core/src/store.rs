//! Value store.
//!
//! Per-subscription buffered slots. A publish schedules at most one pending
//! value per subscriber (last-write-wins, no history), tagged with the
//! simulated time at which it becomes visible: publish time plus the
//! subscriber's input delay. Pending values move into the readable slot when
//! the subscribing federate is granted a time at or past their visibility.
//!
//! Reads are deliberately permissive: `read` on a subscription whose flag is
//! clear returns the previously delivered value unchanged (`0.0` before the
//! first delivery), matching the polling pattern this store serves.

use std::collections::BTreeMap;

use lockstep_proto::{FederateId, PublicationId, SimTime, SubscriptionId, ValueType};

/// Errors from value-store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The publication id is not registered.
    #[error("unknown publication: {0}")]
    UnknownPublication(PublicationId),

    /// The subscription id is not registered.
    #[error("unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),
}

#[derive(Debug, Clone)]
struct Publication {
    owner: FederateId,
    value_type: ValueType,
    /// Subscribers, each with its input delay baked in at connect time.
    routes: Vec<(SubscriptionId, SimTime)>,
}

#[derive(Debug, Clone)]
struct Slot {
    owner: FederateId,
    /// Most recently delivered value; `0.0` before the first delivery.
    current: f64,
    /// Set on delivery, cleared by `read`.
    updated: bool,
    /// At most one scheduled-visible value: (visibility time, value).
    pending: Option<(SimTime, f64)>,
}

/// Buffered value slots for every subscription in the federation.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    publications: BTreeMap<PublicationId, Publication>,
    subscriptions: BTreeMap<SubscriptionId, Slot>,
}

impl ValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a publication slot.
    pub fn add_publication(
        &mut self,
        publication: PublicationId,
        owner: FederateId,
        value_type: ValueType,
    ) {
        self.publications
            .insert(publication, Publication { owner, value_type, routes: Vec::new() });
    }

    /// Register a subscription slot.
    pub fn add_subscription(&mut self, subscription: SubscriptionId, owner: FederateId) {
        self.subscriptions
            .insert(subscription, Slot { owner, current: 0.0, updated: false, pending: None });
    }

    /// Route a publication to a subscription with the given input delay.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownPublication` for an unregistered id.
    pub fn connect(
        &mut self,
        publication: PublicationId,
        subscription: SubscriptionId,
        input_delay: SimTime,
    ) -> Result<(), StoreError> {
        let entry = self
            .publications
            .get_mut(&publication)
            .ok_or(StoreError::UnknownPublication(publication))?;
        entry.routes.push((subscription, input_delay));
        Ok(())
    }

    /// Owner of a publication.
    pub fn publication_owner(&self, publication: PublicationId) -> Option<FederateId> {
        self.publications.get(&publication).map(|p| p.owner)
    }

    /// Declared value type of a publication.
    pub fn publication_type(&self, publication: PublicationId) -> Option<ValueType> {
        self.publications.get(&publication).map(|p| p.value_type)
    }

    /// Owner of a subscription.
    pub fn subscription_owner(&self, subscription: SubscriptionId) -> Option<FederateId> {
        self.subscriptions.get(&subscription).map(|s| s.owner)
    }

    /// Store `value` published at simulated time `at`.
    ///
    /// Every routed subscriber's pending slot is overwritten with the new
    /// value, visible at `at + input_delay`. Values already pending but not
    /// yet delivered are discarded: last write wins.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownPublication` for an unregistered id.
    pub fn publish(
        &mut self,
        publication: PublicationId,
        value: f64,
        at: SimTime,
    ) -> Result<(), StoreError> {
        let entry = self
            .publications
            .get(&publication)
            .ok_or(StoreError::UnknownPublication(publication))?;

        for &(subscription, input_delay) in &entry.routes {
            if let Some(slot) = self.subscriptions.get_mut(&subscription) {
                let visible_at = at.saturating_add(input_delay);
                tracing::trace!(%publication, %subscription, value, %visible_at, "value scheduled");
                slot.pending = Some((visible_at, value));
            }
        }
        Ok(())
    }

    /// Deliver pending values that are visible at `now` to every
    /// subscription owned by `federate`.
    ///
    /// Called by the federation when `federate` is granted time `now`.
    pub fn deliver_due(&mut self, federate: FederateId, now: SimTime) {
        for (id, slot) in &mut self.subscriptions {
            if slot.owner != federate {
                continue;
            }
            if let Some((visible_at, value)) = slot.pending {
                if visible_at <= now {
                    slot.current = value;
                    slot.updated = true;
                    slot.pending = None;
                    tracing::trace!(subscription = %id, value, %now, "value delivered");
                }
            }
        }
    }

    /// Whether a visible value has been delivered and not yet read.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownSubscription` for an unregistered id.
    pub fn is_updated(&self, subscription: SubscriptionId) -> Result<bool, StoreError> {
        self.subscriptions
            .get(&subscription)
            .map(|s| s.updated)
            .ok_or(StoreError::UnknownSubscription(subscription))
    }

    /// Read the subscription's value, clearing the updated flag.
    ///
    /// Reading a stale subscription is not an error: the previously
    /// delivered value comes back unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownSubscription` for an unregistered id.
    pub fn read(&mut self, subscription: SubscriptionId) -> Result<f64, StoreError> {
        let slot = self
            .subscriptions
            .get_mut(&subscription)
            .ok_or(StoreError::UnknownSubscription(subscription))?;
        slot.updated = false;
        Ok(slot.current)
    }
}
