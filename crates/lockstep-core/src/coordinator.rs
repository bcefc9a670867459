//! Time coordinator.
//!
//! Decides when a federate may advance. The rule, applied per request:
//!
//! > A federate may be granted time T only once every other federate that
//! > publishes to one of its subscriptions has either requested a time >= T
//! > or disconnected.
//!
//! Each federate carries a *frontier* — the latest time it has ever
//! requested. Frontiers never move backwards, and a disconnected federate's
//! frontier becomes [`SimTime::NEVER`], so it can never block anyone again.
//! Because granting a request moves no frontier, a single evaluation pass
//! after each mutation reaches the fixpoint.
//!
//! The coordinator is pure: mutating operations return [`Grant`] values and
//! the runtime is responsible for waking whichever tasks they name.

use std::collections::{BTreeMap, BTreeSet};

use lockstep_proto::{FederateId, SimTime};

/// A grant the runtime must deliver: wake `federate`, its time is now `time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    /// Federate whose pending request is satisfied.
    pub federate: FederateId,
    /// The granted time.
    pub time: SimTime,
}

/// Errors from coordinator operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The federate was never registered with the coordinator.
    #[error("federate not under coordination: {0}")]
    Unregistered(FederateId),

    /// The federate has disconnected and can no longer request time.
    #[error("federate has disconnected: {0}")]
    Disconnected(FederateId),
}

/// Per-federate timing state.
#[derive(Debug, Clone)]
struct Timing {
    /// Last granted time; non-decreasing.
    granted: SimTime,
    /// Latest time ever requested; non-decreasing, NEVER once disconnected.
    frontier: SimTime,
    /// Outstanding unanswered request, already clamped and quantized.
    pending: Option<SimTime>,
    /// Grant quantum; zero disables quantization.
    period: SimTime,
    /// False once disconnected.
    active: bool,
}

/// Computes grant times from all federates' outstanding requests.
///
/// Keyed by `BTreeMap` so that evaluation order — and therefore the order of
/// emitted grants — is deterministic across runs.
#[derive(Debug, Clone, Default)]
pub struct Coordinator {
    feds: BTreeMap<FederateId, Timing>,
    /// For each federate, the set of federates publishing to it.
    upstream: BTreeMap<FederateId, BTreeSet<FederateId>>,
}

impl Coordinator {
    /// Create an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a federate under coordination with the given grant period.
    ///
    /// Registering an already-known federate is a no-op.
    pub fn register(&mut self, federate: FederateId, period: SimTime) {
        self.feds.entry(federate).or_insert(Timing {
            granted: SimTime::ZERO,
            frontier: SimTime::ZERO,
            pending: None,
            period,
            active: true,
        });
    }

    /// Record that `publisher` feeds one of `subscriber`'s subscriptions.
    ///
    /// A federate subscribing to its own publication is allowed and never
    /// self-blocks: its own frontier is raised before eligibility is checked.
    pub fn add_dependency(&mut self, subscriber: FederateId, publisher: FederateId) {
        self.upstream.entry(subscriber).or_default().insert(publisher);
    }

    /// Last granted time for a federate.
    pub fn granted(&self, federate: FederateId) -> Option<SimTime> {
        self.feds.get(&federate).map(|t| t.granted)
    }

    /// Current frontier of a federate (NEVER once disconnected).
    pub fn frontier(&self, federate: FederateId) -> Option<SimTime> {
        self.feds.get(&federate).map(|t| t.frontier)
    }

    /// Record a time request and return every grant it enables.
    ///
    /// The effective request is `max(target, granted)`, then quantized: with
    /// a non-zero period P the grant always advances by at least one quantum
    /// and lands on a multiple of P. The returned grants may include the
    /// requesting federate itself (possibly at a later time than `target`)
    /// and any downstream federates its raised frontier unblocks.
    ///
    /// # Errors
    ///
    /// Returns `CoordinatorError::Unregistered` for an unknown federate and
    /// `CoordinatorError::Disconnected` after disconnection.
    pub fn request(
        &mut self,
        federate: FederateId,
        target: SimTime,
    ) -> Result<Vec<Grant>, CoordinatorError> {
        let timing =
            self.feds.get_mut(&federate).ok_or(CoordinatorError::Unregistered(federate))?;
        if !timing.active {
            return Err(CoordinatorError::Disconnected(federate));
        }

        let mut effective = target.max(timing.granted);
        if timing.period > SimTime::ZERO {
            if effective <= timing.granted {
                effective = timing.granted.saturating_add(timing.period);
            }
            effective = effective.round_up_to(timing.period);
        }

        timing.pending = Some(effective);
        timing.frontier = timing.frontier.max(effective);
        tracing::trace!(%federate, requested = %target, %effective, "time requested");

        Ok(self.evaluate())
    }

    /// Remove a federate from time-granting consideration.
    ///
    /// Its frontier becomes infinite, so any federate whose pending request
    /// was blocked solely on it is granted by the returned actions.
    /// Disconnecting an unknown or already-disconnected federate is a no-op.
    pub fn disconnect(&mut self, federate: FederateId) -> Vec<Grant> {
        let Some(timing) = self.feds.get_mut(&federate) else {
            return Vec::new();
        };
        if !timing.active {
            return Vec::new();
        }
        timing.active = false;
        timing.pending = None;
        timing.frontier = SimTime::NEVER;
        tracing::debug!(%federate, "disconnected from time coordination");

        self.evaluate()
    }

    /// Grant every pending request whose upstream frontiers allow it.
    fn evaluate(&mut self) -> Vec<Grant> {
        let eligible: Vec<(FederateId, SimTime)> = self
            .feds
            .iter()
            .filter_map(|(&id, timing)| {
                let pending = timing.pending?;
                self.upstream_allows(id, pending).then_some((id, pending))
            })
            .collect();

        let mut grants = Vec::with_capacity(eligible.len());
        for (id, time) in eligible {
            if let Some(timing) = self.feds.get_mut(&id) {
                timing.granted = time;
                timing.pending = None;
                tracing::debug!(federate = %id, %time, "time granted");
                grants.push(Grant { federate: id, time });
            }
        }
        grants
    }

    /// Whether every publisher feeding `federate` has a frontier `>= time`.
    fn upstream_allows(&self, federate: FederateId, time: SimTime) -> bool {
        self.upstream.get(&federate).is_none_or(|publishers| {
            publishers
                .iter()
                .all(|p| self.feds.get(p).is_none_or(|timing| timing.frontier >= time))
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const A: FederateId = FederateId(1);
    const B: FederateId = FederateId(2);
    const C: FederateId = FederateId(3);

    fn secs(s: f64) -> SimTime {
        SimTime::from_seconds(s)
    }

    /// Coordinator with A publishing to B (B depends on A), no periods.
    fn pair() -> Coordinator {
        let mut coord = Coordinator::new();
        coord.register(A, SimTime::ZERO);
        coord.register(B, SimTime::ZERO);
        coord.add_dependency(B, A);
        coord
    }

    #[test]
    fn independent_federate_is_granted_immediately() {
        let mut coord = pair();
        let grants = coord.request(A, secs(1.0)).expect("request failed");
        assert_eq!(grants, vec![Grant { federate: A, time: secs(1.0) }]);
    }

    #[test]
    fn dependent_federate_waits_for_upstream_frontier() {
        let mut coord = pair();
        assert!(coord.request(B, secs(1.0)).expect("request failed").is_empty());

        // A's request raises its frontier to 1.0, unblocking B.
        let grants = coord.request(A, secs(1.0)).expect("request failed");
        assert_eq!(
            grants,
            vec![Grant { federate: A, time: secs(1.0) }, Grant { federate: B, time: secs(1.0) }]
        );
    }

    #[test]
    fn upstream_frontier_beyond_target_grants_immediately() {
        let mut coord = pair();
        coord.request(A, secs(5.0)).expect("request failed");
        let grants = coord.request(B, secs(2.0)).expect("request failed");
        assert_eq!(grants, vec![Grant { federate: B, time: secs(2.0) }]);
    }

    #[test]
    fn disconnect_unblocks_dependents() {
        let mut coord = pair();
        assert!(coord.request(B, secs(3.0)).expect("request failed").is_empty());

        let grants = coord.disconnect(A);
        assert_eq!(grants, vec![Grant { federate: B, time: secs(3.0) }]);
    }

    #[test]
    fn disconnect_twice_is_a_no_op() {
        let mut coord = pair();
        coord.disconnect(A);
        assert!(coord.disconnect(A).is_empty());
    }

    #[test]
    fn request_after_disconnect_is_an_error() {
        let mut coord = pair();
        coord.disconnect(A);
        assert_eq!(coord.request(A, secs(1.0)), Err(CoordinatorError::Disconnected(A)));
    }

    #[test]
    fn mutually_dependent_federates_meet_at_the_same_time() {
        let mut coord = pair();
        coord.add_dependency(A, B);

        assert!(coord.request(A, secs(10.0)).expect("request failed").is_empty());
        let grants = coord.request(B, secs(10.0)).expect("request failed");
        assert_eq!(
            grants,
            vec![Grant { federate: A, time: secs(10.0) }, Grant { federate: B, time: secs(10.0) }]
        );
    }

    #[test]
    fn self_subscription_never_blocks() {
        let mut coord = Coordinator::new();
        coord.register(A, SimTime::ZERO);
        coord.add_dependency(A, A);

        let grants = coord.request(A, secs(1.0)).expect("request failed");
        assert_eq!(grants, vec![Grant { federate: A, time: secs(1.0) }]);
    }

    #[test]
    fn requests_below_granted_clamp_to_granted() {
        let mut coord = pair();
        coord.request(A, secs(4.0)).expect("request failed");
        let grants = coord.request(A, secs(1.0)).expect("request failed");
        assert_eq!(grants, vec![Grant { federate: A, time: secs(4.0) }]);
    }

    #[test]
    fn period_quantizes_grants_upward() {
        let mut coord = Coordinator::new();
        coord.register(A, secs(0.01));

        // Requesting the current time still advances by one quantum.
        let grants = coord.request(A, SimTime::ZERO).expect("request failed");
        assert_eq!(grants, vec![Grant { federate: A, time: secs(0.01) }]);

        // Requests between multiples round up.
        let grants = coord.request(A, secs(0.015)).expect("request failed");
        assert_eq!(grants, vec![Grant { federate: A, time: secs(0.02) }]);
    }

    #[test]
    fn chain_grants_cascade_along_frontiers() {
        // A -> B -> C. Requesting raises the requester's frontier before
        // evaluation, so B's request already satisfies C, and A's request
        // releases both remaining federates.
        let mut coord = Coordinator::new();
        for id in [A, B, C] {
            coord.register(id, SimTime::ZERO);
        }
        coord.add_dependency(B, A);
        coord.add_dependency(C, B);

        assert!(coord.request(C, secs(1.0)).expect("request failed").is_empty());

        let grants = coord.request(B, secs(1.0)).expect("request failed");
        assert_eq!(grants, vec![Grant { federate: C, time: secs(1.0) }]);

        let grants = coord.request(A, secs(1.0)).expect("request failed");
        assert_eq!(
            grants,
            vec![Grant { federate: A, time: secs(1.0) }, Grant { federate: B, time: secs(1.0) }]
        );
    }

    proptest! {
        /// Granted times are non-decreasing for every federate, over any
        /// request sequence on a randomly wired three-federate federation.
        #[test]
        fn grants_are_monotonic(
            edges in proptest::collection::vec((0u64..3, 0u64..3), 0..6),
            requests in proptest::collection::vec((0u64..3, 0i64..2_000_000_000), 1..64),
        ) {
            let mut coord = Coordinator::new();
            for raw in 0..3u64 {
                coord.register(FederateId(raw), SimTime::ZERO);
            }
            for (sub, publisher) in edges {
                coord.add_dependency(FederateId(sub), FederateId(publisher));
            }

            let mut last_granted: std::collections::HashMap<FederateId, SimTime> =
                std::collections::HashMap::new();
            for (raw, nanos) in requests {
                let id = FederateId(raw);
                let grants = coord.request(id, SimTime::from_nanos(nanos))
                    .expect("active federate request failed");
                for grant in grants {
                    let prev = last_granted.entry(grant.federate).or_insert(SimTime::ZERO);
                    prop_assert!(grant.time >= *prev,
                        "grant for {} went backwards: {} < {}", grant.federate, grant.time, prev);
                    *prev = grant.time;
                }
            }
        }
    }
}
