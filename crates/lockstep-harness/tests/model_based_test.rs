//! Model-based test for the federation state machine.
//!
//! Random operation sequences run against the pure `Federation`; an oracle
//! checks global invariants after every step. Errors returned by individual
//! operations are legal rejections (wrong phase, unknown handle, closed
//! registration) — the invariants are about what the machine must never do
//! regardless:
//!
//! - granted times never decrease for any federate
//! - no grant ever names a finalized federate
//! - finalize is idempotent
//! - no operation panics

use std::collections::HashMap;

use lockstep_core::{Federation, FederationAction};
use lockstep_proto::{FederateId, Phase, PublicationId, SimTime, SubscriptionId, ValueType};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

/// One step of the random schedule. Indices are interpreted modulo the
/// handles that actually exist, so most generated steps hit live state.
#[derive(Debug, Clone)]
enum Op {
    Register { name: u8 },
    DeclarePublication { fed: u8, name: u8 },
    DeclareSubscription { fed: u8, name: u8 },
    EnterInitializing { fed: u8 },
    EnterExecuting { fed: u8 },
    RequestTime { fed: u8, nanos: i64 },
    Publish { fed: u8, publication: u8, value: i32 },
    Read { fed: u8, subscription: u8 },
    Finalize { fed: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..6).prop_map(|name| Op::Register { name }),
        (0u8..6, 0u8..4).prop_map(|(fed, name)| Op::DeclarePublication { fed, name }),
        (0u8..6, 0u8..4).prop_map(|(fed, name)| Op::DeclareSubscription { fed, name }),
        (0u8..6).prop_map(|fed| Op::EnterInitializing { fed }),
        (0u8..6).prop_map(|fed| Op::EnterExecuting { fed }),
        (0u8..6, 0i64..3_000_000_000).prop_map(|(fed, nanos)| Op::RequestTime { fed, nanos }),
        (0u8..6, 0u8..4, -100i32..100).prop_map(|(fed, publication, value)| Op::Publish {
            fed,
            publication,
            value
        }),
        (0u8..6, 0u8..4).prop_map(|(fed, subscription)| Op::Read { fed, subscription }),
        (0u8..6).prop_map(|fed| Op::Finalize { fed }),
    ]
}

/// Tracks what the oracle has observed so far.
#[derive(Debug, Default)]
struct Oracle {
    registered: Vec<FederateId>,
    publications: Vec<PublicationId>,
    subscriptions: Vec<SubscriptionId>,
    last_granted: HashMap<FederateId, SimTime>,
}

impl Oracle {
    fn pick_fed(&self, index: u8) -> Option<FederateId> {
        if self.registered.is_empty() {
            None
        } else {
            Some(self.registered[index as usize % self.registered.len()])
        }
    }

    fn pick_publication(&self, index: u8) -> Option<PublicationId> {
        if self.publications.is_empty() {
            None
        } else {
            Some(self.publications[index as usize % self.publications.len()])
        }
    }

    fn pick_subscription(&self, index: u8) -> Option<SubscriptionId> {
        if self.subscriptions.is_empty() {
            None
        } else {
            Some(self.subscriptions[index as usize % self.subscriptions.len()])
        }
    }

    fn check_actions(
        &mut self,
        federation: &Federation,
        actions: &[FederationAction],
    ) -> Result<(), TestCaseError> {
        for action in actions {
            match *action {
                FederationAction::Grant { federate, time } => {
                    prop_assert_ne!(
                        federation.phase(federate),
                        Some(Phase::Finalized),
                        "grant named a finalized federate"
                    );
                    let last = self.last_granted.entry(federate).or_insert(SimTime::ZERO);
                    prop_assert!(
                        time >= *last,
                        "grant for {} went backwards: {} < {}",
                        federate,
                        time,
                        *last
                    );
                    *last = time;
                },
                FederationAction::ReleaseExecuting { federate } => {
                    prop_assert_eq!(federation.phase(federate), Some(Phase::Executing));
                },
            }
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn random_schedules_never_violate_the_grant_invariants(
        ops in proptest::collection::vec(op_strategy(), 1..120),
    ) {
        let mut federation = Federation::new(2, false);
        let mut oracle = Oracle::default();

        for op in ops {
            match op {
                Op::Register { name } => {
                    if let Ok(id) = federation.register_federate(
                        &format!("fed-{name}"),
                        SimTime::from_nanos(i64::from(name) * 1_000_000),
                        SimTime::ZERO,
                    ) {
                        oracle.registered.push(id);
                    }
                },
                Op::DeclarePublication { fed, name } => {
                    if let Some(id) = oracle.pick_fed(fed) {
                        if let Ok(p) = federation.register_publication(
                            id,
                            &format!("topic-{name}"),
                            ValueType::Double,
                        ) {
                            oracle.publications.push(p);
                        }
                    }
                },
                Op::DeclareSubscription { fed, name } => {
                    if let Some(id) = oracle.pick_fed(fed) {
                        if let Ok(s) =
                            federation.register_subscription(id, &format!("topic-{name}"))
                        {
                            oracle.subscriptions.push(s);
                        }
                    }
                },
                Op::EnterInitializing { fed } => {
                    if let Some(id) = oracle.pick_fed(fed) {
                        let _ = federation.enter_initializing(id);
                    }
                },
                Op::EnterExecuting { fed } => {
                    if let Some(id) = oracle.pick_fed(fed) {
                        if let Ok(actions) = federation.enter_executing(id) {
                            oracle.check_actions(&federation, &actions)?;
                        }
                    }
                },
                Op::RequestTime { fed, nanos } => {
                    if let Some(id) = oracle.pick_fed(fed) {
                        if let Ok(actions) =
                            federation.request_time(id, SimTime::from_nanos(nanos))
                        {
                            oracle.check_actions(&federation, &actions)?;
                        }
                    }
                },
                Op::Publish { fed, publication, value } => {
                    if let (Some(id), Some(p)) =
                        (oracle.pick_fed(fed), oracle.pick_publication(publication))
                    {
                        let _ = federation.publish(id, p, f64::from(value));
                    }
                },
                Op::Read { fed, subscription } => {
                    if let (Some(id), Some(s)) =
                        (oracle.pick_fed(fed), oracle.pick_subscription(subscription))
                    {
                        let _ = federation.read(id, s);
                    }
                },
                Op::Finalize { fed } => {
                    if let Some(id) = oracle.pick_fed(fed) {
                        let first = federation.finalize(id);
                        if let Ok(actions) = &first {
                            oracle.check_actions(&federation, actions)?;
                        }
                        // Idempotence: the second finalize is a silent no-op.
                        let second = federation.finalize(id);
                        prop_assert_eq!(second, Ok(Vec::new()));
                    }
                },
            }
        }
    }
}
