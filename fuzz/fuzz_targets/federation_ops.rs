//! Fuzz target for the [`Federation`] state machine
//!
//! Arbitrary operation sequences against the pure federation, probing for
//! panics and grant-rule violations.
//!
//! # Strategy
//!
//! - Operation sequences: register, declare, phase transitions, time
//!   requests, publishes, reads, finalizes — in any order
//! - Index recycling: small indices resolve modulo the live handle sets, so
//!   most steps hit real state instead of bouncing off UnknownFederate
//! - Error tolerance: individual rejections are legal; invariants are not
//!
//! # Invariants
//!
//! - Granted times never decrease for any federate
//! - Grants never name a finalized federate
//! - Finalize is idempotent (second call returns no actions)
//! - NEVER panic on any operation order

#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use lockstep_core::{Federation, FederationAction};
use lockstep_proto::{FederateId, Phase, PublicationId, SimTime, SubscriptionId, ValueType};

#[derive(Debug, Clone, Arbitrary)]
enum FuzzOp {
    Register { name: u8 },
    DeclarePublication { fed: u8, name: u8 },
    DeclareSubscription { fed: u8, name: u8 },
    EnterInitializing { fed: u8 },
    EnterExecuting { fed: u8 },
    RequestTime { fed: u8, nanos: u32 },
    Publish { fed: u8, publication: u8, value: i16 },
    Read { fed: u8, subscription: u8 },
    Finalize { fed: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    /// Declared federation size (kept small to make the barrier reachable).
    expected: u8,
    strict: bool,
    ops: Vec<FuzzOp>,
}

fn pick<T: Copy>(items: &[T], index: u8) -> Option<T> {
    if items.is_empty() {
        None
    } else {
        Some(items[index as usize % items.len()])
    }
}

fn check(
    federation: &Federation,
    actions: &[FederationAction],
    last_granted: &mut HashMap<FederateId, SimTime>,
) {
    for action in actions {
        if let FederationAction::Grant { federate, time } = *action {
            assert_ne!(
                federation.phase(federate),
                Some(Phase::Finalized),
                "grant named a finalized federate"
            );
            let last = last_granted.entry(federate).or_insert(SimTime::ZERO);
            assert!(time >= *last, "grant went backwards for {federate}");
            *last = time;
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let mut federation = Federation::new(usize::from(input.expected % 4), input.strict);
    let mut feds: Vec<FederateId> = Vec::new();
    let mut publications: Vec<PublicationId> = Vec::new();
    let mut subscriptions: Vec<SubscriptionId> = Vec::new();
    let mut last_granted: HashMap<FederateId, SimTime> = HashMap::new();

    for op in input.ops {
        match op {
            FuzzOp::Register { name } => {
                if let Ok(id) = federation.register_federate(
                    &format!("fed-{name}"),
                    SimTime::from_nanos(i64::from(name)),
                    SimTime::ZERO,
                ) {
                    feds.push(id);
                }
            },
            FuzzOp::DeclarePublication { fed, name } => {
                if let Some(id) = pick(&feds, fed) {
                    if let Ok(p) =
                        federation.register_publication(id, &format!("t-{name}"), ValueType::Double)
                    {
                        publications.push(p);
                    }
                }
            },
            FuzzOp::DeclareSubscription { fed, name } => {
                if let Some(id) = pick(&feds, fed) {
                    if let Ok(s) = federation.register_subscription(id, &format!("t-{name}")) {
                        subscriptions.push(s);
                    }
                }
            },
            FuzzOp::EnterInitializing { fed } => {
                if let Some(id) = pick(&feds, fed) {
                    let _ = federation.enter_initializing(id);
                }
            },
            FuzzOp::EnterExecuting { fed } => {
                if let Some(id) = pick(&feds, fed) {
                    if let Ok(actions) = federation.enter_executing(id) {
                        check(&federation, &actions, &mut last_granted);
                    }
                }
            },
            FuzzOp::RequestTime { fed, nanos } => {
                if let Some(id) = pick(&feds, fed) {
                    if let Ok(actions) =
                        federation.request_time(id, SimTime::from_nanos(i64::from(nanos)))
                    {
                        check(&federation, &actions, &mut last_granted);
                    }
                }
            },
            FuzzOp::Publish { fed, publication, value } => {
                if let (Some(id), Some(p)) = (pick(&feds, fed), pick(&publications, publication)) {
                    let _ = federation.publish(id, p, f64::from(value));
                }
            },
            FuzzOp::Read { fed, subscription } => {
                if let (Some(id), Some(s)) = (pick(&feds, fed), pick(&subscriptions, subscription))
                {
                    let _ = federation.read(id, s);
                }
            },
            FuzzOp::Finalize { fed } => {
                if let Some(id) = pick(&feds, fed) {
                    if let Ok(actions) = federation.finalize(id) {
                        check(&federation, &actions, &mut last_granted);
                    }
                    let second = federation.finalize(id);
                    assert_eq!(second, Ok(Vec::new()), "finalize is not idempotent");
                }
            },
        }
    }
});
