//! Value-exchange properties.
//!
//! Covers the delivery contract end to end through federate handles:
//! visibility respects the input delay, stale reads are idempotent, the
//! buffer is last-write-wins, and the canonical pi-exchange run delivers
//! exact values.

use lockstep_harness::{ValuePair, secs};
use lockstep_proto::SimTime;

#[tokio::test]
async fn value_is_visible_no_earlier_than_publish_plus_delay() {
    let mut pair = ValuePair::start(secs(0.01)).await.expect("fixture");

    pair.sender.request_time(secs(5.0)).await.expect("sender advance");
    pair.sender.publish(&pair.output, 2.5).await.expect("publish");

    // Receiver at exactly the publish time: the delay hides the value.
    pair.sender.request_time(secs(6.0)).await.expect("sender advance");
    pair.receiver.request_time(secs(5.0)).await.expect("receiver advance");
    assert!(!pair.receiver.is_updated(&pair.input).await.expect("is_updated"));

    // One input delay later it must be there.
    let granted = pair.receiver.request_time(secs(5.01)).await.expect("receiver advance");
    assert_eq!(granted, secs(5.01));
    assert!(pair.receiver.is_updated(&pair.input).await.expect("is_updated"));
    assert_eq!(pair.receiver.value(&pair.input).await.expect("value"), 2.5);
}

#[tokio::test]
async fn stale_read_repeats_the_previous_value() {
    let mut pair = ValuePair::start(SimTime::ZERO).await.expect("fixture");

    pair.sender.request_time(secs(1.0)).await.expect("sender advance");
    pair.sender.publish(&pair.output, 9.75).await.expect("publish");
    pair.sender.request_time(secs(2.0)).await.expect("sender advance");

    pair.receiver.request_time(secs(1.0)).await.expect("receiver advance");
    assert_eq!(pair.receiver.value(&pair.input).await.expect("value"), 9.75);

    // Flag cleared, nothing new delivered: same value, no error.
    assert!(!pair.receiver.is_updated(&pair.input).await.expect("is_updated"));
    assert_eq!(pair.receiver.value(&pair.input).await.expect("value"), 9.75);
}

#[tokio::test]
async fn read_before_any_delivery_is_zero() {
    let pair = ValuePair::start(SimTime::ZERO).await.expect("fixture");
    let mut receiver = pair.receiver;
    let mut sender = pair.sender;

    sender.request_time(secs(1.0)).await.expect("sender advance");
    receiver.request_time(secs(0.5)).await.expect("receiver advance");
    assert_eq!(receiver.value(&pair.input).await.expect("value"), 0.0);
}

#[tokio::test]
async fn unread_values_are_overwritten_not_queued() {
    let mut pair = ValuePair::start(SimTime::ZERO).await.expect("fixture");

    pair.sender.request_time(secs(1.0)).await.expect("sender advance");
    pair.sender.publish(&pair.output, 1.0).await.expect("publish");
    pair.sender.request_time(secs(2.0)).await.expect("sender advance");
    pair.sender.publish(&pair.output, 2.0).await.expect("publish");
    pair.sender.request_time(secs(3.0)).await.expect("sender advance");

    pair.receiver.request_time(secs(2.5)).await.expect("receiver advance");
    assert!(pair.receiver.is_updated(&pair.input).await.expect("is_updated"));
    assert_eq!(pair.receiver.value(&pair.input).await.expect("value"), 2.0);
    assert!(!pair.receiver.is_updated(&pair.input).await.expect("is_updated"));
}

#[tokio::test]
async fn pi_exchange_delivers_every_step_exactly() {
    const STEPS: u32 = 20;
    let delta = secs(0.01);
    let mut pair = ValuePair::start_with_periods(SimTime::ZERO, delta).await.expect("fixture");

    // Drive the two federates in lockstep so the single-value buffer never
    // gets overwritten: the sender stays exactly one period ahead. (Racing
    // federates may legally skip values — last write wins.)
    let mut sender_now = SimTime::ZERO;
    let mut receiver_now = SimTime::ZERO;
    for step in 0..STEPS {
        let published = sender_now.as_seconds() * (22.0 / 7.0);
        pair.sender.publish(&pair.output, published).await.expect("publish");
        sender_now = pair.sender.request_time(sender_now).await.expect("sender advance");

        receiver_now = pair.receiver.request_time(receiver_now).await.expect("receiver advance");
        assert_eq!(receiver_now, secs(0.01 * f64::from(step + 1)));

        assert!(pair.receiver.is_updated(&pair.input).await.expect("is_updated"));
        let value = pair.receiver.value(&pair.input).await.expect("value");
        assert!((value - published).abs() < 1e-12, "step {step}: {value} != {published}");
    }

    pair.sender.finalize().await.expect("finalize sender");
    pair.receiver.finalize().await.expect("finalize receiver");

    pair.broker.wait_closed().await;
    assert!(!pair.broker.is_connected());
}
