//! Permit accounting and backpressure, driven one iteration at a time.

use std::time::Duration;

use sourced_consumer::{
    Consumer, ConsumerConfig, ConsumerError, ConvertError, DeliveryOutcome, Iteration,
    NoOperationConverter, PartitionId, PartitionOffset, ReceiveError, UnlimitedRateLimiter,
};

use crate::support::{message, subscription, HoldingSender, ScriptedReceiver, StrictJsonConverter};

fn config() -> ConsumerConfig {
    ConsumerConfig::new()
        .with_admission_wait(Duration::from_millis(10))
        .with_receive_timeout(Duration::from_millis(10))
}

fn consumer(
    max_inflight: usize,
    receiver: ScriptedReceiver,
) -> Consumer<ScriptedReceiver, NoOperationConverter, HoldingSender, UnlimitedRateLimiter> {
    Consumer::new(
        subscription(max_inflight),
        receiver,
        NoOperationConverter,
        HoldingSender::default(),
        UnlimitedRateLimiter,
    )
    .with_config(config())
}

// ============================================================================
// Test 1: A receive timeout returns the permit and records nothing
// ============================================================================

#[test]
fn receive_timeout_releases_permit_without_recording() {
    let consumer = consumer(1, ScriptedReceiver::default());

    assert_eq!(consumer.run_once().unwrap(), Iteration::ReceiveTimeout);
    assert_eq!(consumer.gate().in_use(), 0);
    assert!(consumer.offset_tracker().partitions().unwrap().is_empty());
    assert!(consumer.offsets_to_commit().is_empty());
    assert_eq!(consumer.metrics().snapshot().receive_timeouts, 1);
    assert_eq!(consumer.metrics().snapshot().dispatched, 0);

    // The single permit is available again for the next iteration.
    assert_eq!(consumer.run_once().unwrap(), Iteration::ReceiveTimeout);
    assert_eq!(consumer.gate().in_use(), 0);
}

// ============================================================================
// Test 2: A failed receive also returns the permit
// ============================================================================

#[test]
fn receive_failure_releases_permit() {
    let receiver = ScriptedReceiver::new([
        Err(ReceiveError::Failed("connection reset".into())),
        Ok(message(0, 0)),
    ]);
    let consumer = consumer(1, receiver);

    let err = consumer.run_once().unwrap_err();
    assert!(matches!(err, ConsumerError::Receive(ReceiveError::Failed(_))));
    assert_eq!(consumer.gate().in_use(), 0);

    // With a capacity of one, a leaked permit would leave this Idle.
    assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);
    assert_eq!(consumer.gate().in_use(), 1);
    assert_eq!(consumer.sender().held(), 1);
}

#[test]
fn repeated_receive_failures_never_stall_the_gate() {
    let receiver = ScriptedReceiver::new(
        (0..10).map(|i| Err(ReceiveError::Failed(format!("failure {i}")))),
    );
    receiver.push(Ok(message(0, 0)));
    let consumer = consumer(2, receiver);

    for _ in 0..10 {
        assert!(consumer.run_once().is_err());
    }
    assert_eq!(consumer.gate().in_use(), 0);
    assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);
}

// ============================================================================
// Test 3: The gate bounds outstanding deliveries
// ============================================================================

#[test]
fn gate_blocks_dispatch_at_max_inflight() {
    let receiver = ScriptedReceiver::messages((0..5).map(|offset| message(0, offset)));
    let consumer = consumer(2, receiver);

    assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);
    assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);
    assert_eq!(consumer.run_once().unwrap(), Iteration::Idle);
    assert_eq!(consumer.gate().in_use(), 2);
    assert_eq!(consumer.sender().held(), 2);

    // Idle iterations never touch the receiver.
    assert_eq!(consumer.receiver().calls(), 2);

    consumer.sender().complete_first(DeliveryOutcome::Delivered);
    assert_eq!(consumer.gate().in_use(), 1);
    assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);
    assert_eq!(consumer.gate().in_use(), 2);
}

#[test]
fn completions_feed_commit_offsets_in_order() {
    let receiver = ScriptedReceiver::messages((0..3).map(|offset| message(0, offset)));
    let consumer = consumer(3, receiver);
    for _ in 0..3 {
        assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);
    }
    assert_eq!(consumer.offset_tracker().pending_count(PartitionId(0)).unwrap(), 3);

    consumer.sender().complete_offset(2, DeliveryOutcome::Delivered);
    consumer.sender().complete_offset(1, DeliveryOutcome::Delivered);
    assert!(consumer.offsets_to_commit().is_empty());

    consumer
        .sender()
        .complete_offset(0, DeliveryOutcome::Discarded("rejected".into()));
    assert_eq!(consumer.offsets_to_commit(), vec![PartitionOffset::new(0, 2)]);
    assert!(consumer.offsets_to_commit().is_empty());
    assert_eq!(consumer.gate().in_use(), 0);
}

// ============================================================================
// Test 4: Conversion failures are discarded and do not stall the partition
// ============================================================================

#[test]
fn conversion_failure_is_discarded_and_committed() {
    let receiver = ScriptedReceiver::messages([
        message(0, 0),
        sourced_consumer::Message::with_string_payload("m-0-1", 0, 1, "not json"),
        message(0, 2),
    ]);
    let consumer = Consumer::new(
        subscription(4),
        receiver,
        StrictJsonConverter,
        HoldingSender::default(),
        UnlimitedRateLimiter,
    )
    .with_config(config());

    assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);
    let err = consumer.run_once().unwrap_err();
    assert!(matches!(err, ConsumerError::Convert(ConvertError::Decode(_))));
    assert_eq!(consumer.run_once().unwrap(), Iteration::Dispatched);

    assert_eq!(consumer.gate().in_use(), 2);
    assert_eq!(
        consumer.sender().held_offsets(),
        vec![(PartitionId(0), 0), (PartitionId(0), 2)]
    );
    assert_eq!(consumer.metrics().snapshot().discarded, 1);

    consumer.sender().complete_all();
    assert_eq!(consumer.offsets_to_commit(), vec![PartitionOffset::new(0, 2)]);
}
