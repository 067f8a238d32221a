//! Stop and hot subscription updates.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sourced_consumer::{
    Consumer, ConsumerConfig, ConsumerState, ConsumerThread, FixedRateLimiter, Iteration,
    NoOperationConverter, PartitionId, Subscription, UnlimitedRateLimiter,
};

use crate::support::{
    message, subscription, wait_until, CheckingSender, HoldingSender, RecordingLimiter,
    ScriptedReceiver,
};

fn config() -> ConsumerConfig {
    ConsumerConfig::new()
        .with_admission_wait(Duration::from_millis(10))
        .with_receive_timeout(Duration::from_millis(10))
}

// ============================================================================
// Test 1: Stopping ends the loop but keeps tracker state
// ============================================================================

#[test]
fn stop_keeps_pending_offsets_and_stops_receiver() {
    let receiver = ScriptedReceiver::messages((0..3).map(|offset| message(0, offset)));
    let consumer = Arc::new(
        Consumer::new(
            subscription(10),
            receiver,
            NoOperationConverter,
            HoldingSender::default(),
            RecordingLimiter::new("log://billing"),
        )
        .with_config(config()),
    );

    let worker = ConsumerThread::spawn(Arc::clone(&consumer)).unwrap();
    assert!(wait_until(Duration::from_secs(2), || consumer.sender().held() == 3));
    assert_eq!(consumer.state(), ConsumerState::Running);
    assert_eq!(consumer.rate_limiter().initialized(), 1);

    let metrics = worker.stop();
    assert_eq!(metrics.dispatched, 3);
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert!(consumer.receiver().is_stopped());
    assert_eq!(consumer.sender().shutdowns(), 1);
    assert_eq!(consumer.rate_limiter().shutdowns(), 1);

    // Nothing was acknowledged, and nothing was forgotten either.
    assert_eq!(consumer.offset_tracker().pending_count(PartitionId(0)).unwrap(), 3);
    assert!(consumer.offsets_to_commit().is_empty());

    // Late completions still advance the frontier for a final commit.
    consumer.sender().complete_all();
    assert_eq!(consumer.offsets_to_commit().len(), 1);
    assert_eq!(consumer.gate().in_use(), 0);
}

#[test]
fn stop_consuming_is_idempotent() {
    let consumer = Consumer::new(
        subscription(1),
        ScriptedReceiver::default(),
        NoOperationConverter,
        HoldingSender::default(),
        RecordingLimiter::new("log://billing"),
    )
    .with_config(config());

    consumer.stop_consuming();
    consumer.stop_consuming();

    assert_eq!(consumer.state(), ConsumerState::Stopping);
    assert!(!consumer.is_consuming());
    assert_eq!(consumer.sender().shutdowns(), 1);
    assert_eq!(consumer.rate_limiter().shutdowns(), 1);

    // Running a stopped consumer only completes the transition.
    consumer.run();
    assert_eq!(consumer.state(), ConsumerState::Stopped);
    assert_eq!(consumer.receiver().calls(), 0);
    assert_eq!(consumer.rate_limiter().initialized(), 0);
}

#[test]
fn stopped_rate_limiter_refuses_admission() {
    let sub = Arc::new(
        Subscription::new(sourced_consumer::Topic::new("orders"), "billing", "log://billing")
            .with_rate_limit(1.0),
    );
    let limiter = FixedRateLimiter::new(&sub);
    let consumer = Consumer::new(
        sub,
        ScriptedReceiver::messages([message(0, 0)]),
        NoOperationConverter,
        HoldingSender::default(),
        limiter,
    )
    .with_config(config());

    consumer.stop_consuming();
    assert_eq!(consumer.run_once().unwrap(), Iteration::Idle);
    assert_eq!(consumer.gate().in_use(), 0);
    assert_eq!(consumer.receiver().calls(), 0);
}

// ============================================================================
// Test 2: Subscription updates are applied atomically
// ============================================================================

#[test]
fn update_subscription_reaches_limiter_sender_and_gate() {
    let consumer = Consumer::new(
        subscription(2),
        ScriptedReceiver::default(),
        NoOperationConverter,
        HoldingSender::default(),
        UnlimitedRateLimiter,
    );

    let updated = Arc::new(
        (*consumer.subscription())
            .clone()
            .with_endpoint("log://billing-v2")
            .with_max_inflight(5),
    );
    consumer.update_subscription(Arc::clone(&updated));

    assert_eq!(consumer.subscription(), updated);
    assert_eq!(consumer.sender().updates(), vec!["log://billing-v2".to_string()]);
    assert_eq!(consumer.gate().capacity(), 5);
}

#[test]
fn dispatch_never_sees_a_partial_update() {
    let limiter = RecordingLimiter::new("e-0");
    let sender = CheckingSender::new(limiter.view(), "e-0");
    let endless = ScriptedReceiver::messages((0..20_000).map(|offset| message(0, offset)));

    let initial = Arc::new((*subscription(8)).clone().with_endpoint("e-0"));
    let consumer = Arc::new(
        Consumer::new(initial, endless, NoOperationConverter, sender, limiter)
            .with_config(config()),
    );
    let worker = ConsumerThread::spawn(Arc::clone(&consumer)).unwrap();

    let updater = {
        let consumer = Arc::clone(&consumer);
        thread::spawn(move || {
            for i in 1..=100 {
                let next = (*consumer.subscription()).clone().with_endpoint(format!("e-{i}"));
                consumer.update_subscription(Arc::new(next));
            }
        })
    };
    updater.join().unwrap();
    worker.stop();

    assert!(consumer.sender().dispatched.load(Ordering::SeqCst) > 0);
    assert_eq!(consumer.sender().mismatches.load(Ordering::SeqCst), 0);
    assert_eq!(consumer.subscription().endpoint, "e-100");
}
