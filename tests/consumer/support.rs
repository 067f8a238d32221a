//! Test doubles for driving a consumer step by step.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sourced_consumer::{
    ConvertError, Delivery, DeliveryOutcome, Message, MessageConverter, MessageReceiver,
    MessageSender, PartitionId, RateLimiter, ReceiveError, Subscription, Topic,
};

pub fn subscription(max_inflight: usize) -> Arc<Subscription> {
    Arc::new(
        Subscription::new(Topic::new("orders"), "billing", "log://billing")
            .with_max_inflight(max_inflight),
    )
}

pub fn message(partition: u32, offset: u64) -> Message {
    Message::with_string_payload(format!("m-{partition}-{offset}"), partition, offset, "{}")
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ============================================================================
// Receiver
// ============================================================================

/// Replays a fixed script of receive results, then times out.
#[derive(Default)]
pub struct ScriptedReceiver {
    script: Mutex<VecDeque<Result<Message, ReceiveError>>>,
    stopped: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedReceiver {
    pub fn new(script: impl IntoIterator<Item = Result<Message, ReceiveError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn messages(messages: impl IntoIterator<Item = Message>) -> Self {
        Self::new(messages.into_iter().map(Ok))
    }

    pub fn push(&self, result: Result<Message, ReceiveError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MessageReceiver for ScriptedReceiver {
    fn next(&self) -> Result<Message, ReceiveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.is_stopped() {
            return Err(ReceiveError::Stopped);
        }
        match self.script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => {
                thread::sleep(Duration::from_millis(1));
                Err(ReceiveError::Timeout)
            }
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Sender
// ============================================================================

/// Keeps every delivery until the test completes it.
#[derive(Default)]
pub struct HoldingSender {
    held: Mutex<Vec<Delivery>>,
    shutdowns: AtomicUsize,
    updates: Mutex<Vec<String>>,
}

impl HoldingSender {
    pub fn held(&self) -> usize {
        self.held.lock().unwrap().len()
    }

    pub fn held_offsets(&self) -> Vec<(PartitionId, u64)> {
        self.held
            .lock()
            .unwrap()
            .iter()
            .map(|d| (d.message().partition, d.message().offset))
            .collect()
    }

    /// Complete the oldest held delivery.
    pub fn complete_first(&self, outcome: DeliveryOutcome) -> bool {
        let mut held = self.held.lock().unwrap();
        if held.is_empty() {
            return false;
        }
        held.remove(0).complete(outcome);
        true
    }

    /// Complete the held delivery for `offset`, if any.
    pub fn complete_offset(&self, offset: u64, outcome: DeliveryOutcome) -> bool {
        let mut held = self.held.lock().unwrap();
        match held.iter().position(|d| d.message().offset == offset) {
            Some(index) => {
                held.remove(index).complete(outcome);
                true
            }
            None => false,
        }
    }

    pub fn complete_all(&self) {
        let drained: Vec<Delivery> = self.held.lock().unwrap().drain(..).collect();
        for delivery in drained {
            delivery.complete(DeliveryOutcome::Delivered);
        }
    }

    pub fn payloads(&self) -> Vec<String> {
        self.held
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.message().payload_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }
}

impl MessageSender for HoldingSender {
    fn send_message(&self, delivery: Delivery) {
        self.held.lock().unwrap().push(delivery);
    }

    fn update_subscription(&self, subscription: &Arc<Subscription>) {
        self.updates.lock().unwrap().push(subscription.endpoint.clone());
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Completes each delivery on the spot, recording whether the rate limiter
/// and this sender agreed on the subscription at dispatch time.
pub struct CheckingSender {
    limiter_view: Arc<Mutex<String>>,
    sender_view: Mutex<String>,
    pub dispatched: AtomicUsize,
    pub mismatches: AtomicUsize,
}

impl CheckingSender {
    pub fn new(limiter_view: Arc<Mutex<String>>, initial: &str) -> Self {
        Self {
            limiter_view,
            sender_view: Mutex::new(initial.to_string()),
            dispatched: AtomicUsize::new(0),
            mismatches: AtomicUsize::new(0),
        }
    }
}

impl MessageSender for CheckingSender {
    fn send_message(&self, delivery: Delivery) {
        let limiter = self.limiter_view.lock().unwrap().clone();
        let sender = self.sender_view.lock().unwrap().clone();
        if limiter != sender {
            self.mismatches.fetch_add(1, Ordering::SeqCst);
        }
        self.dispatched.fetch_add(1, Ordering::SeqCst);
        delivery.complete(DeliveryOutcome::Delivered);
    }

    fn update_subscription(&self, subscription: &Arc<Subscription>) {
        // Widen the window between the limiter and sender updates.
        thread::sleep(Duration::from_micros(200));
        *self.sender_view.lock().unwrap() = subscription.endpoint.clone();
    }

    fn shutdown(&self) {}
}

// ============================================================================
// Rate limiter
// ============================================================================

/// Always admits; remembers the endpoint of the subscription it was last
/// configured with.
pub struct RecordingLimiter {
    view: Arc<Mutex<String>>,
    initialized: AtomicUsize,
    shutdowns: AtomicUsize,
}

impl RecordingLimiter {
    pub fn new(initial: &str) -> Self {
        Self {
            view: Arc::new(Mutex::new(initial.to_string())),
            initialized: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn view(&self) -> Arc<Mutex<String>> {
        Arc::clone(&self.view)
    }

    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl RateLimiter for RecordingLimiter {
    fn initialize(&self) {
        self.initialized.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn update_subscription(&self, subscription: &Subscription) {
        *self.view.lock().unwrap() = subscription.endpoint.clone();
    }

    fn acquire(&self) -> bool {
        true
    }
}

// ============================================================================
// Converter
// ============================================================================

/// Rejects messages whose payload is not valid JSON.
pub struct StrictJsonConverter;

impl MessageConverter for StrictJsonConverter {
    fn convert(&self, message: Message, _topic: &Topic) -> Result<Message, ConvertError> {
        serde_json::from_slice::<serde_json::Value>(&message.payload)
            .map_err(|e| ConvertError::Decode(e.to_string()))?;
        Ok(message)
    }
}
