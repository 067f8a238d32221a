//! In-process counters for one consumer.
//!
//! Shared between the loop thread and the sender's delivery threads, so every
//! counter is atomic. Exporting them anywhere is left to the embedder.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ConsumerMetrics {
    inflight: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    discarded: AtomicU64,
    abandoned: AtomicU64,
    receive_timeouts: AtomicU64,
    loop_errors: AtomicU64,
}

/// Point-in-time copy of `ConsumerMetrics`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub inflight: u64,
    pub dispatched: u64,
    pub delivered: u64,
    pub discarded: u64,
    pub abandoned: u64,
    pub receive_timeouts: u64,
    pub loop_errors: u64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.finish_inflight();
    }

    pub fn message_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
        self.finish_inflight();
    }

    pub fn message_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
        self.finish_inflight();
    }

    pub fn receive_timeout(&self) {
        self.receive_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn loop_error(&self) {
        self.loop_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_inflight(&self) {
        let _ = self
            .inflight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inflight: self.inflight.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            receive_timeouts: self.receive_timeouts.load(Ordering::Relaxed),
            loop_errors: self.loop_errors.load(Ordering::Relaxed),
        }
    }
}
