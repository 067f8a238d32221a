//! Admission pacing.
//!
//! The consumer consults its rate limiter once per iteration, after it holds
//! an inflight permit and before it pulls the next message. The limiter paces
//! throughput; the inflight gate bounds concurrency. The two are independent.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::subscription::Subscription;

pub trait RateLimiter: Send + Sync {
    /// Start pacing. Called once by the consumer loop before its first
    /// iteration.
    fn initialize(&self);

    /// Stop pacing and release any caller blocked in `acquire`.
    fn shutdown(&self);

    /// Apply the rate settings of a new subscription snapshot.
    fn update_subscription(&self, subscription: &Subscription);

    /// Block until one more delivery may be admitted. Returns `false` if the
    /// limiter was shut down while waiting.
    fn acquire(&self) -> bool;
}

/// A limiter that admits everything immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedRateLimiter;

impl RateLimiter for UnlimitedRateLimiter {
    fn initialize(&self) {}

    fn shutdown(&self) {}

    fn update_subscription(&self, _subscription: &Subscription) {}

    fn acquire(&self) -> bool {
        true
    }
}

#[derive(Debug)]
struct Pacing {
    interval: Option<Duration>,
    next_slot: Instant,
    running: bool,
}

/// Spaces admissions evenly at the subscription's `rate_limit` per second.
///
/// No bursting: after an idle period the next admission is immediate and the
/// one after it waits a full interval.
#[derive(Debug)]
pub struct FixedRateLimiter {
    pacing: Mutex<Pacing>,
    wake: Condvar,
}

fn interval_for(rate_limit: Option<f64>) -> Option<Duration> {
    rate_limit
        .filter(|rate| rate.is_finite() && *rate > 0.0)
        .map(|rate| Duration::from_secs_f64(1.0 / rate))
}

impl FixedRateLimiter {
    pub fn new(subscription: &Subscription) -> Self {
        Self {
            pacing: Mutex::new(Pacing {
                interval: interval_for(subscription.rate_limit),
                next_slot: Instant::now(),
                running: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn pacing(&self) -> MutexGuard<'_, Pacing> {
        self.pacing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current spacing between admissions, `None` when unpaced.
    pub fn interval(&self) -> Option<Duration> {
        self.pacing().interval
    }

    pub fn is_running(&self) -> bool {
        self.pacing().running
    }
}

impl RateLimiter for FixedRateLimiter {
    fn initialize(&self) {
        let mut pacing = self.pacing();
        pacing.running = true;
        pacing.next_slot = Instant::now();
    }

    fn shutdown(&self) {
        self.pacing().running = false;
        self.wake.notify_all();
    }

    fn update_subscription(&self, subscription: &Subscription) {
        let mut pacing = self.pacing();
        pacing.interval = interval_for(subscription.rate_limit);
        pacing.next_slot = pacing.next_slot.min(Instant::now() + pacing.interval.unwrap_or_default());
        self.wake.notify_all();
    }

    fn acquire(&self) -> bool {
        let mut pacing = self.pacing();
        loop {
            if !pacing.running {
                return false;
            }
            let Some(interval) = pacing.interval else {
                return true;
            };
            let now = Instant::now();
            if now >= pacing.next_slot {
                pacing.next_slot = now + interval;
                return true;
            }
            let wait = pacing.next_slot - now;
            let (guard, _) = self
                .wake
                .wait_timeout(pacing, wait)
                .unwrap_or_else(PoisonError::into_inner);
            pacing = guard;
        }
    }
}
