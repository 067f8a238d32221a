//! Inflight admission gate.
//!
//! A counting permit pool backed by `Mutex` + `Condvar`. Each permit is an
//! owned guard that travels with its message into the sender; dropping it
//! returns the slot, so every acquire is paired with exactly one release
//! whichever way the delivery ends.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct GateState {
    in_use: usize,
    capacity: usize,
}

/// Bounds how many messages of one subscription may be under delivery.
pub struct InflightGate {
    state: Mutex<GateState>,
    wake: Condvar,
}

impl InflightGate {
    /// Create a gate with `capacity` permits. A capacity of zero is raised to
    /// one so the consumer can always make progress.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(InflightGate {
            state: Mutex::new(GateState {
                in_use: 0,
                capacity: capacity.max(1),
            }),
            wake: Condvar::new(),
        })
    }

    // The state is two integers updated in single statements, so a poisoned
    // guard still holds a consistent value.
    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until a permit is free.
    pub fn acquire(self: &Arc<Self>) -> InflightPermit {
        let mut state = self.state();
        while state.in_use >= state.capacity {
            state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.in_use += 1;
        self.permit()
    }

    /// Block for at most `wait` for a permit. Returns `None` on timeout so the
    /// caller can recheck its own shutdown state.
    pub fn acquire_timeout(self: &Arc<Self>, wait: Duration) -> Option<InflightPermit> {
        let deadline = Instant::now() + wait;
        let mut state = self.state();
        while state.in_use >= state.capacity {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
        state.in_use += 1;
        Some(self.permit())
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<InflightPermit> {
        let mut state = self.state();
        if state.in_use >= state.capacity {
            return None;
        }
        state.in_use += 1;
        Some(self.permit())
    }

    /// Change the number of permits. Outstanding permits stay valid; if the
    /// pool shrinks below the current count, new acquires wait until enough
    /// of them come back.
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.state();
        state.capacity = capacity.max(1);
        self.wake.notify_all();
    }

    pub fn capacity(&self) -> usize {
        self.state().capacity
    }

    pub fn in_use(&self) -> usize {
        self.state().in_use
    }

    pub fn available(&self) -> usize {
        let state = self.state();
        state.capacity.saturating_sub(state.in_use)
    }

    fn permit(self: &Arc<Self>) -> InflightPermit {
        InflightPermit {
            gate: Arc::clone(self),
        }
    }

    fn release(&self) {
        let mut state = self.state();
        state.in_use = state.in_use.saturating_sub(1);
        self.wake.notify_one();
    }
}

impl fmt::Debug for InflightGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("InflightGate")
            .field("in_use", &state.in_use)
            .field("capacity", &state.capacity)
            .finish()
    }
}

/// One slot in an `InflightGate`, released on drop.
#[must_use = "dropping a permit releases it immediately"]
pub struct InflightPermit {
    gate: Arc<InflightGate>,
}

impl InflightPermit {
    /// Return the slot now. Equivalent to dropping the permit.
    pub fn release(self) {}
}

impl Drop for InflightPermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl fmt::Debug for InflightPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightPermit").finish_non_exhaustive()
    }
}
