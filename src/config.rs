//! Consumer runtime settings that are independent of any one subscription.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a consumer loop and the collaborators built around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Longest a single pull from the log may block before timing out.
    pub receive_timeout: Duration,
    /// Longest a single permit acquire may block before the loop rechecks
    /// whether it has been asked to stop.
    pub admission_wait: Duration,
    /// Delivery threads per `ThreadedSender`.
    pub sender_threads: usize,
    /// Interval between offset commit passes.
    pub commit_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(500),
            admission_wait: Duration::from_millis(100),
            sender_threads: 4,
            commit_interval: Duration::from_secs(1),
        }
    }
}

impl ConsumerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_admission_wait(mut self, wait: Duration) -> Self {
        self.admission_wait = wait;
        self
    }

    pub fn with_sender_threads(mut self, threads: usize) -> Self {
        self.sender_threads = threads.max(1);
        self
    }

    pub fn with_commit_interval(mut self, interval: Duration) -> Self {
        self.commit_interval = interval;
        self
    }
}
