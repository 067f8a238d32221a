//! In-memory partitioned log for tests and single-process scenarios.
//!
//! Appends assign per-partition offsets starting at zero. Any number of
//! `LogReceiver`s can read the same log, each with its own positions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::MessageReceiver;
use crate::error::ReceiveError;
use crate::message::{Message, PartitionId, PartitionOffset};

struct LogInner {
    partitions: Mutex<Vec<Vec<Message>>>,
    appended: Condvar,
}

/// Thread-safe in-memory log split into a fixed number of partitions.
///
/// ## Example
///
/// ```
/// use std::time::Duration;
/// use sourced_consumer::{MessageReceiver, PartitionId, PartitionedLog};
///
/// let log = PartitionedLog::new(2);
/// log.append_str(PartitionId(1), "m-1", r#"{"id":1}"#).unwrap();
///
/// let receiver = log.receiver(Duration::from_millis(10));
/// let message = receiver.next().unwrap();
/// assert_eq!(message.partition, PartitionId(1));
/// assert_eq!(message.offset, 0);
/// ```
#[derive(Clone)]
pub struct PartitionedLog {
    inner: Arc<LogInner>,
}

impl PartitionedLog {
    pub fn new(partition_count: u32) -> Self {
        let partitions = (0..partition_count.max(1)).map(|_| Vec::new()).collect();
        Self {
            inner: Arc::new(LogInner {
                partitions: Mutex::new(partitions),
                appended: Condvar::new(),
            }),
        }
    }

    /// Append a message and return where it landed. Returns `None` if the
    /// partition does not exist.
    pub fn append(
        &self,
        partition: PartitionId,
        id: impl Into<String>,
        payload: Vec<u8>,
    ) -> Option<PartitionOffset> {
        let mut partitions = self.inner.partitions.lock().ok()?;
        let log = partitions.get_mut(partition.0 as usize)?;
        let offset = log.len() as u64;
        let message = Message::new(id, partition, offset, payload).with_publish_timestamp(now_millis());
        log.push(message);
        self.inner.appended.notify_all();
        Some(PartitionOffset { partition, offset })
    }

    pub fn append_str(
        &self,
        partition: PartitionId,
        id: impl Into<String>,
        payload: impl Into<String>,
    ) -> Option<PartitionOffset> {
        self.append(partition, id, payload.into().into_bytes())
    }

    pub fn partition_count(&self) -> u32 {
        self.inner
            .partitions
            .lock()
            .map(|p| p.len() as u32)
            .unwrap_or_default()
    }

    /// Number of messages in `partition`.
    pub fn len(&self, partition: PartitionId) -> usize {
        self.inner
            .partitions
            .lock()
            .ok()
            .and_then(|p| p.get(partition.0 as usize).map(Vec::len))
            .unwrap_or_default()
    }

    /// Total number of messages across partitions.
    pub fn total_len(&self) -> usize {
        self.inner
            .partitions
            .lock()
            .map(|p| p.iter().map(Vec::len).sum())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    /// A receiver reading every partition from the beginning.
    pub fn receiver(&self, receive_timeout: Duration) -> LogReceiver {
        self.receiver_from(&[], receive_timeout)
    }

    /// A receiver resuming after the given commit checkpoints. Partitions
    /// without a checkpoint are read from the beginning.
    pub fn receiver_from(&self, committed: &[PartitionOffset], receive_timeout: Duration) -> LogReceiver {
        let mut positions = vec![0; self.partition_count() as usize];
        for checkpoint in committed {
            if let Some(position) = positions.get_mut(checkpoint.partition.0 as usize) {
                *position = checkpoint.next_read_offset();
            }
        }
        LogReceiver {
            log: Arc::clone(&self.inner),
            state: Mutex::new(ReadState { positions, cursor: 0 }),
            receive_timeout,
            stopped: AtomicBool::new(false),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

struct ReadState {
    positions: Vec<u64>,
    cursor: usize,
}

impl ReadState {
    /// Take the next unread message, visiting partitions round-robin so a
    /// busy partition cannot starve the others.
    fn take_next(&mut self, partitions: &[Vec<Message>]) -> Option<Message> {
        let count = partitions.len();
        for step in 0..count {
            let index = (self.cursor + step) % count;
            let position = self.positions[index] as usize;
            if let Some(message) = partitions[index].get(position) {
                self.positions[index] += 1;
                self.cursor = (index + 1) % count;
                return Some(message.clone());
            }
        }
        None
    }
}

/// A reader over a `PartitionedLog` with its own per-partition positions.
pub struct LogReceiver {
    log: Arc<LogInner>,
    state: Mutex<ReadState>,
    receive_timeout: Duration,
    stopped: AtomicBool,
}

impl LogReceiver {
    /// Offset the receiver will read next on each partition.
    pub fn positions(&self) -> Vec<PartitionOffset> {
        self.state
            .lock()
            .map(|state| {
                state
                    .positions
                    .iter()
                    .enumerate()
                    .map(|(p, &offset)| PartitionOffset::new(p as u32, offset))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl MessageReceiver for LogReceiver {
    fn next(&self) -> Result<Message, ReceiveError> {
        let deadline = Instant::now() + self.receive_timeout;
        let mut partitions = self
            .log
            .partitions
            .lock()
            .map_err(|_| ReceiveError::Failed("log lock poisoned".into()))?;

        loop {
            if self.is_stopped() {
                return Err(ReceiveError::Stopped);
            }

            {
                let mut state = self
                    .state
                    .lock()
                    .map_err(|_| ReceiveError::Failed("receiver state poisoned".into()))?;
                if let Some(message) = state.take_next(&partitions) {
                    return Ok(message);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ReceiveError::Timeout);
            }
            let (guard, _) = self
                .log
                .appended
                .wait_timeout(partitions, deadline - now)
                .map_err(|_| ReceiveError::Failed("log lock poisoned".into()))?;
            partitions = guard;
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // Take the log lock so a reader between its stop check and its wait
        // cannot miss this notification.
        let _partitions = self.log.partitions.lock();
        self.log.appended.notify_all();
    }
}
