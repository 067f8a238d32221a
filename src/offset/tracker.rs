//! Per-partition commit frontier over out-of-order delivery completions.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::ConsumerError;
use crate::message::{PartitionId, PartitionOffset};

/// Dispatched and acknowledged offsets of one partition that have not yet
/// been folded into a commit.
///
/// `next` is the low end of the window: the smallest offset not covered by a
/// reported commit. The frontier only advances over consecutive offset values
/// starting at `next`, so any missing value, dispatched or not, holds back
/// everything above it.
#[derive(Debug, Default)]
struct PartitionWindow {
    next: Option<u64>,
    committed: Option<u64>,
    pending: BTreeSet<u64>,
    acked: BTreeSet<u64>,
}

impl PartitionWindow {
    fn is_stale(&self, offset: u64) -> bool {
        self.committed.is_some_and(|committed| offset <= committed)
    }

    /// Lower the window's start while nothing has been committed yet, so the
    /// first offset seen does not have to be the lowest one.
    fn extend_low_end(&mut self, offset: u64) {
        if self.committed.is_some() {
            return;
        }
        self.next = Some(self.next.map_or(offset, |next| next.min(offset)));
    }

    fn dispatched(&mut self, offset: u64) {
        if self.is_stale(offset) {
            tracing::trace!(offset, "ignoring dispatch below committed offset");
            return;
        }
        self.extend_low_end(offset);
        self.pending.insert(offset);
    }

    fn acknowledged(&mut self, offset: u64) {
        if self.is_stale(offset) {
            return;
        }
        self.extend_low_end(offset);
        self.pending.remove(&offset);
        self.acked.insert(offset);
    }

    /// Consume the contiguous acknowledged run at the low end of the window.
    /// Returns the new commit offset if the frontier moved.
    fn fold(&mut self) -> Option<u64> {
        let mut cursor = self.next?;
        let mut advanced = None;
        let mut next = Some(cursor);
        while self.acked.remove(&cursor) {
            advanced = Some(cursor);
            next = cursor.checked_add(1);
            match next {
                Some(following) => cursor = following,
                None => break,
            }
        }
        if let Some(offset) = advanced {
            self.committed = Some(offset);
            // `None` once u64::MAX is committed; nothing above it can follow.
            self.next = next;
        }
        advanced
    }
}

/// Reconciles unordered delivery acknowledgements into a monotonically
/// advancing, gap-aware commit offset per partition.
///
/// - `record_dispatched` is called by the single consumer loop thread.
/// - `record_acknowledged` is called from any number of delivery threads.
/// - `offsets_to_commit` is polled from a committer thread.
///
/// Each partition has its own lock, so acknowledgements on different
/// partitions never contend or interfere. A poll only visits partitions that
/// received acknowledgements since the previous poll.
///
/// ## Example
///
/// ```
/// use sourced_consumer::{OffsetCommitTracker, PartitionId, PartitionOffset};
///
/// let tracker = OffsetCommitTracker::new();
/// let p = PartitionId(0);
/// for offset in [1, 2, 3] {
///     tracker.record_dispatched(p, offset).unwrap();
/// }
///
/// tracker.record_acknowledged(p, 2).unwrap();
/// assert!(tracker.offsets_to_commit().unwrap().is_empty());
///
/// tracker.record_acknowledged(p, 1).unwrap();
/// assert_eq!(tracker.offsets_to_commit().unwrap(), vec![PartitionOffset::new(0, 2)]);
/// ```
#[derive(Debug, Default)]
pub struct OffsetCommitTracker {
    partitions: RwLock<HashMap<PartitionId, Arc<Mutex<PartitionWindow>>>>,
    dirty: Mutex<BTreeSet<PartitionId>>,
}

impl OffsetCommitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn window(&self, partition: PartitionId) -> Result<Arc<Mutex<PartitionWindow>>, ConsumerError> {
        {
            let partitions = self
                .partitions
                .read()
                .map_err(|_| ConsumerError::LockPoisoned("tracker partition lookup"))?;
            if let Some(window) = partitions.get(&partition) {
                return Ok(Arc::clone(window));
            }
        }
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| ConsumerError::LockPoisoned("tracker partition insert"))?;
        Ok(Arc::clone(partitions.entry(partition).or_default()))
    }

    fn existing_window(
        &self,
        partition: PartitionId,
    ) -> Result<Option<Arc<Mutex<PartitionWindow>>>, ConsumerError> {
        let partitions = self
            .partitions
            .read()
            .map_err(|_| ConsumerError::LockPoisoned("tracker partition lookup"))?;
        Ok(partitions.get(&partition).cloned())
    }

    /// Record that the message at `offset` was handed to the sender.
    pub fn record_dispatched(&self, partition: PartitionId, offset: u64) -> Result<(), ConsumerError> {
        let window = self.window(partition)?;
        let mut window = window
            .lock()
            .map_err(|_| ConsumerError::LockPoisoned("record dispatched"))?;
        window.dispatched(offset);
        Ok(())
    }

    /// Record that delivery of the message at `offset` finished for good.
    pub fn record_acknowledged(&self, partition: PartitionId, offset: u64) -> Result<(), ConsumerError> {
        let window = self.window(partition)?;
        {
            let mut window = window
                .lock()
                .map_err(|_| ConsumerError::LockPoisoned("record acknowledged"))?;
            window.acknowledged(offset);
        }
        self.dirty
            .lock()
            .map_err(|_| ConsumerError::LockPoisoned("mark partition dirty"))?
            .insert(partition);
        Ok(())
    }

    /// Advance every partition's frontier as far as its acknowledgements
    /// allow and return the partitions whose frontier moved, ordered by
    /// partition.
    ///
    /// A returned offset is never lower than one previously returned for the
    /// same partition, and a range is reported at most once.
    pub fn offsets_to_commit(&self) -> Result<Vec<PartitionOffset>, ConsumerError> {
        let dirty = std::mem::take(
            &mut *self
                .dirty
                .lock()
                .map_err(|_| ConsumerError::LockPoisoned("drain dirty partitions"))?,
        );

        let mut offsets = Vec::with_capacity(dirty.len());
        for partition in dirty {
            let Some(window) = self.existing_window(partition)? else {
                continue;
            };
            let mut window = window
                .lock()
                .map_err(|_| ConsumerError::LockPoisoned("fold partition window"))?;
            if let Some(offset) = window.fold() {
                offsets.push(PartitionOffset { partition, offset });
            }
        }
        Ok(offsets)
    }

    /// Number of offsets dispatched on `partition` and not yet acknowledged.
    pub fn pending_count(&self, partition: PartitionId) -> Result<usize, ConsumerError> {
        match self.existing_window(partition)? {
            Some(window) => Ok(window
                .lock()
                .map_err(|_| ConsumerError::LockPoisoned("pending count"))?
                .pending
                .len()),
            None => Ok(0),
        }
    }

    /// Offsets dispatched and not yet acknowledged, across all partitions.
    pub fn pending_total(&self) -> Result<usize, ConsumerError> {
        let mut total = 0;
        for partition in self.partitions()? {
            total += self.pending_count(partition)?;
        }
        Ok(total)
    }

    /// Last offset reported for `partition` by `offsets_to_commit`.
    pub fn committed(&self, partition: PartitionId) -> Result<Option<u64>, ConsumerError> {
        match self.existing_window(partition)? {
            Some(window) => Ok(window
                .lock()
                .map_err(|_| ConsumerError::LockPoisoned("committed offset"))?
                .committed),
            None => Ok(None),
        }
    }

    /// Partitions the tracker has seen, in ascending order.
    pub fn partitions(&self) -> Result<Vec<PartitionId>, ConsumerError> {
        let partitions = self
            .partitions
            .read()
            .map_err(|_| ConsumerError::LockPoisoned("list partitions"))?;
        let mut ids: Vec<_> = partitions.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
