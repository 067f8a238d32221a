//! Periodic persistence of commit offsets.
//!
//! The committer thread polls each registered source for its newly safe
//! offsets and writes them to an `OffsetStore`. Stopping the thread runs one
//! last pass so offsets acknowledged during shutdown are not lost.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::CommitError;
use crate::message::{PartitionId, PartitionOffset};

/// Something that can report offsets that became safe to commit.
pub trait OffsetSource: Send + Sync {
    fn subscription_id(&self) -> String;

    fn offsets_to_commit(&self) -> Vec<PartitionOffset>;
}

/// Destination for commit offsets (the log's offset store).
pub trait OffsetStore: Send + Sync {
    fn commit(&self, subscription_id: &str, offsets: &[PartitionOffset]) -> Result<(), CommitError>;
}

/// Offset store kept in memory, mainly for tests and single-process setups.
///
/// Cloning creates another handle to the same storage.
#[derive(Clone, Default)]
pub struct InMemoryOffsetStore {
    offsets: Arc<RwLock<HashMap<String, HashMap<PartitionId, u64>>>>,
    commits: Arc<RwLock<usize>>,
}

impl InMemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest committed offset for a subscription's partition.
    pub fn committed(&self, subscription_id: &str, partition: PartitionId) -> Option<u64> {
        self.offsets
            .read()
            .ok()?
            .get(subscription_id)?
            .get(&partition)
            .copied()
    }

    /// Number of non-empty commit calls received.
    pub fn commit_count(&self) -> usize {
        self.commits.read().map(|c| *c).unwrap_or_default()
    }
}

impl OffsetStore for InMemoryOffsetStore {
    fn commit(&self, subscription_id: &str, offsets: &[PartitionOffset]) -> Result<(), CommitError> {
        if offsets.is_empty() {
            return Ok(());
        }
        let mut stored = self.offsets.write().map_err(|_| CommitError::LockPoisoned)?;
        let partitions = stored.entry(subscription_id.to_string()).or_default();
        for po in offsets {
            let entry = partitions.entry(po.partition).or_insert(po.offset);
            *entry = (*entry).max(po.offset);
        }
        *self.commits.write().map_err(|_| CommitError::LockPoisoned)? += 1;
        Ok(())
    }
}

/// Statistics from the committer thread.
#[derive(Debug, Default, Clone)]
pub struct CommitterStats {
    pub passes: usize,
    pub offsets_committed: usize,
    pub commit_failures: usize,
}

/// Moves offsets from sources into a store, one pass at a time.
///
/// Polling a source advances its tracker, so a failed write cannot simply be
/// asked for again. Offsets from a failed write are held back per source and
/// merged into that source's next attempt, keeping the highest offset per
/// partition.
pub struct OffsetCommitter {
    sources: Vec<Arc<dyn OffsetSource>>,
    held_back: HashMap<String, BTreeMap<PartitionId, u64>>,
    stats: CommitterStats,
}

impl OffsetCommitter {
    pub fn new(sources: Vec<Arc<dyn OffsetSource>>) -> Self {
        Self {
            sources,
            held_back: HashMap::new(),
            stats: CommitterStats::default(),
        }
    }

    /// Commit every source's pending offsets once.
    pub fn pass<S: OffsetStore + ?Sized>(&mut self, store: &S) {
        self.stats.passes += 1;
        for source in &self.sources {
            let subscription = source.subscription_id();
            let mut merged = self.held_back.remove(&subscription).unwrap_or_default();
            for po in source.offsets_to_commit() {
                let entry = merged.entry(po.partition).or_insert(po.offset);
                *entry = (*entry).max(po.offset);
            }
            if merged.is_empty() {
                continue;
            }

            let offsets: Vec<PartitionOffset> = merged
                .iter()
                .map(|(&partition, &offset)| PartitionOffset { partition, offset })
                .collect();
            match store.commit(&subscription, &offsets) {
                Ok(()) => {
                    tracing::debug!(subscription = %subscription, count = offsets.len(), "committed offsets");
                    self.stats.offsets_committed += offsets.len();
                }
                Err(err) => {
                    tracing::error!(subscription = %subscription, error = %err, "offset commit failed, retrying next pass");
                    self.stats.commit_failures += 1;
                    self.held_back.insert(subscription, merged);
                }
            }
        }
    }

    /// Offsets waiting to be retried after a failed write.
    pub fn held_back(&self, subscription_id: &str) -> Vec<PartitionOffset> {
        self.held_back
            .get(subscription_id)
            .map(|held| {
                held.iter()
                    .map(|(&partition, &offset)| PartitionOffset { partition, offset })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stats(&self) -> &CommitterStats {
        &self.stats
    }

    pub fn into_stats(self) -> CommitterStats {
        self.stats
    }
}

/// A background thread that periodically commits offsets.
///
/// ## Example
///
/// ```ignore
/// let store = InMemoryOffsetStore::new();
/// let committer = OffsetCommitterThread::spawn(
///     vec![consumer.clone() as Arc<dyn OffsetSource>],
///     store.clone(),
///     Duration::from_millis(500),
/// );
///
/// // ... consume ...
///
/// let stats = committer.stop();
/// println!("committed {} offsets", stats.offsets_committed);
/// ```
pub struct OffsetCommitterThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<CommitterStats>>,
}

impl OffsetCommitterThread {
    pub fn spawn<S>(sources: Vec<Arc<dyn OffsetSource>>, store: S, interval: Duration) -> Self
    where
        S: OffsetStore + 'static,
    {
        let (stop_tx, stop_rx) = channel();

        let handle = thread::spawn(move || {
            let mut committer = OffsetCommitter::new(sources);

            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                committer.pass(&store);
            }

            committer.pass(&store);
            committer.into_stats()
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Signal the committer to stop, wait for its final pass, and return its
    /// statistics.
    pub fn stop(mut self) -> CommitterStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            CommitterStats::default()
        }
    }
}

impl Drop for OffsetCommitterThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}
