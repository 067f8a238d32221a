//! Offset tracking and committing.
//!
//! - `OffsetCommitTracker` - folds out-of-order acknowledgements into a safe
//!   commit offset per partition
//! - `OffsetSource` / `OffsetStore` - the poll side and the persistence side
//! - `OffsetCommitterThread` - background thread connecting the two

mod committer;
mod tracker;

pub use committer::{
    CommitterStats, InMemoryOffsetStore, OffsetCommitter, OffsetCommitterThread, OffsetSource,
    OffsetStore,
};
pub use tracker::OffsetCommitTracker;
