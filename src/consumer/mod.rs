//! Consumer - the per-subscription consumption loop.
//!
//! - `Consumer` - receive → convert → dispatch, gated by inflight permits and
//!   a rate limiter, with offset tracking for safe commits
//! - `ConsumerThread` - runs a consumer on a dedicated named thread
//!
//! ## Lifecycle
//!
//! ```text
//!   Running ──stop_consuming()──▶ Stopping ──loop exits, receiver.stop()──▶ Stopped
//! ```

mod consumer;
mod thread;

pub use consumer::{Consumer, ConsumerState, Iteration};
pub use thread::ConsumerThread;
