//! Consumer integration tests.
//!
//! Exercises the consumption loop against scripted and in-memory sources:
//! - Permit accounting on every receive outcome
//! - Inflight bound and backpressure
//! - Stop and hot subscription updates
//! - End-to-end delivery and offset commits over a partitioned log

mod support;
mod admission;
mod lifecycle;
