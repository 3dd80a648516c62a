//! Disposable read models derived from the event log.

pub mod snapshot_cache;

pub use snapshot_cache::{InMemorySnapshotCache, SnapshotCache};
