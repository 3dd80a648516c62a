//! Append-only event log.
//!
//! One ordered stream per batch; appending is the only write path into batch
//! history.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_stream};
