//! Time-ordered sensor reading storage, one list per batch.
//!
//! Readings may arrive out of order. Each one is inserted at its timestamp
//! position; earlier stored readings are never reordered relative to each other.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use foodtrust_core::BatchId;
use foodtrust_telemetry::SensorReading;

pub use in_memory::InMemorySensorStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSensorStore;

#[derive(Debug, Error)]
pub enum SensorStoreError {
    #[error("sensor store unavailable: {0}")]
    Unavailable(String),

    #[error("sensor reading serialization failed: {0}")]
    Serialization(String),
}

/// Storage for sensor readings. Batch existence is checked by the caller.
pub trait SensorStore: Send + Sync {
    fn insert(&self, batch_id: &BatchId, reading: SensorReading) -> Result<(), SensorStoreError>;

    /// All readings for a batch, oldest first.
    fn readings(&self, batch_id: &BatchId) -> Result<Vec<SensorReading>, SensorStoreError>;

    /// The `n` most recent readings, newest first.
    fn recent(&self, batch_id: &BatchId, n: usize) -> Result<Vec<SensorReading>, SensorStoreError> {
        let mut all = self.readings(batch_id)?;
        all.reverse();
        all.truncate(n);
        Ok(all)
    }

    /// Readings with `from <= timestamp <= to`, oldest first.
    fn range(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, SensorStoreError> {
        Ok(self
            .readings(batch_id)?
            .into_iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .collect())
    }
}

impl<S> SensorStore for Arc<S>
where
    S: SensorStore + ?Sized,
{
    fn insert(&self, batch_id: &BatchId, reading: SensorReading) -> Result<(), SensorStoreError> {
        (**self).insert(batch_id, reading)
    }

    fn readings(&self, batch_id: &BatchId) -> Result<Vec<SensorReading>, SensorStoreError> {
        (**self).readings(batch_id)
    }

    fn recent(&self, batch_id: &BatchId, n: usize) -> Result<Vec<SensorReading>, SensorStoreError> {
        (**self).recent(batch_id, n)
    }

    fn range(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, SensorStoreError> {
        (**self).range(batch_id, from, to)
    }
}
