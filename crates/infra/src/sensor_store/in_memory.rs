use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use foodtrust_core::BatchId;
use foodtrust_telemetry::SensorReading;

use super::{SensorStore, SensorStoreError};

/// In-memory sensor store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySensorStore {
    readings: RwLock<HashMap<BatchId, Vec<SensorReading>>>,
}

impl InMemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorStore for InMemorySensorStore {
    fn insert(&self, batch_id: &BatchId, reading: SensorReading) -> Result<(), SensorStoreError> {
        let mut map = self
            .readings
            .write()
            .map_err(|_| SensorStoreError::Unavailable("lock poisoned".to_string()))?;

        let list = map.entry(batch_id.clone()).or_default();
        // After any readings with the same timestamp, so ties keep arrival order.
        let at = list.partition_point(|r| r.timestamp <= reading.timestamp);
        list.insert(at, reading);
        Ok(())
    }

    fn readings(&self, batch_id: &BatchId) -> Result<Vec<SensorReading>, SensorStoreError> {
        let map = self
            .readings
            .read()
            .map_err(|_| SensorStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(map.get(batch_id).cloned().unwrap_or_default())
    }

    fn recent(&self, batch_id: &BatchId, n: usize) -> Result<Vec<SensorReading>, SensorStoreError> {
        let map = self
            .readings
            .read()
            .map_err(|_| SensorStoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(map
            .get(batch_id)
            .map(|list| list.iter().rev().take(n).cloned().collect())
            .unwrap_or_default())
    }

    fn range(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, SensorStoreError> {
        let map = self
            .readings
            .read()
            .map_err(|_| SensorStoreError::Unavailable("lock poisoned".to_string()))?;
        let Some(list) = map.get(batch_id) else {
            return Ok(vec![]);
        };
        let start = list.partition_point(|r| r.timestamp < from);
        let end = list.partition_point(|r| r.timestamp <= to);
        Ok(list.get(start..end.max(start)).map(<[_]>::to_vec).unwrap_or_default())
    }
}
