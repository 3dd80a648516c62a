//! Postgres-backed sensor store (`sensor_readings` table).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use foodtrust_core::BatchId;
use foodtrust_telemetry::{SensorLocation, SensorReading};

use super::{SensorStore, SensorStoreError};
use crate::event_store::postgres::block_on;

#[derive(Debug, Clone)]
pub struct PostgresSensorStore {
    pool: Arc<PgPool>,
}

impl PostgresSensorStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, reading), fields(batch_id = %batch_id, device_id = %reading.device_id), err)]
    pub async fn insert_async(&self, batch_id: &BatchId, reading: &SensorReading) -> Result<(), SensorStoreError> {
        let location = reading
            .location
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| SensorStoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO sensor_readings (
                batch_id,
                device_id,
                temperature,
                humidity,
                location,
                additional_data,
                recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(batch_id.as_str())
        .bind(&reading.device_id)
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(location)
        .bind(&reading.additional_data)
        .bind(reading.timestamp)
        .execute(&*self.pool)
        .await
        .map_err(|e| unavailable("insert_reading", e))?;

        Ok(())
    }

    /// Ordered by timestamp, then by insertion id so ties keep arrival order.
    #[instrument(skip(self), fields(batch_id = %batch_id), err)]
    pub async fn readings_async(&self, batch_id: &BatchId) -> Result<Vec<SensorReading>, SensorStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT device_id, temperature, humidity, location, additional_data, recorded_at
            FROM sensor_readings
            WHERE batch_id = $1
            ORDER BY recorded_at ASC, id ASC
            "#,
        )
        .bind(batch_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| unavailable("load_readings", e))?;

        rows.iter().map(row_to_reading).collect()
    }
}

fn unavailable(operation: &str, err: sqlx::Error) -> SensorStoreError {
    SensorStoreError::Unavailable(format!("sqlx error in {operation}: {err}"))
}

fn row_to_reading(row: &sqlx::postgres::PgRow) -> Result<SensorReading, SensorStoreError> {
    let read = |e: sqlx::Error| SensorStoreError::Serialization(e.to_string());

    let location: Option<serde_json::Value> = row.try_get("location").map_err(read)?;
    let location = location
        .map(serde_json::from_value::<SensorLocation>)
        .transpose()
        .map_err(|e| SensorStoreError::Serialization(e.to_string()))?;
    let timestamp: DateTime<Utc> = row.try_get("recorded_at").map_err(read)?;

    Ok(SensorReading {
        device_id: row.try_get("device_id").map_err(read)?,
        temperature: row.try_get("temperature").map_err(read)?,
        humidity: row.try_get("humidity").map_err(read)?,
        location,
        additional_data: row.try_get("additional_data").map_err(read)?,
        timestamp,
    })
}

impl SensorStore for PostgresSensorStore {
    fn insert(&self, batch_id: &BatchId, reading: SensorReading) -> Result<(), SensorStoreError> {
        block_on(self.insert_async(batch_id, &reading), SensorStoreError::Unavailable)
    }

    fn readings(&self, batch_id: &BatchId) -> Result<Vec<SensorReading>, SensorStoreError> {
        block_on(self.readings_async(batch_id), SensorStoreError::Unavailable)
    }
}
