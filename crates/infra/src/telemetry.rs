//! Sensor telemetry store: batch-checked recording plus windowed retrieval.

use chrono::{DateTime, Utc};

use foodtrust_core::BatchId;
use foodtrust_telemetry::{SensorAnalytics, SensorReading, summarize};

use crate::error::{LedgerError, LedgerResult};
use crate::event_store::EventStore;
use crate::sensor_store::SensorStore;

/// Readings per batch, gated on the batch existing in the event log.
pub struct TelemetryStore<E, S> {
    events: E,
    readings: S,
    recent_default: usize,
    window_default: u32,
}

impl<E, S> TelemetryStore<E, S>
where
    E: EventStore,
    S: SensorStore,
{
    pub fn new(events: E, readings: S) -> Self {
        Self {
            events,
            readings,
            recent_default: 10,
            window_default: 7,
        }
    }

    /// Defaults used when callers omit `n` / `window_days`.
    pub fn with_defaults(mut self, recent: usize, window_days: u32) -> Self {
        self.recent_default = recent;
        self.window_default = window_days;
        self
    }

    fn ensure_batch(&self, batch_id: &BatchId) -> LedgerResult<()> {
        if self.events.load_stream(batch_id)?.is_empty() {
            return Err(LedgerError::NotFound(format!("batch {batch_id}")));
        }
        Ok(())
    }

    /// Store a reading. Values are kept as-is; only the device id is normalized.
    pub fn record(&self, batch_id: &BatchId, mut reading: SensorReading) -> LedgerResult<()> {
        self.ensure_batch(batch_id)?;
        reading.normalize();
        self.readings.insert(batch_id, reading)?;
        Ok(())
    }

    /// The `n` most recent readings, newest first.
    pub fn recent_n(&self, batch_id: &BatchId, n: Option<usize>) -> LedgerResult<Vec<SensorReading>> {
        self.ensure_batch(batch_id)?;
        let n = n.unwrap_or(self.recent_default);
        Ok(self.readings.recent(batch_id, n)?)
    }

    /// Readings with `from <= timestamp <= to`, oldest first.
    pub fn range(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<SensorReading>> {
        self.ensure_batch(batch_id)?;
        if from > to {
            return Err(LedgerError::validation("from", "must not be after 'to'"));
        }
        Ok(self.readings.range(batch_id, from, to)?)
    }

    /// The latest `limit` readings inside `[from, to]`, returned oldest first.
    pub fn query(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> LedgerResult<Vec<SensorReading>> {
        let mut in_range = self.range(batch_id, from, to)?;
        let skip = in_range.len().saturating_sub(limit);
        in_range.drain(..skip);
        Ok(in_range)
    }

    pub fn aggregate(&self, batch_id: &BatchId, window_days: Option<u32>) -> LedgerResult<SensorAnalytics> {
        self.aggregate_at(batch_id, window_days, Utc::now())
    }

    /// `aggregate` against an explicit clock.
    pub fn aggregate_at(
        &self,
        batch_id: &BatchId,
        window_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> LedgerResult<SensorAnalytics> {
        self.ensure_batch(batch_id)?;
        let readings = self.readings.readings(batch_id)?;
        Ok(summarize(&readings, window_days.unwrap_or(self.window_default), now))
    }
}
