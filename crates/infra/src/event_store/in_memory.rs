use std::collections::HashMap;
use std::sync::RwLock;

use foodtrust_core::{BatchId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// In-memory append-only event store.
///
/// Intended for tests/dev and the offline CLI. The write lock makes every
/// compare-and-append atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<BatchId, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    /// Total number of events across all streams.
    pub fn event_count(&self) -> usize {
        self.streams
            .read()
            .map(|s| s.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        batch_id: &BatchId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        if let Some(idx) = events.iter().position(|e| &e.batch_id != batch_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "event at index {idx} does not belong to stream {batch_id}"
            )));
        }

        let mut streams = self
            .streams
            .write()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let current = streams
            .get(batch_id)
            .map(|s| Self::current_version(s))
            .unwrap_or(0);

        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        let stream = streams.entry(batch_id.clone()).or_default();

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            let stored = StoredEvent {
                event_id: e.event_id,
                batch_id: e.batch_id,
                sequence_number: next,
                kind: e.kind,
                actor: e.actor,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            };
            next += 1;
            stream.push(stored.clone());
            committed.push(stored);
        }

        Ok(committed)
    }

    fn load_stream(&self, batch_id: &BatchId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        Ok(streams.get(batch_id).cloned().unwrap_or_default())
    }

    fn stream_ids(&self) -> Result<Vec<BatchId>, EventStoreError> {
        let streams = self
            .streams
            .read()
            .map_err(|_| EventStoreError::Unavailable("lock poisoned".to_string()))?;

        let mut ids: Vec<BatchId> = streams.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
