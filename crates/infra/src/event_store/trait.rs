use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use foodtrust_core::{ActorId, BatchId, ExpectedVersion};
use foodtrust_events::{EventEnvelope, EventKind};
use std::sync::Arc;

/// An event ready to be appended to a batch stream (no sequence number yet).
///
/// Lifecycle:
///
/// 1. **Domain event**: produced by `Batch::handle()`
/// 2. **UncommittedEvent**: serialized payload plus audit metadata
/// 3. **StoredEvent**: persisted with an assigned `sequence_number`
/// 4. **EventEnvelope**: handed to the ledger mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: Uuid,
    pub batch_id: BatchId,
    pub kind: EventKind,
    pub actor: ActorId,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

/// A stored event in an append-only batch stream.
///
/// Sequence numbers are assigned by the store during append and are:
/// - **Gap-free**: 1, 2, 3, ... per batch
/// - **Stream-scoped**: independent per `batch_id`
/// - **Immutable**: once assigned, never reused or changed
///
/// `occurred_at` is advisory. Anything that needs an order uses `sequence_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub batch_id: BatchId,

    /// Position in the batch stream, starting at 1.
    pub sequence_number: u64,

    pub kind: EventKind,
    pub actor: ActorId,

    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,

    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn stream_version(&self) -> u64 {
        self.sequence_number
    }

    /// Outbound record for the ledger mirror.
    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.batch_id.clone(),
            self.sequence_number,
            self.kind,
            self.actor.clone(),
            self.occurred_at,
            self.payload.clone(),
        )
    }

    /// Deserialize the payload into a typed domain event.
    pub fn decode<E: DeserializeOwned>(&self) -> Result<E, EventStoreError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            EventStoreError::Serialization(format!(
                "batch {} seq {}: {e}",
                self.batch_id, self.sequence_number
            ))
        })
    }
}

/// Event store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to domain
/// errors (validation, transitions).
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Optimistic concurrency check failed (someone appended first).
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The append itself was malformed (mixed streams, wrong batch id).
    #[error("invalid append: {0}")]
    InvalidAppend(String),

    /// The backing store could not be reached or failed mid-operation.
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    #[error("event payload serialization failed: {0}")]
    Serialization(String),
}

/// Append-only, per-batch event store.
///
/// ## Append Semantics
///
/// `append()`:
/// - Validates that every event targets `batch_id`
/// - Checks optimistic concurrency against the current stream version
/// - Assigns sequence numbers starting at `current_version + 1`
/// - Persists all events atomically (all or nothing)
///
/// Content never makes an append fail; only storage problems and version
/// conflicts do.
///
/// ## Load Semantics
///
/// `load_stream()` returns every event in sequence order, or an empty vector if
/// the batch has no stream yet.
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        batch_id: &BatchId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Full stream, oldest first.
    fn load_stream(&self, batch_id: &BatchId) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Ids of every batch that has at least one event.
    fn stream_ids(&self) -> Result<Vec<BatchId>, EventStoreError>;

    /// Events with `occurred_at` inside `[from, to]`, in sequence order.
    ///
    /// Display only: never use the result for authority decisions.
    fn load_range(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        Ok(self
            .load_stream(batch_id)?
            .into_iter()
            .filter(|e| e.occurred_at >= from && e.occurred_at <= to)
            .collect())
    }

    /// Unconditionally append a single event, returning its sequence number.
    fn append_one(&self, event: UncommittedEvent) -> Result<u64, EventStoreError> {
        let batch_id = event.batch_id.clone();
        let stored = self.append(&batch_id, vec![event], ExpectedVersion::Any)?;
        stored
            .last()
            .map(|e| e.sequence_number)
            .ok_or_else(|| EventStoreError::InvalidAppend("store returned no events".to_string()))
    }
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        batch_id: &BatchId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(batch_id, events, expected_version)
    }

    fn load_stream(&self, batch_id: &BatchId) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_stream(batch_id)
    }

    fn stream_ids(&self) -> Result<Vec<BatchId>, EventStoreError> {
        (**self).stream_ids()
    }

    fn load_range(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).load_range(batch_id, from, to)
    }
}

impl UncommittedEvent {
    /// Wrap a typed domain event, capturing the metadata needed to decode it later.
    pub fn from_typed<E>(batch_id: BatchId, event_id: Uuid, event: &E) -> Result<Self, EventStoreError>
    where
        E: foodtrust_events::Event + Serialize,
    {
        let payload = serde_json::to_value(event)
            .map_err(|e| EventStoreError::Serialization(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            event_id,
            batch_id,
            kind: event.kind(),
            actor: event.actor().clone(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            payload,
        })
    }
}

/// Check that a loaded stream belongs to `batch_id` and is numbered 1..=N.
pub fn validate_stream(batch_id: &BatchId, stream: &[StoredEvent]) -> Result<(), EventStoreError> {
    for (idx, e) in stream.iter().enumerate() {
        if &e.batch_id != batch_id {
            return Err(EventStoreError::InvalidAppend(format!(
                "loaded stream for {batch_id} contains an event of {} at index {idx}",
                e.batch_id
            )));
        }
        let expected = idx as u64 + 1;
        if e.sequence_number != expected {
            return Err(EventStoreError::InvalidAppend(format!(
                "gap in stream {batch_id}: expected sequence {expected}, found {}",
                e.sequence_number
            )));
        }
    }
    Ok(())
}
