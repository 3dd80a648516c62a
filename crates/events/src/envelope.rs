use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use foodtrust_core::{ActorId, BatchId};

use crate::EventKind;

/// Envelope for a committed event, carrying stream metadata.
///
/// This is the outbound record handed to mirrors and subscribers once an
/// append has succeeded.
///
/// Notes:
/// - **Append-only**: `sequence_number` is gap-free and strictly increasing per batch.
/// - `occurred_at` is display data; consumers must order by `sequence_number`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    batch_id: BatchId,

    /// Position in the batch stream, starting at 1.
    sequence_number: u64,

    kind: EventKind,
    actor: ActorId,
    occurred_at: DateTime<Utc>,

    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: Uuid,
        batch_id: BatchId,
        sequence_number: u64,
        kind: EventKind,
        actor: ActorId,
        occurred_at: DateTime<Utc>,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            batch_id,
            sequence_number,
            kind,
            actor,
            occurred_at,
            payload,
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn batch_id(&self) -> &BatchId {
        &self.batch_id
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}
