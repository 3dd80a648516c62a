//! Outbound ledger mirror.
//!
//! After an append commits, each stored event is emitted once, in sequence
//! order, to an optional tamper-evident replica. Emission is fire-and-forget: a
//! failing mirror is logged by the dispatcher and never blocks or rolls back the
//! primary append.

#[cfg(feature = "redis")]
pub mod redis_streams;

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use foodtrust_events::{EventBus, EventEnvelope};

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsMirror;

/// Outbound record handed to mirrors.
pub type MirrorRecord = EventEnvelope<JsonValue>;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("mirror publish failed: {0}")]
    Publish(String),

    #[error("mirror record serialization failed: {0}")]
    Serialization(String),
}

pub trait LedgerMirror: Send + Sync {
    fn emit(&self, record: &MirrorRecord) -> Result<(), MirrorError>;
}

impl<M> LedgerMirror for Arc<M>
where
    M: LedgerMirror + ?Sized,
{
    fn emit(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        (**self).emit(record)
    }
}

/// Mirror that drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMirror;

impl LedgerMirror for NoopMirror {
    fn emit(&self, _record: &MirrorRecord) -> Result<(), MirrorError> {
        Ok(())
    }
}

/// Mirror onto any `EventBus` (e.g. `InMemoryEventBus` in a single process).
#[derive(Debug)]
pub struct BusMirror<B> {
    bus: B,
}

impl<B> BusMirror<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B> LedgerMirror for BusMirror<B>
where
    B: EventBus<MirrorRecord>,
{
    fn emit(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        self.bus
            .publish(record.clone())
            .map_err(|e| MirrorError::Publish(format!("{e:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use foodtrust_core::{ActorId, BatchId};
    use foodtrust_events::{EventKind, InMemoryEventBus};
    use uuid::Uuid;

    #[test]
    fn bus_mirror_forwards_records_to_subscribers() {
        let bus: Arc<InMemoryEventBus<MirrorRecord>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let mirror = BusMirror::new(bus.clone());

        let record = EventEnvelope::new(
            Uuid::now_v7(),
            BatchId::parse("B1").unwrap(),
            1,
            EventKind::Create,
            ActorId::parse("alice").unwrap(),
            Utc::now(),
            serde_json::json!({"crop": "Tomatoes"}),
        );
        mirror.emit(&record).unwrap();

        let received = sub.try_recv().unwrap();
        assert_eq!(received, record);
    }
}
