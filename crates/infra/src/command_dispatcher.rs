//! Command execution pipeline for batch streams.
//!
//! ```text
//! BatchCommand
//!   ↓
//! 0. Take the per-batch lock (same batch: serialized; different batches: independent)
//!   ↓
//! 1. Load the batch stream and check it is numbered 1..=N
//!   ↓
//! 2. Rehydrate the aggregate (fold)
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with ExpectedVersion::Exact(N) (retry from 1 on conflict)
//!   ↓
//! 5. Refresh the snapshot cache from the full log
//!   ↓
//! 6. Emit committed events to the mirror (failures logged, never propagated)
//! ```
//!
//! The lock gives linearizable appends inside one process; the optimistic check
//! covers several processes sharing one durable store. A lock-table entry lives
//! only while some dispatch for that batch holds it, so ids that never resolve
//! to a batch leave nothing behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use uuid::Uuid;

use foodtrust_batch::{Batch, BatchCommand, BatchEvent};
use foodtrust_core::{Aggregate, AggregateRoot, BatchId, ExpectedVersion};
use foodtrust_events::Command;

use crate::error::{LedgerError, LedgerResult};
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent, validate_stream};
use crate::mirror::LedgerMirror;
use crate::read_model::SnapshotCache;

/// Result of a successfully dispatched command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// Snapshot after the append (equal to the fold of the full log).
    pub batch: Batch,
    /// Newly committed events, in sequence order.
    pub committed: Vec<StoredEvent>,
}

pub struct CommandDispatcher<S, C, M> {
    store: S,
    cache: C,
    mirror: M,
    max_retries: u32,
    locks: Mutex<HashMap<BatchId, Arc<Mutex<()>>>>,
}

impl<S, C, M> CommandDispatcher<S, C, M> {
    pub fn new(store: S, cache: C, mirror: M) -> Self {
        Self {
            store,
            cache,
            mirror,
            max_retries: 3,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Optimistic-conflict retries per command (after the first attempt).
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    fn lock_for(&self, batch_id: &BatchId) -> LedgerResult<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| LedgerError::storage("batch lock table poisoned"))?;
        Ok(locks.entry(batch_id.clone()).or_default().clone())
    }

    /// Drop the table entry once the caller holds the last outside reference.
    fn release_lock(&self, batch_id: &BatchId, lock: Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        let unused = locks
            .get(batch_id)
            .is_some_and(|held| Arc::ptr_eq(held, &lock) && Arc::strong_count(held) == 2);
        if unused {
            locks.remove(batch_id);
        }
    }

    /// Batches with a live lock-table entry.
    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }
}

impl<S, C, M> CommandDispatcher<S, C, M>
where
    S: EventStore,
    C: SnapshotCache,
    M: LedgerMirror,
{
    /// Run a command against its target batch.
    ///
    /// Domain rejections surface as their `LedgerError` kind and append nothing.
    /// Conflicts are retried up to `max_retries` times, then reported as
    /// `Conflict`.
    pub fn dispatch(&self, command: BatchCommand) -> LedgerResult<CommandOutcome> {
        let batch_id = command.target_batch_id().clone();
        let lock = self.lock_for(&batch_id)?;
        let result = match lock.lock() {
            Ok(_guard) => self.dispatch_locked(&batch_id, &command),
            Err(_) => Err(LedgerError::storage(format!("lock for batch {batch_id} poisoned"))),
        };
        self.release_lock(&batch_id, lock);
        result
    }

    fn dispatch_locked(&self, batch_id: &BatchId, command: &BatchCommand) -> LedgerResult<CommandOutcome> {
        let mut attempt = 0u32;
        loop {
            // 1) Load history
            let history = self.store.load_stream(batch_id)?;
            validate_stream(batch_id, &history)?;
            let expected = match history.len() {
                0 => ExpectedVersion::NoStream,
                n => ExpectedVersion::Exact(n as u64),
            };

            // 2) Rehydrate
            let mut batch = Batch::empty(batch_id.clone());
            let past = decode_stream(&history)?;
            for ev in &past {
                batch.apply(ev);
            }

            // 3) Decide
            let decided = batch.handle(command)?;
            if decided.is_empty() {
                return Ok(CommandOutcome {
                    batch,
                    committed: vec![],
                });
            }

            // 4) Persist
            let uncommitted = decided
                .iter()
                .map(|ev| UncommittedEvent::from_typed(batch_id.clone(), Uuid::now_v7(), ev))
                .collect::<Result<Vec<_>, _>>()?;

            match self.store.append(batch_id, uncommitted, expected) {
                Ok(committed) => {
                    // 5) Snapshot = fold(full log as of this append), from the
                    // stored form so the cache matches a later rebuild exactly.
                    match decode_stream(&committed) {
                        Ok(stored) => {
                            for ev in &stored {
                                batch.apply(ev);
                            }
                            self.cache.put(batch.clone());
                        }
                        Err(err) => {
                            warn!(batch_id = %batch_id, error = %err, "committed events undecodable, dropping snapshot");
                            for ev in &decided {
                                batch.apply(ev);
                            }
                            self.cache.invalidate(batch_id);
                        }
                    }

                    // 6) Mirror
                    for stored in &committed {
                        if let Err(err) = self.mirror.emit(&stored.to_envelope()) {
                            warn!(
                                batch_id = %batch_id,
                                sequence_number = stored.sequence_number,
                                error = %err,
                                "ledger mirror emit failed"
                            );
                        }
                    }

                    debug!(
                        batch_id = %batch_id,
                        version = batch.version(),
                        committed = committed.len(),
                        "command committed"
                    );
                    return Ok(CommandOutcome { batch, committed });
                }
                Err(EventStoreError::Concurrency(msg)) if attempt < self.max_retries => {
                    attempt += 1;
                    warn!(batch_id = %batch_id, attempt, reason = %msg, "append conflict, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Fold the stored log from scratch. `None` when the batch has no events.
    pub fn rebuild(&self, batch_id: &BatchId) -> LedgerResult<Option<Batch>> {
        let history = self.store.load_stream(batch_id)?;
        if history.is_empty() {
            return Ok(None);
        }
        validate_stream(batch_id, &history)?;
        let events = decode_stream(&history)?;
        Ok(Some(foodtrust_batch::fold(batch_id.clone(), &events)))
    }

    /// Cached snapshot, rebuilt (and re-cached) on a miss.
    pub fn snapshot(&self, batch_id: &BatchId) -> LedgerResult<Batch> {
        if let Some(cached) = self.cache.get(batch_id) {
            return Ok(cached);
        }
        let rebuilt = self
            .rebuild(batch_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("batch {batch_id}")))?;
        self.cache.put(rebuilt.clone());
        Ok(rebuilt)
    }
}

/// Decode stored payloads into domain events, in sequence order.
pub fn decode_stream(stream: &[StoredEvent]) -> LedgerResult<Vec<BatchEvent>> {
    let mut sorted: Vec<&StoredEvent> = stream.iter().collect();
    sorted.sort_by_key(|e| e.sequence_number);
    sorted
        .into_iter()
        .map(|stored| stored.decode::<BatchEvent>().map_err(LedgerError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::mirror::{MirrorError, MirrorRecord, NoopMirror};
    use crate::read_model::InMemorySnapshotCache;
    use chrono::{NaiveDate, Utc};
    use foodtrust_auth::{Principal, Role};
    use foodtrust_batch::{CreateBatch, FarmLocation, NewBatch, Quantity, QuantityUnit, RecallBatch};
    use foodtrust_core::{ActorId, OrganizationId};

    fn farmer() -> Principal {
        Principal::new(
            ActorId::parse("alice").unwrap(),
            OrganizationId::parse("GreenValley").unwrap(),
            Role::Farmer,
        )
    }

    fn create(batch_id: &BatchId) -> BatchCommand {
        BatchCommand::CreateBatch(CreateBatch {
            batch_id: batch_id.clone(),
            principal: farmer(),
            fields: NewBatch {
                crop: "Tomatoes".into(),
                variety: None,
                harvest_date: NaiveDate::from_ymd_opt(2024, 1, 15),
                farm_location: Some(FarmLocation {
                    latitude: 10.0,
                    longitude: 20.0,
                    address: None,
                    farm_name: None,
                }),
                quantity: Some(Quantity::new(500.0, QuantityUnit::Kg)),
                quality: None,
            },
            occurred_at: Utc::now(),
        })
    }

    fn recall(batch_id: &BatchId) -> BatchCommand {
        BatchCommand::RecallBatch(RecallBatch {
            batch_id: batch_id.clone(),
            principal: Principal::new(
                ActorId::parse("inspector").unwrap(),
                OrganizationId::parse("FDA").unwrap(),
                Role::Regulator,
            ),
            reason: "Listeria".into(),
            recall_date: Utc::now(),
            affected_batches: vec![batch_id.clone()],
            occurred_at: Utc::now(),
        })
    }

    struct FailingMirror;

    impl LedgerMirror for FailingMirror {
        fn emit(&self, _record: &MirrorRecord) -> Result<(), MirrorError> {
            Err(MirrorError::Publish("replica offline".into()))
        }
    }

    #[test]
    fn dispatch_appends_and_caches_snapshot() {
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            InMemorySnapshotCache::new(),
            NoopMirror,
        );
        let id = BatchId::parse("B1").unwrap();

        let outcome = dispatcher.dispatch(create(&id)).unwrap();
        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(outcome.committed[0].sequence_number, 1);
        assert_eq!(dispatcher.cache().get(&id), Some(outcome.batch.clone()));
        assert_eq!(dispatcher.rebuild(&id).unwrap(), Some(outcome.batch));
    }

    #[test]
    fn rejected_command_appends_nothing() {
        let store = Arc::new(InMemoryEventStore::new());
        let dispatcher = CommandDispatcher::new(store.clone(), InMemorySnapshotCache::new(), NoopMirror);
        let id = BatchId::parse("B1").unwrap();

        dispatcher.dispatch(create(&id)).unwrap();
        let err = dispatcher.dispatch(create(&id)).unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(store.load_stream(&id).unwrap().len(), 1);
    }

    #[test]
    fn mirror_failure_does_not_fail_the_append() {
        let store = Arc::new(InMemoryEventStore::new());
        let dispatcher = CommandDispatcher::new(store.clone(), InMemorySnapshotCache::new(), FailingMirror);
        let id = BatchId::parse("B1").unwrap();

        dispatcher.dispatch(create(&id)).unwrap();
        assert_eq!(store.load_stream(&id).unwrap().len(), 1);
    }

    #[test]
    fn snapshot_miss_rebuilds_from_log() {
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            InMemorySnapshotCache::new(),
            NoopMirror,
        );
        let id = BatchId::parse("B1").unwrap();
        dispatcher.dispatch(create(&id)).unwrap();

        dispatcher.cache().invalidate(&id);
        let snapshot = dispatcher.snapshot(&id).unwrap();
        assert_eq!(snapshot.crop(), "Tomatoes");
        assert!(dispatcher.cache().get(&id).is_some());

        let missing = BatchId::parse("nope").unwrap();
        assert_eq!(dispatcher.snapshot(&missing).unwrap_err().code(), "not_found");
    }

    #[test]
    fn lock_table_only_holds_in_flight_batches() {
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            InMemorySnapshotCache::new(),
            NoopMirror,
        );

        for n in 0..100 {
            let unknown = BatchId::parse(&format!("ghost-{n}")).unwrap();
            assert_eq!(dispatcher.dispatch(recall(&unknown)).unwrap_err().code(), "not_found");
        }
        assert_eq!(dispatcher.tracked_locks(), 0);

        let id = BatchId::parse("B1").unwrap();
        dispatcher.dispatch(create(&id)).unwrap();
        dispatcher.dispatch(recall(&id)).unwrap();
        assert_eq!(dispatcher.tracked_locks(), 0);
    }

    #[test]
    fn concurrent_dispatches_share_one_lock_and_release_it() {
        let store = Arc::new(InMemoryEventStore::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store.clone(), InMemorySnapshotCache::new(), NoopMirror));
        let id = BatchId::parse("B1").unwrap();
        dispatcher.dispatch(create(&id)).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                let id = id.clone();
                std::thread::spawn(move || dispatcher.dispatch(recall(&id)).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sequence: Vec<u64> = store.load_stream(&id).unwrap().iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequence, (1..=9).collect::<Vec<_>>());
        assert_eq!(dispatcher.tracked_locks(), 0);
    }
}
