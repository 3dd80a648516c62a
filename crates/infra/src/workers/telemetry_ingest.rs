use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use foodtrust_events::{EventBus, Subscription};
use foodtrust_telemetry::TelemetryMessage;

use crate::error::LedgerError;
use crate::event_store::EventStore;
use crate::sensor_store::SensorStore;
use crate::telemetry::TelemetryStore;

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<IngestStats>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) -> IngestStats {
        let _ = self.shutdown.send(());
        self.join
            .take()
            .and_then(|j| j.join().ok())
            .unwrap_or_default()
    }
}

/// What the worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub recorded: u64,
    /// Readings for batches that do not exist.
    pub dropped: u64,
    pub failed: u64,
}

/// Drains a telemetry subscription into a [`TelemetryStore`].
///
/// - Delivery order across devices is not assumed; the store inserts by timestamp
/// - Readings for unknown batches are logged and dropped
/// - Storage failures are logged; the worker keeps running
#[derive(Debug)]
pub struct TelemetryIngestWorker;

impl TelemetryIngestWorker {
    pub const NAME: &'static str = "telemetry-ingest";

    pub fn spawn<B, E, S>(bus: B, store: TelemetryStore<E, S>) -> io::Result<WorkerHandle>
    where
        B: EventBus<TelemetryMessage> + 'static,
        E: EventStore + 'static,
        S: SensorStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<TelemetryMessage> = bus.subscribe();

        let join = thread::Builder::new()
            .name(Self::NAME.to_string())
            .spawn(move || {
                // Keep the bus alive for the worker's lifetime.
                let _bus = bus;
                ingest_loop(sub, shutdown_rx, &store)
            })?;

        info!(worker = Self::NAME, "telemetry ingestion started");
        Ok(WorkerHandle {
            name: Self::NAME,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn ingest_loop<E, S>(
    sub: Subscription<TelemetryMessage>,
    shutdown_rx: mpsc::Receiver<()>,
    store: &TelemetryStore<E, S>,
) -> IngestStats
where
    E: EventStore,
    S: SensorStore,
{
    let tick = Duration::from_millis(250);
    let mut stats = IngestStats::default();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(TelemetryMessage { batch_id, reading }) => match store.record(&batch_id, reading) {
                Ok(()) => stats.recorded += 1,
                Err(LedgerError::NotFound(_)) => {
                    stats.dropped += 1;
                    warn!(worker = TelemetryIngestWorker::NAME, batch_id = %batch_id, "reading for unknown batch dropped");
                }
                Err(err) => {
                    stats.failed += 1;
                    warn!(worker = TelemetryIngestWorker::NAME, batch_id = %batch_id, error = %err, "failed to record reading");
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(
        worker = TelemetryIngestWorker::NAME,
        recorded = stats.recorded,
        dropped = stats.dropped,
        failed = stats.failed,
        "telemetry ingestion stopped"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::{InMemoryEventStore, UncommittedEvent};
    use crate::sensor_store::InMemorySensorStore;
    use chrono::Utc;
    use foodtrust_core::{ActorId, BatchId};
    use foodtrust_events::{EventKind, InMemoryEventBus};
    use foodtrust_telemetry::SensorReading;
    use std::sync::Arc;
    use std::time::Instant;
    use uuid::Uuid;

    #[test]
    fn worker_records_known_batches_and_drops_unknown_ones() {
        let events = Arc::new(InMemoryEventStore::new());
        let known = BatchId::parse("B1").unwrap();
        events
            .append_one(UncommittedEvent {
                event_id: Uuid::now_v7(),
                batch_id: known.clone(),
                kind: EventKind::Create,
                actor: ActorId::parse("alice").unwrap(),
                event_type: "batch.created".into(),
                event_version: 1,
                occurred_at: Utc::now(),
                payload: serde_json::json!({}),
            })
            .unwrap();
        let readings = Arc::new(InMemorySensorStore::new());
        let bus = Arc::new(InMemoryEventBus::<TelemetryMessage>::new());

        let handle =
            TelemetryIngestWorker::spawn(bus.clone(), TelemetryStore::new(events, readings.clone())).unwrap();

        for (batch, temp) in [("B1", 4.0), ("ghost", 9.0), ("B1", 5.0)] {
            bus.publish(TelemetryMessage {
                batch_id: BatchId::parse(batch).unwrap(),
                reading: SensorReading::new("dev-1", Utc::now()).with_temperature(temp),
            })
            .unwrap();
        }

        let started = Instant::now();
        while readings.readings(&known).unwrap().len() < 2 && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
        }

        let stats = handle.shutdown();
        assert_eq!(stats.recorded, 2);
        assert_eq!(stats.dropped, 1);
        assert_eq!(readings.readings(&known).unwrap().len(), 2);
    }
}
