//! Background workers with an explicit spawn/shutdown lifecycle.

pub mod telemetry_ingest;

pub use telemetry_ingest::{IngestStats, TelemetryIngestWorker, WorkerHandle};
