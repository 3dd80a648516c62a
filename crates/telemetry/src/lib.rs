//! Sensor telemetry domain: readings, ingestion messages and windowed analytics.
//!
//! Pure data and computation; storage lives in `foodtrust-infra`.

pub mod analytics;
pub mod reading;

pub use analytics::{MetricSummary, SensorAnalytics, summarize};
pub use reading::{SensorLocation, SensorReading, TelemetryMessage, UNKNOWN_DEVICE};
