use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use foodtrust_core::{BatchId, ValueObject};

/// Device id recorded when a reading arrives without one.
pub const UNKNOWN_DEVICE: &str = "unknown";

fn unknown_device() -> String {
    UNKNOWN_DEVICE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl ValueObject for SensorLocation {}

/// One immutable telemetry sample for a batch.
///
/// Values are stored as-is; range checking is left to presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default = "unknown_device")]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SensorLocation>,
    /// Device-supplied extras, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<serde_json::Value>,
    /// Readings without a device timestamp are stamped on arrival.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ValueObject for SensorReading {}

impl SensorReading {
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let mut reading = Self {
            device_id: device_id.into(),
            temperature: None,
            humidity: None,
            location: None,
            additional_data: None,
            timestamp,
        };
        reading.normalize();
        reading
    }

    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    pub fn with_humidity(mut self, percent: f64) -> Self {
        self.humidity = Some(percent);
        self
    }

    pub fn with_location(mut self, location: SensorLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Blank device ids become [`UNKNOWN_DEVICE`].
    pub fn normalize(&mut self) {
        let trimmed = self.device_id.trim();
        if trimmed.is_empty() {
            self.device_id = unknown_device();
        } else if trimmed.len() != self.device_id.len() {
            self.device_id = trimmed.to_string();
        }
    }
}

/// What the ingestion transport delivers: a reading addressed to a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub batch_id: BatchId,
    pub reading: SensorReading,
}
