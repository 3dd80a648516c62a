use serde::{Deserialize, Serialize};

/// Capability required by a ledger operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "batch.create")]
    BatchCreate,
    #[serde(rename = "batch.update")]
    BatchUpdate,
    #[serde(rename = "batch.transfer")]
    BatchTransfer,
    #[serde(rename = "sensor.record")]
    SensorRecord,
    #[serde(rename = "recall.initiate")]
    RecallInitiate,
    #[serde(rename = "compliance.read")]
    ComplianceRead,
    /// Read any batch regardless of ownership.
    #[serde(rename = "batch.read_any")]
    BatchReadAny,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Permission::BatchCreate => "batch.create",
            Permission::BatchUpdate => "batch.update",
            Permission::BatchTransfer => "batch.transfer",
            Permission::SensorRecord => "sensor.record",
            Permission::RecallInitiate => "recall.initiate",
            Permission::ComplianceRead => "compliance.read",
            Permission::BatchReadAny => "batch.read_any",
        }
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
