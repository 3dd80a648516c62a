//! Redis Streams ledger mirror.
//!
//! Every committed event becomes one `XADD` entry on a single stream. The
//! dispatcher emits under the per-batch lock, so entries for one batch land in
//! sequence order.
//!
//! Entry fields: `batch_id`, `sequence_number`, `kind`, `actor`, `payload`
//! (the full record as JSON).

use std::sync::Arc;

use tracing::instrument;

use super::{LedgerMirror, MirrorError, MirrorRecord};

const DEFAULT_STREAM_KEY: &str = "foodtrust:ledger";

#[derive(Debug, Clone)]
pub struct RedisStreamsMirror {
    client: Arc<redis::Client>,
    stream_key: String,
}

impl RedisStreamsMirror {
    /// `redis_url` e.g. `redis://localhost:6379`; `stream_key` defaults to
    /// `foodtrust:ledger`.
    pub fn new(redis_url: impl AsRef<str>, stream_key: Option<String>) -> Result<Self, MirrorError> {
        let client =
            redis::Client::open(redis_url.as_ref()).map_err(|e| MirrorError::Publish(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            stream_key: stream_key.unwrap_or_else(|| DEFAULT_STREAM_KEY.to_string()),
        })
    }

    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Number of entries currently on the stream.
    pub fn len(&self) -> Result<u64, MirrorError> {
        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| MirrorError::Publish(e.to_string()))?;
        redis::cmd("XLEN")
            .arg(&self.stream_key)
            .query(&mut conn)
            .map_err(|e| MirrorError::Publish(format!("XLEN failed: {e}")))
    }

    pub fn is_empty(&self) -> Result<bool, MirrorError> {
        Ok(self.len()? == 0)
    }
}

impl LedgerMirror for RedisStreamsMirror {
    #[instrument(
        skip(self, record),
        fields(
            stream_key = %self.stream_key,
            batch_id = %record.batch_id(),
            sequence_number = record.sequence_number()
        ),
        err
    )]
    fn emit(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        let payload =
            serde_json::to_string(record).map_err(|e| MirrorError::Serialization(e.to_string()))?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| MirrorError::Publish(e.to_string()))?;

        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("*")
            .arg("batch_id")
            .arg(record.batch_id().as_str())
            .arg("sequence_number")
            .arg(record.sequence_number().to_string())
            .arg("kind")
            .arg(record.kind().as_str())
            .arg("actor")
            .arg(record.actor().as_str())
            .arg("payload")
            .arg(&payload)
            .query(&mut conn)
            .map_err(|e| MirrorError::Publish(format!("XADD failed: {e}")))?;

        Ok(())
    }
}
