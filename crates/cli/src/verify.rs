//! Offline replay of an exported event log.
//!
//! Each batch stream must be numbered 1..=N with no gaps; a stream that passes
//! is decoded and folded into the snapshot the ledger would serve.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use foodtrust_batch::{Batch, fold};
use foodtrust_core::BatchId;
use foodtrust_infra::command_dispatcher::decode_stream;
use foodtrust_infra::event_store::{StoredEvent, validate_stream};

#[derive(Debug, Serialize)]
pub struct BatchVerification {
    pub batch_id: BatchId,
    pub events: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Batch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub batches: Vec<BatchVerification>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.batches.iter().all(|b| b.error.is_none())
    }
}

/// One `StoredEvent` JSON object per line; blank lines are skipped.
pub fn parse_log(input: &str) -> Result<Vec<StoredEvent>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<StoredEvent>(line).with_context(|| format!("line {}", idx + 1))
        })
        .collect()
}

pub fn verify_events(events: Vec<StoredEvent>) -> VerifyReport {
    let mut streams: BTreeMap<BatchId, Vec<StoredEvent>> = BTreeMap::new();
    for event in events {
        streams.entry(event.batch_id.clone()).or_default().push(event);
    }

    let batches = streams
        .into_iter()
        .map(|(batch_id, mut stream)| {
            stream.sort_by_key(|e| e.sequence_number);
            let events = stream.len();
            match replay(&batch_id, &stream) {
                Ok(snapshot) => {
                    info!(batch_id = %batch_id, events, "stream verified");
                    BatchVerification {
                        batch_id,
                        events,
                        snapshot: Some(snapshot),
                        error: None,
                    }
                }
                Err(err) => {
                    warn!(batch_id = %batch_id, error = %err, "stream rejected");
                    BatchVerification {
                        batch_id,
                        events,
                        snapshot: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect();

    VerifyReport { batches }
}

fn replay(batch_id: &BatchId, stream: &[StoredEvent]) -> Result<Batch> {
    validate_stream(batch_id, stream)?;
    let decoded = decode_stream(stream)?;
    Ok(fold(batch_id.clone(), &decoded))
}
