//! Cross-batch recall.
//!
//! Each affected batch gets its own `RECALL` event through the dispatcher, so
//! batches are updated independently and no cross-batch transaction exists.
//! Unknown ids are skipped and reported, never raised. Any other per-batch
//! failure is recorded in the result and the remaining batches still proceed.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use foodtrust_auth::{Permission, Principal, authorize};
use foodtrust_batch::{BatchCommand, RecallBatch};
use foodtrust_core::{BatchId, DomainError};

use crate::command_dispatcher::CommandDispatcher;
use crate::error::{LedgerError, LedgerResult};
use crate::event_store::EventStore;
use crate::mirror::LedgerMirror;
use crate::read_model::SnapshotCache;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallRequest {
    pub reason: String,
    pub affected_batch_ids: Vec<BatchId>,
    pub recall_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallResult {
    /// Length of the input list, duplicates included.
    pub requested_count: usize,
    /// Batches that received a `RECALL` event.
    pub affected_count: usize,
    pub affected: Vec<BatchId>,
    /// Ids that matched no batch.
    pub skipped: Vec<BatchId>,
    /// Batches whose `RECALL` event could not be recorded.
    #[serde(default)]
    pub failed: Vec<RecallFailure>,
}

impl RecallResult {
    /// True when no existing batch was left un-recalled.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecallFailure {
    pub batch_id: BatchId,
    /// Stable error code, see [`LedgerError::code`].
    pub code: String,
    pub message: String,
}

impl RecallFailure {
    fn new(batch_id: BatchId, err: &LedgerError) -> Self {
        Self {
            batch_id,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

pub struct RecallEngine<'a, S, C, M> {
    dispatcher: &'a CommandDispatcher<S, C, M>,
}

impl<'a, S, C, M> RecallEngine<'a, S, C, M>
where
    S: EventStore,
    C: SnapshotCache,
    M: LedgerMirror,
{
    pub fn new(dispatcher: &'a CommandDispatcher<S, C, M>) -> Self {
        Self { dispatcher }
    }

    /// Recall every existing batch in the request.
    ///
    /// Already-recalled batches are recalled again; the repeat is recorded as a
    /// new event. A batch that fails for any reason other than "not found" is
    /// listed in `failed` and does not stop the batches after it. Only
    /// authorization and request validation fail the call as a whole.
    pub fn initiate(&self, principal: &Principal, request: RecallRequest) -> LedgerResult<RecallResult> {
        authorize(principal, Permission::RecallInitiate).map_err(DomainError::from)?;
        if request.reason.trim().is_empty() {
            return Err(LedgerError::validation("reason", "is required"));
        }

        let requested_count = request.affected_batch_ids.len();
        let mut seen = HashSet::new();
        let unique: Vec<BatchId> = request
            .affected_batch_ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect();

        let mut affected = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();
        for batch_id in unique {
            let command = BatchCommand::RecallBatch(RecallBatch {
                batch_id: batch_id.clone(),
                principal: principal.clone(),
                reason: request.reason.clone(),
                recall_date: request.recall_date,
                affected_batches: request.affected_batch_ids.clone(),
                occurred_at: Utc::now(),
            });
            match self.dispatcher.dispatch(command) {
                Ok(_) => affected.push(batch_id),
                Err(LedgerError::NotFound(_)) => skipped.push(batch_id),
                Err(err) => {
                    warn!(batch_id = %batch_id, code = err.code(), error = %err, "recall failed for batch");
                    failed.push(RecallFailure::new(batch_id, &err));
                }
            }
        }

        info!(
            requested = requested_count,
            affected = affected.len(),
            skipped = skipped.len(),
            failed = failed.len(),
            reason = %request.reason,
            "recall completed"
        );

        Ok(RecallResult {
            requested_count,
            affected_count: affected.len(),
            affected,
            skipped,
            failed,
        })
    }
}
