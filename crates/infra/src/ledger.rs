//! `ProvenanceLedger`: the single entry point an API layer talks to.
//!
//! Wires the dispatcher, recall engine, telemetry store and query views over one
//! event store, and applies the read-side authorization rules.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};

use foodtrust_auth::{Permission, Principal, Role, authorize, ensure_owner_or_regulator};
use foodtrust_batch::{
    Batch, BatchChanges, BatchCommand, CreateBatch, LifecycleStep, NewBatch, RecordLifecycleStep,
    StepDetails, TransferOwnership, UpdateBatch,
};
use foodtrust_core::{AggregateRoot, BatchId, DomainError, OrganizationId};
use foodtrust_telemetry::{SensorAnalytics, SensorReading};

use crate::command_dispatcher::{CommandDispatcher, CommandOutcome};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};
use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
use crate::mirror::{LedgerMirror, NoopMirror};
use crate::query::{
    BatchFilter, ComplianceReport, DateRange, LedgerQueries, Page, PublicBatchView, RecallStatistics,
    TraceTimeline,
};
use crate::read_model::{InMemorySnapshotCache, SnapshotCache};
use crate::recall::{RecallEngine, RecallRequest, RecallResult};
use crate::sensor_store::{InMemorySensorStore, SensorStore};
use crate::telemetry::TelemetryStore;

/// Point in time after which a command must not be issued.
///
/// Checked once, before any storage call. A command already handed to the store
/// always runs to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.0
    }

    pub fn check(&self, operation: &str) -> LedgerResult<()> {
        if self.is_expired() {
            Err(LedgerError::DeadlineExceeded(operation.to_string()))
        } else {
            Ok(())
        }
    }
}

fn check_deadline(deadline: Option<Deadline>, operation: &str) -> LedgerResult<()> {
    deadline.map_or(Ok(()), |d| d.check(operation))
}

/// Ledger over in-memory stores.
pub type InMemoryLedger<M = NoopMirror> =
    ProvenanceLedger<Arc<InMemoryEventStore>, Arc<InMemorySensorStore>, InMemorySnapshotCache, M>;

pub struct ProvenanceLedger<S, R, C, M> {
    config: LedgerConfig,
    dispatcher: CommandDispatcher<S, C, M>,
    telemetry: TelemetryStore<S, R>,
}

impl InMemoryLedger {
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::in_memory_with_mirror(config, NoopMirror)
    }
}

impl<M: LedgerMirror> InMemoryLedger<M> {
    pub fn in_memory_with_mirror(config: LedgerConfig, mirror: M) -> Self {
        ProvenanceLedger::new(
            config,
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemorySensorStore::new()),
            InMemorySnapshotCache::new(),
            mirror,
        )
    }
}

impl<S, R, C, M> ProvenanceLedger<S, R, C, M>
where
    S: EventStore + Clone,
    R: SensorStore,
    C: SnapshotCache,
    M: LedgerMirror,
{
    pub fn new(config: LedgerConfig, store: S, readings: R, cache: C, mirror: M) -> Self {
        let dispatcher =
            CommandDispatcher::new(store.clone(), cache, mirror).with_max_retries(config.append_retries);
        let telemetry = TelemetryStore::new(store, readings)
            .with_defaults(config.recent_readings_limit, config.analytics_window_days);
        Self {
            config,
            dispatcher,
            telemetry,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, C, M> {
        &self.dispatcher
    }

    pub fn telemetry(&self) -> &TelemetryStore<S, R> {
        &self.telemetry
    }

    pub fn queries(&self) -> LedgerQueries<'_, S, C, M> {
        LedgerQueries::new(&self.dispatcher)
    }

    fn submit(&self, command: BatchCommand, deadline: Option<Deadline>, operation: &str) -> LedgerResult<CommandOutcome> {
        check_deadline(deadline, operation)?;
        self.dispatcher.dispatch(command)
    }

    // ---- commands ----

    /// Create a batch owned by the principal's organization. A fresh id is
    /// generated unless `batch_id` is supplied.
    pub fn create_batch(
        &self,
        principal: &Principal,
        batch_id: Option<BatchId>,
        fields: NewBatch,
        deadline: Option<Deadline>,
    ) -> LedgerResult<Batch> {
        let command = BatchCommand::CreateBatch(CreateBatch {
            batch_id: batch_id.unwrap_or_else(BatchId::generate),
            principal: principal.clone(),
            fields,
            occurred_at: Utc::now(),
        });
        Ok(self.submit(command, deadline, "createBatch")?.batch)
    }

    pub fn update_batch(
        &self,
        principal: &Principal,
        batch_id: &BatchId,
        changes: BatchChanges,
        deadline: Option<Deadline>,
    ) -> LedgerResult<Batch> {
        let command = BatchCommand::UpdateBatch(UpdateBatch {
            batch_id: batch_id.clone(),
            principal: principal.clone(),
            changes,
            occurred_at: Utc::now(),
        });
        Ok(self.submit(command, deadline, "updateBatch")?.batch)
    }

    pub fn transfer_ownership(
        &self,
        principal: &Principal,
        batch_id: &BatchId,
        new_owner: OrganizationId,
        new_owner_role: Role,
        deadline: Option<Deadline>,
    ) -> LedgerResult<Batch> {
        let command = BatchCommand::TransferOwnership(TransferOwnership {
            batch_id: batch_id.clone(),
            principal: principal.clone(),
            new_owner,
            new_owner_role,
            occurred_at: Utc::now(),
        });
        Ok(self.submit(command, deadline, "transferOwnership")?.batch)
    }

    pub fn record_lifecycle_step(
        &self,
        principal: &Principal,
        batch_id: &BatchId,
        step: LifecycleStep,
        details: StepDetails,
        deadline: Option<Deadline>,
    ) -> LedgerResult<Batch> {
        let command = BatchCommand::RecordLifecycleStep(RecordLifecycleStep {
            batch_id: batch_id.clone(),
            principal: principal.clone(),
            step,
            details,
            occurred_at: Utc::now(),
        });
        Ok(self.submit(command, deadline, "recordLifecycleStep")?.batch)
    }

    pub fn initiate_recall(
        &self,
        principal: &Principal,
        request: RecallRequest,
        deadline: Option<Deadline>,
    ) -> LedgerResult<RecallResult> {
        check_deadline(deadline, "initiateRecall")?;
        RecallEngine::new(&self.dispatcher).initiate(principal, request)
    }

    pub fn record_sensor_reading(
        &self,
        principal: &Principal,
        batch_id: &BatchId,
        reading: SensorReading,
        deadline: Option<Deadline>,
    ) -> LedgerResult<()> {
        check_deadline(deadline, "recordSensorReading")?;
        authorize(principal, Permission::SensorRecord).map_err(DomainError::from)?;
        self.telemetry.record(batch_id, reading)
    }

    // ---- reads ----

    fn ensure_can_read(&self, principal: &Principal, batch: &Batch) -> LedgerResult<()> {
        if authorize(principal, Permission::BatchReadAny).is_ok() {
            return Ok(());
        }
        let owner = batch
            .current_owner()
            .ok_or_else(|| LedgerError::NotFound(format!("owner of batch {}", batch.batch_id())))?;
        ensure_owner_or_regulator(principal, owner).map_err(DomainError::from)?;
        Ok(())
    }

    /// Current snapshot. Owners and regulators only.
    pub fn get_batch(&self, principal: &Principal, batch_id: &BatchId) -> LedgerResult<Batch> {
        let batch = self.queries().get_batch(batch_id)?;
        self.ensure_can_read(principal, &batch)?;
        Ok(batch)
    }

    /// Without `BatchReadAny` the listing is restricted to the principal's own
    /// organization.
    pub fn list_batches(
        &self,
        principal: &Principal,
        mut filter: BatchFilter,
        page: Option<usize>,
        page_size: Option<usize>,
    ) -> LedgerResult<Page<Batch>> {
        if authorize(principal, Permission::BatchReadAny).is_err() {
            filter.owner = Some(principal.organization.clone());
        }
        let page_size = self.config.page_size(page_size);
        self.queries().list_batches(&filter, page.unwrap_or(1), page_size)
    }

    pub fn audit_trail(&self, principal: &Principal, batch_id: &BatchId) -> LedgerResult<Vec<StoredEvent>> {
        let batch = self.queries().get_batch(batch_id)?;
        self.ensure_can_read(principal, &batch)?;
        self.queries().audit_trail(batch_id)
    }

    /// Public traceability timeline (no principal).
    pub fn trace_timeline(&self, batch_id: &BatchId) -> LedgerResult<TraceTimeline> {
        self.queries().trace_timeline(batch_id)
    }

    /// Consumer scan view (no principal).
    pub fn public_view(&self, batch_id: &BatchId) -> LedgerResult<PublicBatchView> {
        self.queries().public_view(batch_id)
    }

    /// Resolve a scanned QR payload and return the public view.
    pub fn scan(&self, payload: &str) -> LedgerResult<PublicBatchView> {
        let batch_id = BatchId::from_scan_payload(payload)?;
        self.public_view(&batch_id)
    }

    pub fn scan_url(&self, batch_id: &BatchId) -> String {
        self.config.scan_url(batch_id)
    }

    pub fn compliance_report(
        &self,
        principal: &Principal,
        organization: Option<&OrganizationId>,
        period: DateRange<NaiveDate>,
    ) -> LedgerResult<ComplianceReport> {
        authorize(principal, Permission::ComplianceRead).map_err(DomainError::from)?;
        self.queries().compliance_report(organization, period)
    }

    pub fn recall_statistics(
        &self,
        principal: &Principal,
        period: DateRange<DateTime<Utc>>,
    ) -> LedgerResult<RecallStatistics> {
        authorize(principal, Permission::ComplianceRead).map_err(DomainError::from)?;
        self.queries().recall_statistics(period)
    }

    pub fn recent_readings(&self, batch_id: &BatchId, n: Option<usize>) -> LedgerResult<Vec<SensorReading>> {
        self.telemetry.recent_n(batch_id, n)
    }

    pub fn readings_between(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<SensorReading>> {
        self.telemetry.range(batch_id, from, to)
    }

    pub fn sensor_analytics(&self, batch_id: &BatchId, window_days: Option<u32>) -> LedgerResult<SensorAnalytics> {
        self.telemetry.aggregate(batch_id, window_days)
    }

    // ---- integrity ----

    /// Fold the log from scratch and compare it with the cached snapshot.
    ///
    /// A mismatch is reported as `Storage`: the cache is a derived view and must
    /// always equal the fold.
    pub fn verify_snapshot(&self, batch_id: &BatchId) -> LedgerResult<Batch> {
        let folded = self
            .dispatcher
            .rebuild(batch_id)?
            .ok_or_else(|| LedgerError::NotFound(format!("batch {batch_id}")))?;
        match self.dispatcher.cache().get(batch_id) {
            Some(cached) if cached != folded => Err(LedgerError::storage(format!(
                "cached snapshot of {batch_id} (version {}) diverges from its event log (version {})",
                cached.version(),
                folded.version(),
            ))),
            _ => Ok(folded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_deadline_is_rejected_before_dispatch() {
        let ledger = InMemoryLedger::in_memory(LedgerConfig::default());
        let principal = Principal::new(
            foodtrust_core::ActorId::parse("alice").unwrap(),
            OrganizationId::parse("GreenValley").unwrap(),
            Role::Farmer,
        );
        let expired = Deadline::after(Duration::ZERO);

        let err = ledger
            .create_batch(&principal, None, NewBatch::default(), Some(expired))
            .unwrap_err();
        assert_eq!(err, LedgerError::DeadlineExceeded("createBatch".into()));
        assert!(ledger.dispatcher().store().stream_ids().unwrap().is_empty());
    }

    #[test]
    fn live_deadline_lets_the_command_through() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        assert!(deadline.check("op").is_ok());
    }
}
