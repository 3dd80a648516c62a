//! Read views over the event log and snapshot cache.
//!
//! Nothing here appends events. Snapshots come from the cache when present and
//! from a fresh fold otherwise.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use foodtrust_batch::{Batch, BatchEvent, BatchStatus};
use foodtrust_core::{BatchId, OrganizationId};
use foodtrust_events::EventKind;

use crate::command_dispatcher::CommandDispatcher;
use crate::error::{LedgerError, LedgerResult};
use crate::event_store::{EventStore, StoredEvent};
use crate::mirror::LedgerMirror;
use crate::read_model::SnapshotCache;

/// Inclusive bounds; a missing side is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange<T> {
    pub from: Option<T>,
    pub to: Option<T>,
}

impl<T> Default for DateRange<T> {
    fn default() -> Self {
        Self { from: None, to: None }
    }
}

impl<T: PartialOrd> DateRange<T> {
    pub fn new(from: Option<T>, to: Option<T>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.from.as_ref().is_none_or(|from| value >= from) && self.to.as_ref().is_none_or(|to| value <= to)
    }
}

/// Conjunction of every predicate that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFilter {
    pub owner: Option<OrganizationId>,
    pub status: Option<BatchStatus>,
    /// Case-insensitive substring of `crop`.
    pub crop: Option<String>,
    pub harvest_date: DateRange<NaiveDate>,
    pub recalled: Option<bool>,
}

impl BatchFilter {
    pub fn matches(&self, batch: &Batch) -> bool {
        if let Some(owner) = &self.owner {
            if batch.current_owner() != Some(owner) {
                return false;
            }
        }
        if self.status.is_some_and(|s| s != batch.status()) {
            return false;
        }
        if let Some(crop) = &self.crop {
            if !batch.crop().to_lowercase().contains(&crop.to_lowercase()) {
                return false;
            }
        }
        if self.harvest_date != DateRange::default() {
            match batch.harvest_date() {
                Some(date) if self.harvest_date.contains(&date) => {}
                _ => return false,
            }
        }
        if self.recalled.is_some_and(|r| r != batch.is_recalled()) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-indexed.
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCount {
    pub key: String,
    pub count: usize,
}

/// Counts ordered by descending count, ties by key.
fn ranked(counts: BTreeMap<String, usize>) -> Vec<KeyCount> {
    let mut out: Vec<KeyCount> = counts
        .into_iter()
        .map(|(key, count)| KeyCount { key, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub organization: Option<OrganizationId>,
    pub period: DateRange<NaiveDate>,
    pub total_batches: usize,
    pub recalled_batches: usize,
    /// Percentage of non-recalled batches, two decimals. 100 when there are none.
    pub compliance_rate: f64,
    pub batches_by_status: Vec<KeyCount>,
    pub batches_by_crop: Vec<KeyCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallSummary {
    pub batch_id: BatchId,
    pub crop: String,
    pub reason: String,
    pub recall_date: DateTime<Utc>,
    pub current_owner: Option<OrganizationId>,
    pub harvest_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallStatistics {
    pub period: DateRange<DateTime<Utc>>,
    pub total_recalls: usize,
    pub recalls_by_reason: Vec<KeyCount>,
    pub recalls_by_owner: Vec<KeyCount>,
    /// At most ten, newest recall date first.
    pub recent_recalls: Vec<RecallSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub actor: String,
    pub sequence_number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_owner: Option<OrganizationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_owner: Option<OrganizationId>,
    pub details: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceTimeline {
    pub batch_id: BatchId,
    pub crop: String,
    pub harvest_date: Option<NaiveDate>,
    pub timeline: Vec<TimelineEntry>,
}

/// Consumer-facing subset of a batch, as shown after a QR scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicBatchView {
    pub batch_id: BatchId,
    pub crop: String,
    pub variety: Option<String>,
    pub harvest_date: Option<NaiveDate>,
    pub farm_address: Option<String>,
    pub farm_name: Option<String>,
    pub current_owner: Option<OrganizationId>,
    pub status: BatchStatus,
    pub grade: Option<String>,
    pub certifications: Vec<String>,
    pub processing: Option<PublicProcessing>,
    pub retail: Option<PublicRetail>,
    /// Present only while the batch is recalled.
    pub recall: Option<PublicRecall>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicProcessing {
    pub processor: Option<String>,
    pub processing_date: Option<DateTime<Utc>>,
    pub methods: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicRetail {
    pub retailer: Option<String>,
    pub store_location: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRecall {
    pub reason: String,
    pub recall_date: DateTime<Utc>,
}

impl From<&Batch> for PublicBatchView {
    fn from(batch: &Batch) -> Self {
        let location = batch.farm_location();
        Self {
            batch_id: batch.batch_id().clone(),
            crop: batch.crop().to_string(),
            variety: batch.variety().map(str::to_string),
            harvest_date: batch.harvest_date(),
            farm_address: location.and_then(|l| l.address.clone()),
            farm_name: location.and_then(|l| l.farm_name.clone()),
            current_owner: batch.current_owner().cloned(),
            status: batch.status(),
            grade: batch.quality().grade.clone(),
            certifications: batch.quality().certifications.clone(),
            processing: batch.processing().map(|p| PublicProcessing {
                processor: p.processor.clone(),
                processing_date: p.processing_date,
                methods: p.methods.clone(),
            }),
            retail: batch.retail().map(|r| PublicRetail {
                retailer: r.retailer.clone(),
                store_location: r.store_location.clone(),
                price: r.price,
                currency: r.currency.clone(),
            }),
            recall: batch
                .recall()
                .filter(|r| r.is_recalled)
                .map(|r| PublicRecall {
                    reason: r.reason.clone(),
                    recall_date: r.recall_date,
                }),
            last_updated: batch.last_updated(),
        }
    }
}

/// Read-only views, sharing the dispatcher's store and snapshot cache.
pub struct LedgerQueries<'a, S, C, M> {
    dispatcher: &'a CommandDispatcher<S, C, M>,
}

impl<'a, S, C, M> LedgerQueries<'a, S, C, M>
where
    S: EventStore,
    C: SnapshotCache,
    M: LedgerMirror,
{
    pub fn new(dispatcher: &'a CommandDispatcher<S, C, M>) -> Self {
        Self { dispatcher }
    }

    pub fn get_batch(&self, batch_id: &BatchId) -> LedgerResult<Batch> {
        self.dispatcher.snapshot(batch_id)
    }

    fn all_batches(&self) -> LedgerResult<Vec<Batch>> {
        self.dispatcher
            .store()
            .stream_ids()?
            .iter()
            .map(|id| self.dispatcher.snapshot(id))
            .collect()
    }

    /// Filtered listing, newest creation first. Pages are 1-indexed.
    pub fn list_batches(&self, filter: &BatchFilter, page: usize, page_size: usize) -> LedgerResult<Page<Batch>> {
        if page == 0 {
            return Err(LedgerError::validation("page", "pages start at 1"));
        }
        if page_size == 0 {
            return Err(LedgerError::validation("pageSize", "must be at least 1"));
        }

        let mut matching: Vec<Batch> = self
            .all_batches()?
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.batch_id().cmp(b.batch_id()))
        });

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Ok(Page {
            items,
            page,
            page_size,
            total,
            pages: total.div_ceil(page_size),
        })
    }

    /// Full history ordered by `occurred_at` (ties by sequence) for display.
    pub fn audit_trail(&self, batch_id: &BatchId) -> LedgerResult<Vec<StoredEvent>> {
        let mut events = self.dispatcher.store().load_stream(batch_id)?;
        if events.is_empty() {
            return Err(LedgerError::NotFound(format!("batch {batch_id}")));
        }
        events.sort_by_key(|e| (e.occurred_at, e.sequence_number));
        Ok(events)
    }

    /// Audit events within `[from, to]` by `occurred_at`, in sequence order.
    pub fn history_range(
        &self,
        batch_id: &BatchId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> LedgerResult<Vec<StoredEvent>> {
        Ok(self.dispatcher.store().load_range(batch_id, from, to)?)
    }

    pub fn trace_timeline(&self, batch_id: &BatchId) -> LedgerResult<TraceTimeline> {
        let batch = self.get_batch(batch_id)?;
        let timeline = self
            .audit_trail(batch_id)?
            .iter()
            .map(timeline_entry)
            .collect::<LedgerResult<Vec<_>>>()?;
        Ok(TraceTimeline {
            batch_id: batch_id.clone(),
            crop: batch.crop().to_string(),
            harvest_date: batch.harvest_date(),
            timeline,
        })
    }

    pub fn public_view(&self, batch_id: &BatchId) -> LedgerResult<PublicBatchView> {
        Ok(PublicBatchView::from(&self.get_batch(batch_id)?))
    }

    /// Batches owned by `organization` (all owners when `None`) harvested inside
    /// `period`.
    pub fn compliance_report(
        &self,
        organization: Option<&OrganizationId>,
        period: DateRange<NaiveDate>,
    ) -> LedgerResult<ComplianceReport> {
        let filter = BatchFilter {
            owner: organization.cloned(),
            harvest_date: period,
            ..BatchFilter::default()
        };
        let batches: Vec<Batch> = self
            .all_batches()?
            .into_iter()
            .filter(|b| filter.matches(b))
            .collect();

        let total = batches.len();
        let recalled = batches.iter().filter(|b| b.is_recalled()).count();
        let compliance_rate = if total == 0 {
            100.0
        } else {
            let rate = (total - recalled) as f64 / total as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        };

        let mut by_status = BTreeMap::new();
        let mut by_crop = BTreeMap::new();
        for batch in &batches {
            *by_status.entry(batch.status().to_string()).or_insert(0) += 1;
            *by_crop.entry(batch.crop().to_string()).or_insert(0) += 1;
        }

        Ok(ComplianceReport {
            organization: organization.cloned(),
            period,
            total_batches: total,
            recalled_batches: recalled,
            compliance_rate,
            batches_by_status: ranked(by_status),
            batches_by_crop: ranked(by_crop),
        })
    }

    /// Recalls whose recall date falls inside `period`.
    pub fn recall_statistics(&self, period: DateRange<DateTime<Utc>>) -> LedgerResult<RecallStatistics> {
        let mut recalls: Vec<RecallSummary> = self
            .all_batches()?
            .iter()
            .filter_map(|batch| {
                let recall = batch.recall().filter(|r| r.is_recalled)?;
                period.contains(&recall.recall_date).then(|| RecallSummary {
                    batch_id: batch.batch_id().clone(),
                    crop: batch.crop().to_string(),
                    reason: recall.reason.clone(),
                    recall_date: recall.recall_date,
                    current_owner: batch.current_owner().cloned(),
                    harvest_date: batch.harvest_date(),
                })
            })
            .collect();

        let mut by_reason = BTreeMap::new();
        let mut by_owner = BTreeMap::new();
        for recall in &recalls {
            *by_reason.entry(recall.reason.clone()).or_insert(0) += 1;
            let owner = recall
                .current_owner
                .as_ref()
                .map(|o| o.to_string())
                .unwrap_or_default();
            *by_owner.entry(owner).or_insert(0) += 1;
        }

        let total_recalls = recalls.len();
        recalls.sort_by_key(|r| (Reverse(r.recall_date), r.batch_id.clone()));
        recalls.truncate(10);

        Ok(RecallStatistics {
            period,
            total_recalls,
            recalls_by_reason: ranked(by_reason),
            recalls_by_owner: ranked(by_owner),
            recent_recalls: recalls,
        })
    }
}

fn timeline_entry(stored: &StoredEvent) -> LedgerResult<TimelineEntry> {
    let event: BatchEvent = stored.decode()?;
    let (previous_owner, new_owner, details) = match &event {
        BatchEvent::OwnershipTransferred(e) => (
            Some(e.previous_owner.clone()),
            Some(e.new_owner.clone()),
            serde_json::json!({
                "previousOwnerRole": e.previous_owner_role,
                "newOwnerRole": e.new_owner_role,
            }),
        ),
        BatchEvent::BatchCreated(e) => (None, None, to_details(e)?),
        BatchEvent::BatchUpdated(e) => (None, None, to_details(&e.changes)?),
        BatchEvent::LifecycleStepRecorded(e) => (None, None, to_details(&e.details)?),
        BatchEvent::BatchRecalled(e) => (
            None,
            None,
            serde_json::json!({
                "reason": e.reason,
                "recallDate": e.recall_date,
                "affectedBatches": e.affected_batches,
            }),
        ),
    };

    Ok(TimelineEntry {
        kind: stored.kind,
        occurred_at: stored.occurred_at,
        actor: stored.actor.to_string(),
        sequence_number: stored.sequence_number,
        previous_owner,
        new_owner,
        details,
    })
}

fn to_details<T: Serialize>(value: &T) -> LedgerResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| LedgerError::storage(format!("timeline details: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_range_is_inclusive_and_open_ended() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day).unwrap();
        let range = DateRange::new(Some(d(10)), Some(d(20)));
        assert!(range.contains(&d(10)));
        assert!(range.contains(&d(20)));
        assert!(!range.contains(&d(21)));
        assert!(DateRange::<NaiveDate>::default().contains(&d(1)));
        assert!(DateRange::new(None, Some(d(5))).contains(&d(1)));
    }

    #[test]
    fn ranked_orders_by_count_then_key() {
        let counts = BTreeMap::from([
            ("Tomatoes".to_string(), 2),
            ("Apples".to_string(), 2),
            ("Beans".to_string(), 5),
        ]);
        let keys: Vec<_> = ranked(counts).into_iter().map(|k| k.key).collect();
        assert_eq!(keys, vec!["Beans", "Apples", "Tomatoes"]);
    }
}
