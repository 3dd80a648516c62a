//! Scripted walkthrough: a farmer creates a batch, processes it, hands it to a
//! processor, a sensor reports in, and a regulator recalls it.

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use foodtrust_auth::{Principal, Role};
use foodtrust_batch::{Batch, FarmLocation, LifecycleStep, NewBatch, Quantity, QuantityUnit, StepDetails};
use foodtrust_core::{ActorId, OrganizationId};
use foodtrust_infra::event_store::StoredEvent;
use foodtrust_infra::{InMemoryLedger, LedgerConfig, RecallRequest, RecallResult, TraceTimeline};
use foodtrust_telemetry::{SensorAnalytics, SensorReading};

#[derive(Debug, Serialize)]
pub struct DemoOutput {
    pub batch: Batch,
    pub recall: RecallResult,
    pub timeline: TraceTimeline,
    pub analytics: SensorAnalytics,
    pub audit_trail: Vec<StoredEvent>,
}

fn principal(actor: &str, org: &str, role: Role) -> Result<Principal> {
    Ok(Principal::new(ActorId::parse(actor)?, OrganizationId::parse(org)?, role))
}

pub fn run_scenario() -> Result<DemoOutput> {
    let ledger = InMemoryLedger::in_memory(LedgerConfig::from_env()?);
    let farmer = principal("alice", "GreenValley", Role::Farmer)?;
    let processor = principal("bob", "FreshFoods", Role::Processor)?;
    let regulator = principal("inspector", "FDA", Role::Regulator)?;

    let created = ledger.create_batch(
        &farmer,
        None,
        NewBatch {
            crop: "Tomatoes".into(),
            variety: Some("Roma".into()),
            harvest_date: NaiveDate::from_ymd_opt(2024, 1, 15),
            farm_location: Some(FarmLocation {
                latitude: 36.77,
                longitude: -119.41,
                address: None,
                farm_name: Some("Green Valley Farm".into()),
            }),
            quantity: Some(Quantity::new(500.0, QuantityUnit::Kg)),
            quality: None,
        },
        None,
    )?;
    let batch_id = created.batch_id().clone();
    info!(batch_id = %batch_id, "demo batch created");

    ledger.record_lifecycle_step(&farmer, &batch_id, LifecycleStep::Process, StepDetails::default(), None)?;
    ledger.transfer_ownership(&farmer, &batch_id, processor.organization.clone(), Role::Processor, None)?;
    ledger.record_sensor_reading(
        &processor,
        &batch_id,
        SensorReading::new("sensor-7", Utc::now())
            .with_temperature(4.2)
            .with_humidity(85.0),
        None,
    )?;

    let recall = ledger.initiate_recall(
        &regulator,
        RecallRequest {
            reason: "Salmonella detected in sample".into(),
            affected_batch_ids: vec![batch_id.clone()],
            recall_date: Utc::now(),
        },
        None,
    )?;

    Ok(DemoOutput {
        batch: ledger.get_batch(&regulator, &batch_id)?,
        recall,
        timeline: ledger.trace_timeline(&batch_id)?,
        analytics: ledger.sensor_analytics(&batch_id, None)?,
        audit_trail: ledger.audit_trail(&regulator, &batch_id)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use foodtrust_batch::BatchStatus;

    #[test]
    fn scenario_ends_recalled_with_gap_free_history() {
        let output = run_scenario().unwrap();

        assert_eq!(output.batch.status(), BatchStatus::Recalled);
        assert_eq!(output.recall.affected_count, 1);
        let seqs: Vec<u64> = output.audit_trail.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert_eq!(output.analytics.total_readings, 1);
    }
}
