use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{NaiveDate, Utc};
use foodtrust_auth::{Principal, Role};
use foodtrust_batch::{
    BatchChanges, BatchEvent, BatchUpdated, FarmLocation, NewBatch, Quantity, QuantityUnit,
};
use foodtrust_core::{ActorId, BatchId, ExpectedVersion, OrganizationId};
use foodtrust_infra::command_dispatcher::decode_stream;
use foodtrust_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use foodtrust_infra::{InMemoryLedger, LedgerConfig};

fn farmer() -> Principal {
    Principal::new(
        ActorId::parse("alice").unwrap(),
        OrganizationId::parse("GreenValley").unwrap(),
        Role::Farmer,
    )
}

fn new_batch() -> NewBatch {
    NewBatch {
        crop: "Tomatoes".into(),
        variety: None,
        harvest_date: NaiveDate::from_ymd_opt(2024, 1, 15),
        farm_location: Some(FarmLocation {
            latitude: 36.7,
            longitude: -119.4,
            address: None,
            farm_name: None,
        }),
        quantity: Some(Quantity::new(500.0, QuantityUnit::Kg)),
        quality: None,
    }
}

fn quantity_update(batch_id: &BatchId, amount: f64) -> BatchEvent {
    BatchEvent::BatchUpdated(BatchUpdated {
        batch_id: batch_id.clone(),
        actor: ActorId::parse("alice").unwrap(),
        changes: BatchChanges {
            quantity: Some(Quantity::new(amount, QuantityUnit::Kg)),
            ..BatchChanges::default()
        },
        occurred_at: Utc::now(),
    })
}

fn bench_command_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_latency");

    group.bench_function("create_batch", |b| {
        let ledger = InMemoryLedger::in_memory(LedgerConfig::default());
        let principal = farmer();
        b.iter(|| {
            black_box(ledger.create_batch(&principal, None, new_batch(), None).unwrap());
        });
    });

    group.bench_function("update_with_history", |b| {
        let ledger = InMemoryLedger::in_memory(LedgerConfig::default());
        let principal = farmer();
        let batch = ledger.create_batch(&principal, None, new_batch(), None).unwrap();
        let batch_id = batch.batch_id().clone();
        let mut amount = 1.0;
        b.iter(|| {
            amount += 1.0;
            let changes = BatchChanges {
                quantity: Some(Quantity::new(amount, QuantityUnit::Kg)),
                ..BatchChanges::default()
            };
            black_box(ledger.update_batch(&principal, &batch_id, changes, None).unwrap());
        });
    });

    group.finish();
}

fn bench_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("append_throughput");

    for batch_size in [1usize, 10, 100, 1000] {
        group.throughput(Throughput::Elements(batch_size as u64));
        group.bench_with_input(BenchmarkId::new("batch_append", batch_size), &batch_size, |b, &size| {
            let store = InMemoryEventStore::new();
            let batch_id = BatchId::parse("BENCH").unwrap();

            b.iter(|| {
                let events: Vec<UncommittedEvent> = (0..size)
                    .map(|i| {
                        UncommittedEvent::from_typed(
                            batch_id.clone(),
                            uuid::Uuid::now_v7(),
                            &quantity_update(&batch_id, 1.0 + i as f64),
                        )
                        .unwrap()
                    })
                    .collect();
                black_box(store.append(&batch_id, events, ExpectedVersion::Any).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_fold_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold_speed");

    for event_count in [10usize, 100, 1000, 10000] {
        group.bench_with_input(BenchmarkId::new("decode_and_fold", event_count), &event_count, |b, &count| {
            let ledger = InMemoryLedger::in_memory(LedgerConfig::default());
            let batch = ledger.create_batch(&farmer(), None, new_batch(), None).unwrap();
            let batch_id = batch.batch_id().clone();
            let store = ledger.dispatcher().store();
            for i in 1..count {
                let event = UncommittedEvent::from_typed(
                    batch_id.clone(),
                    uuid::Uuid::now_v7(),
                    &quantity_update(&batch_id, i as f64),
                )
                .unwrap();
                store
                    .append(&batch_id, vec![event], ExpectedVersion::Exact(i as u64))
                    .unwrap();
            }
            let stream = store.load_stream(&batch_id).unwrap();

            b.iter(|| {
                let events = decode_stream(black_box(&stream)).unwrap();
                black_box(foodtrust_batch::fold(batch_id.clone(), &events));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_command_latency, bench_append_throughput, bench_fold_speed);
criterion_main!(benches);
