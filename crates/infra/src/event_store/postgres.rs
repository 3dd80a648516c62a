//! Postgres-backed event store.
//!
//! Schema lives in `migrations/0001_batch_events.sql`.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::{Span, instrument};

use foodtrust_core::{ActorId, BatchId, ExpectedVersion};
use foodtrust_events::EventKind;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

const EVENT_COLUMNS: &str =
    "event_id, batch_id, sequence_number, kind, actor, event_type, event_version, occurred_at, payload";

/// Postgres-backed append-only event store.
///
/// An append is one transaction: read the stream head, compare it with the
/// expected version, then write every new row in a single multi-row `INSERT`.
/// A writer that slips in between the read and the insert trips the
/// `(batch_id, sequence_number)` primary key, and the append surfaces as
/// `Concurrency` for the dispatcher to retry.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self), fields(batch_id = %batch_id, event_count = tracing::field::Empty), err)]
    pub async fn load_stream_async(&self, batch_id: &BatchId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM batch_events WHERE batch_id = $1 ORDER BY sequence_number"
        );
        let rows = sqlx::query(&sql)
            .bind(batch_id.as_str())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_stream", e))?;

        let stream = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Span::current().record("event_count", stream.len());
        Ok(stream)
    }

    #[instrument(
        skip(self, events),
        fields(batch_id = %batch_id, event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_events(
        &self,
        batch_id: &BatchId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        if let Some(idx) = events.iter().position(|e| &e.batch_id != batch_id) {
            return Err(EventStoreError::InvalidAppend(format!(
                "event at index {idx} does not belong to stream {batch_id}"
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let head = stream_head(&mut tx, batch_id).await?;
        if !expected_version.matches(head) {
            // Dropping the transaction rolls it back.
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {head}"
            )));
        }

        let stored: Vec<StoredEvent> = events
            .into_iter()
            .zip(head + 1..)
            .map(|(e, sequence_number)| StoredEvent {
                event_id: e.event_id,
                batch_id: e.batch_id,
                sequence_number,
                kind: e.kind,
                actor: e.actor,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            })
            .collect();

        {
            let mut insert: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO batch_events ({EVENT_COLUMNS}) "));
            insert.push_values(&stored, |mut row, e| {
                row.push_bind(e.event_id)
                    .push_bind(e.batch_id.as_str())
                    .push_bind(e.sequence_number as i64)
                    .push_bind(e.kind.as_str())
                    .push_bind(e.actor.as_str())
                    .push_bind(e.event_type.as_str())
                    .push_bind(e.event_version as i32)
                    .push_bind(e.occurred_at)
                    .push_bind(&e.payload);
            });
            insert
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("insert_events", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(stored)
    }

    #[instrument(skip(self), err)]
    pub async fn stream_ids_async(&self) -> Result<Vec<BatchId>, EventStoreError> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT DISTINCT batch_id FROM batch_events ORDER BY batch_id")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stream_ids", e))?;

        ids.into_iter()
            .map(|raw| BatchId::parse(raw).map_err(|e| EventStoreError::Serialization(e.to_string())))
            .collect()
    }
}

/// Highest sequence number of the stream, 0 when it has no events.
async fn stream_head(tx: &mut Transaction<'_, Postgres>, batch_id: &BatchId) -> Result<u64, EventStoreError> {
    let head: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(sequence_number), 0) FROM batch_events WHERE batch_id = $1",
    )
    .bind(batch_id.as_str())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("stream_head", e))?;
    Ok(head as u64)
}

/// `23505` (another writer took the sequence number) becomes `Concurrency`,
/// `23514` (a CHECK constraint) becomes `InvalidAppend`, everything else
/// `Unavailable`.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("{operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                Some("23514") => EventStoreError::InvalidAppend(msg),
                _ => EventStoreError::Unavailable(msg),
            }
        }
        other => EventStoreError::Unavailable(format!("{operation}: {other}")),
    }
}

/// Run an async store operation from a synchronous store trait.
///
/// Requires a multi-threaded tokio runtime on the calling thread.
pub(crate) fn block_on<F, T, E>(fut: F, unavailable: impl FnOnce(String) -> E) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        unavailable("postgres backend requires a tokio runtime on the calling thread".to_string())
    })?;
    tokio::task::block_in_place(|| handle.block_on(fut))
}

fn decode_row(row: &PgRow) -> Result<StoredEvent, EventStoreError> {
    let corrupt = |column: &str, e: String| EventStoreError::Serialization(format!("batch_events.{column}: {e}"));
    let text = |column: &str| row.try_get::<String, _>(column).map_err(|e| corrupt(column, e.to_string()));

    Ok(StoredEvent {
        event_id: row.try_get("event_id").map_err(|e| corrupt("event_id", e.to_string()))?,
        batch_id: BatchId::parse(text("batch_id")?).map_err(|e| corrupt("batch_id", e.to_string()))?,
        sequence_number: row
            .try_get::<i64, _>("sequence_number")
            .map_err(|e| corrupt("sequence_number", e.to_string()))? as u64,
        kind: text("kind")?.parse::<EventKind>().map_err(|e| corrupt("kind", e))?,
        actor: ActorId::parse(text("actor")?).map_err(|e| corrupt("actor", e.to_string()))?,
        event_type: text("event_type")?,
        event_version: row
            .try_get::<i32, _>("event_version")
            .map_err(|e| corrupt("event_version", e.to_string()))? as u32,
        occurred_at: row
            .try_get::<DateTime<Utc>, _>("occurred_at")
            .map_err(|e| corrupt("occurred_at", e.to_string()))?,
        payload: row.try_get("payload").map_err(|e| corrupt("payload", e.to_string()))?,
    })
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        batch_id: &BatchId,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(
            self.append_events(batch_id, events, expected_version),
            EventStoreError::Unavailable,
        )
    }

    fn load_stream(&self, batch_id: &BatchId) -> Result<Vec<StoredEvent>, EventStoreError> {
        block_on(self.load_stream_async(batch_id), EventStoreError::Unavailable)
    }

    fn stream_ids(&self) -> Result<Vec<BatchId>, EventStoreError> {
        block_on(self.stream_ids_async(), EventStoreError::Unavailable)
    }
}
