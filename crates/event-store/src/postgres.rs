use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Position, RecordedEvent, Result,
    Revision,
    store::{EventStore, EventStream},
};

const UNIQUE_STREAM_EVENT: &str = "unique_stream_event";

/// Rows fetched per round trip when streaming the log.
const PAGE_SIZE: i64 = 500;

/// PostgreSQL-backed event store implementation.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let event_id: i64 = row.try_get("event_id")?;

        Ok(EventEnvelope {
            stream_id: AggregateId::from_string(row.try_get::<String, _>("stream_id")?),
            event_id: EventId::new(event_id as u64),
            message: row.try_get("message")?,
            payload: row.try_get("payload")?,
            timestamp: row.try_get("timestamp")?,
        })
    }

    fn row_to_recorded(row: PgRow) -> Result<RecordedEvent> {
        let position: i64 = row.try_get("position")?;
        Ok(RecordedEvent {
            position: Position::new(position as u64),
            envelope: Self::row_to_event(row)?,
        })
    }

    async fn page_after(pool: &PgPool, after: Position) -> Result<Vec<RecordedEvent>> {
        let rows = sqlx::query(
            r#"
            SELECT position, stream_id, event_id, message, payload, timestamp
            FROM events
            WHERE position > $1
            ORDER BY position ASC
            LIMIT $2
            "#,
        )
        .bind(after.as_u64() as i64)
        .bind(PAGE_SIZE)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Self::row_to_recorded).collect()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn get_stream(&self, stream_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT stream_id, event_id, message, payload, timestamp
            FROM events
            WHERE stream_id = $1
            ORDER BY event_id ASC
            "#,
        )
        .bind(stream_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn save(
        &self,
        stream_id: &AggregateId,
        expected: Revision,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<EventId> {
        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(event_id) FROM events WHERE stream_id = $1")
                .bind(stream_id.as_str())
                .fetch_one(&mut *tx)
                .await?;

        let actual = EventId::new(current.unwrap_or(0) as u64);
        if actual != expected {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: stream_id.clone(),
                expected,
                actual,
            });
        }

        let event_id = actual.next();

        sqlx::query(
            r#"
            INSERT INTO events (stream_id, event_id, message, payload)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(stream_id.as_str())
        .bind(event_id.as_u64() as i64)
        .bind(message)
        .bind(&payload)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            // A writer that read the same head committed first
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(UNIQUE_STREAM_EVENT)
            {
                return EventStoreError::ConcurrencyConflict {
                    stream_id: stream_id.clone(),
                    expected,
                    actual: event_id,
                };
            }
            EventStoreError::Database(e)
        })?;

        tx.commit().await?;
        Ok(event_id)
    }

    async fn head(&self, stream_id: &AggregateId) -> Result<Option<EventId>> {
        let head: Option<i64> =
            sqlx::query_scalar("SELECT MAX(event_id) FROM events WHERE stream_id = $1")
                .bind(stream_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(head.map(|v| EventId::new(v as u64)))
    }

    async fn stream_events_after(&self, after: Position) -> Result<EventStream> {
        use futures_util::{TryStreamExt, stream};

        // Pages are fetched lazily by position; the stream owns its pool handle.
        let pages = stream::try_unfold(
            (self.pool.clone(), after, false),
            |(pool, after, exhausted)| async move {
                if exhausted {
                    return Ok(None);
                }
                let page = Self::page_after(&pool, after).await?;
                let exhausted = (page.len() as i64) < PAGE_SIZE;
                let next = page.last().map(|e| e.position).unwrap_or(after);
                Ok::<_, EventStoreError>(Some((
                    stream::iter(page.into_iter().map(Ok::<_, EventStoreError>)),
                    (pool, next, exhausted),
                )))
            },
        );

        Ok(Box::pin(pages.try_flatten()))
    }
}
