//! Order control ledger: the per-stream watermark of applied events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::AggregateId;
use event_store::EventId;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::{ProjectionError, Result};

/// Stores, per stream, the id of the last event applied to the read model.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Returns the last applied event id, or [`EventId::initial`] for an unseen stream.
    async fn get_last_processed_event(&self, stream_id: &AggregateId) -> Result<EventId>;

    /// Moves the watermark from `expected_last` to `event_id`.
    ///
    /// Compare-and-set: fails with [`ProjectionError::LedgerConflict`] when
    /// the stored value is not `expected_last`. The watermark never moves
    /// backward.
    async fn update_last_processed_event(
        &self,
        stream_id: &AggregateId,
        expected_last: EventId,
        event_id: EventId,
    ) -> Result<()>;
}

#[async_trait]
impl<T: OrderLedger + ?Sized> OrderLedger for Arc<T> {
    async fn get_last_processed_event(&self, stream_id: &AggregateId) -> Result<EventId> {
        (**self).get_last_processed_event(stream_id).await
    }

    async fn update_last_processed_event(
        &self,
        stream_id: &AggregateId,
        expected_last: EventId,
        event_id: EventId,
    ) -> Result<()> {
        (**self)
            .update_last_processed_event(stream_id, expected_last, event_id)
            .await
    }
}

fn ensure_forward(stream_id: &AggregateId, expected_last: EventId, event_id: EventId) -> Result<()> {
    if event_id <= expected_last {
        return Err(ProjectionError::WatermarkRegression {
            stream_id: stream_id.clone(),
            from: expected_last,
            to: event_id,
        });
    }
    Ok(())
}

/// In-memory ledger for tests and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryOrderLedger {
    entries: Arc<RwLock<HashMap<AggregateId, EventId>>>,
}

impl InMemoryOrderLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrderLedger {
    async fn get_last_processed_event(&self, stream_id: &AggregateId) -> Result<EventId> {
        Ok(self
            .entries
            .read()
            .await
            .get(stream_id)
            .copied()
            .unwrap_or_default())
    }

    async fn update_last_processed_event(
        &self,
        stream_id: &AggregateId,
        expected_last: EventId,
        event_id: EventId,
    ) -> Result<()> {
        ensure_forward(stream_id, expected_last, event_id)?;

        let mut entries = self.entries.write().await;
        let actual = entries.get(stream_id).copied().unwrap_or_default();
        if actual != expected_last {
            return Err(ProjectionError::LedgerConflict {
                stream_id: stream_id.clone(),
                expected: expected_last,
                actual,
            });
        }

        entries.insert(stream_id.clone(), event_id);
        Ok(())
    }
}

/// PostgreSQL ledger backed by the `order_control` table.
#[derive(Clone)]
pub struct PostgresOrderLedger {
    pool: PgPool,
}

impl PostgresOrderLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn conflict(
        &self,
        stream_id: &AggregateId,
        expected_last: EventId,
    ) -> Result<()> {
        let actual = self.get_last_processed_event(stream_id).await?;
        Err(ProjectionError::LedgerConflict {
            stream_id: stream_id.clone(),
            expected: expected_last,
            actual,
        })
    }
}

#[async_trait]
impl OrderLedger for PostgresOrderLedger {
    async fn get_last_processed_event(&self, stream_id: &AggregateId) -> Result<EventId> {
        let last: Option<i64> =
            sqlx::query_scalar("SELECT last_event_id FROM order_control WHERE stream_id = $1")
                .bind(stream_id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        Ok(EventId::new(last.unwrap_or(0) as u64))
    }

    async fn update_last_processed_event(
        &self,
        stream_id: &AggregateId,
        expected_last: EventId,
        event_id: EventId,
    ) -> Result<()> {
        ensure_forward(stream_id, expected_last, event_id)?;

        let result = if expected_last == EventId::initial() {
            sqlx::query(
                r#"
                INSERT INTO order_control (stream_id, last_event_id)
                VALUES ($1, $2)
                ON CONFLICT (stream_id) DO NOTHING
                "#,
            )
            .bind(stream_id.as_str())
            .bind(event_id.as_u64() as i64)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE order_control
                SET last_event_id = $3, updated_at = now()
                WHERE stream_id = $1 AND last_event_id = $2
                "#,
            )
            .bind(stream_id.as_str())
            .bind(expected_last.as_u64() as i64)
            .bind(event_id.as_u64() as i64)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return self.conflict(stream_id, expected_last).await;
        }
        Ok(())
    }
}
