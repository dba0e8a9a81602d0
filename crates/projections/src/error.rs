//! Projection error types.

use common::AggregateId;
use event_store::EventId;
use thiserror::Error;

/// Errors that can occur during projection processing.
///
/// None of these stop the consumer: a failed delivery is logged and left
/// unacknowledged so the broker redelivers it.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// Another handler moved the stream's watermark first.
    #[error("Ledger conflict on stream {stream_id}: expected {expected}, found {actual}")]
    LedgerConflict {
        stream_id: AggregateId,
        expected: EventId,
        actual: EventId,
    },

    /// A watermark update that would not move the watermark forward.
    #[error("Watermark of stream {stream_id} cannot move from {from} to {to}")]
    WatermarkRegression {
        stream_id: AggregateId,
        from: EventId,
        to: EventId,
    },

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// Failed to deserialize an event payload.
    #[error("Event deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// A projection-specific error.
    #[error("Projection error: {0}")]
    Projection(String),

    /// Ledger storage failure.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
