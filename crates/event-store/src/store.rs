use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventEnvelope, EventId, Position, RecordedEvent, Result, Revision};

/// A stream of committed events in commit order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RecordedEvent>> + Send>>;

/// Append-only, per-stream ordered event log.
///
/// Ordering is only defined within a stream. The log assigns event ids at
/// append time; the expected-revision comparison in [`EventStore::save`] is
/// the only consistency gate between concurrent writers.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns every event of a stream in ascending event id order.
    ///
    /// An unknown stream yields an empty list.
    async fn get_stream(&self, stream_id: &AggregateId) -> Result<Vec<EventEnvelope>>;

    /// Appends one event if `expected` equals the stream's current head.
    ///
    /// Fails with `ConcurrencyConflict` otherwise, without writing anything.
    /// Returns the id assigned to the new event.
    async fn save(
        &self,
        stream_id: &AggregateId,
        expected: Revision,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<EventId>;

    /// Returns the id of the latest event of a stream, or None for an unknown stream.
    async fn head(&self, stream_id: &AggregateId) -> Result<Option<EventId>>;

    /// Streams, in commit order, every event committed at a position after `after`.
    async fn stream_events_after(&self, after: Position) -> Result<EventStream>;
}

/// Extension trait providing convenience methods for event stores.
#[async_trait]
pub trait EventStoreExt: EventStore {
    /// Checks if a stream exists (has any events).
    async fn stream_exists(&self, stream_id: &AggregateId) -> Result<bool> {
        Ok(self.head(stream_id).await?.is_some())
    }

    /// Streams every event in the store in commit order.
    async fn stream_all_events(&self) -> Result<EventStream> {
        self.stream_events_after(Position::start()).await
    }

    /// Returns the events of a stream with an id strictly greater than `after`.
    async fn get_stream_after(
        &self,
        stream_id: &AggregateId,
        after: EventId,
    ) -> Result<Vec<EventEnvelope>> {
        let events = self.get_stream(stream_id).await?;
        Ok(events.into_iter().filter(|e| e.event_id > after).collect())
    }
}

// Blanket implementation for all EventStore implementations
impl<T: EventStore + ?Sized> EventStoreExt for T {}

#[async_trait]
impl<T: EventStore + ?Sized> EventStore for std::sync::Arc<T> {
    async fn get_stream(&self, stream_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        (**self).get_stream(stream_id).await
    }

    async fn save(
        &self,
        stream_id: &AggregateId,
        expected: Revision,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<EventId> {
        (**self).save(stream_id, expected, message, payload).await
    }

    async fn head(&self, stream_id: &AggregateId) -> Result<Option<EventId>> {
        (**self).head(stream_id).await
    }

    async fn stream_events_after(&self, after: Position) -> Result<EventStream> {
        (**self).stream_events_after(after).await
    }
}
