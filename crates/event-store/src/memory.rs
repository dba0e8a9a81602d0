use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventId, EventStoreError, Position, RecordedEvent, Result,
    Revision,
    store::{EventStore, EventStream},
};

/// In-memory event store implementation for testing.
///
/// This implementation stores all events in memory and provides
/// the same interface as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<EventEnvelope>>>,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Clears all events.
    pub async fn clear(&self) {
        self.events.write().await.clear();
    }

    fn current_head(events: &[EventEnvelope], stream_id: &AggregateId) -> EventId {
        events
            .iter()
            .filter(|e| &e.stream_id == stream_id)
            .map(|e| e.event_id)
            .max()
            .unwrap_or(EventId::initial())
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn get_stream(&self, stream_id: &AggregateId) -> Result<Vec<EventEnvelope>> {
        let store = self.events.read().await;
        let mut events: Vec<_> = store
            .iter()
            .filter(|e| &e.stream_id == stream_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.event_id);
        Ok(events)
    }

    async fn save(
        &self,
        stream_id: &AggregateId,
        expected: Revision,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<EventId> {
        // The write lock spans the head check and the push, so the
        // compare-and-append is atomic.
        let mut store = self.events.write().await;

        let actual = Self::current_head(&store, stream_id);
        if actual != expected {
            return Err(EventStoreError::ConcurrencyConflict {
                stream_id: stream_id.clone(),
                expected,
                actual,
            });
        }

        let event_id = actual.next();
        store.push(EventEnvelope::new(
            stream_id.clone(),
            event_id,
            message,
            payload,
        ));

        Ok(event_id)
    }

    async fn head(&self, stream_id: &AggregateId) -> Result<Option<EventId>> {
        let store = self.events.read().await;
        let head = Self::current_head(&store, stream_id);
        Ok((head != EventId::initial()).then_some(head))
    }

    async fn stream_events_after(&self, after: Position) -> Result<EventStream> {
        use futures_util::stream;

        // The log is kept in commit order; a position is its index plus one.
        let skip = usize::try_from(after.as_u64()).unwrap_or(usize::MAX);
        let events: Vec<_> = self
            .events
            .read()
            .await
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(index, envelope)| {
                Ok(RecordedEvent {
                    position: Position::new(index as u64 + 1),
                    envelope: envelope.clone(),
                })
            })
            .collect();
        Ok(Box::pin(stream::iter(events)))
    }
}
