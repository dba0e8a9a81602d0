//! Loading and persisting event-sourced aggregates.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{EventId, EventStore, Revision};

use crate::aggregate::{Aggregate, DomainEvent, rehydrate};
use crate::error::DomainError;

/// Replays aggregates from their streams and appends their new events.
///
/// The expected-revision check inside [`EventStore::save`] is the only
/// consistency gate: two writers holding the same revision race, exactly one
/// append succeeds and the other fails with [`DomainError::OptimisticLock`].
pub struct AggregateRepository<S, A> {
    store: S,
    _phantom: PhantomData<fn() -> A>,
}

impl<S: Clone, A> Clone for AggregateRepository<S, A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<S, A> AggregateRepository<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    /// Creates a new repository over the given event store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the underlying event store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Replays the full stream onto a fresh aggregate.
    ///
    /// The returned aggregate's revision equals the id of the last event
    /// applied. An empty stream fails with [`DomainError::StreamNotFound`].
    #[tracing::instrument(skip_all, fields(aggregate = A::aggregate_type(), stream_id = %stream_id))]
    pub async fn load(&self, stream_id: &AggregateId) -> Result<A, DomainError> {
        let events = self.store.get_stream(stream_id).await?;
        if events.is_empty() {
            return Err(DomainError::StreamNotFound(stream_id.clone()));
        }

        let aggregate = rehydrate(A::default(), events)?;
        tracing::debug!(revision = %aggregate.revision(), "aggregate loaded");
        Ok(aggregate)
    }

    /// Loads an aggregate, returning None if its stream is empty.
    pub async fn load_existing(&self, stream_id: &AggregateId) -> Result<Option<A>, DomainError> {
        match self.load(stream_id).await {
            Ok(aggregate) => Ok(Some(aggregate)),
            Err(DomainError::StreamNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Appends one event if `expected` is still the stream's head.
    #[tracing::instrument(skip(self, payload), fields(stream_id = %stream_id, expected = %expected))]
    pub async fn append(
        &self,
        stream_id: &AggregateId,
        expected: Revision,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<EventId, DomainError> {
        let event_id = self
            .store
            .save(stream_id, expected, message, payload)
            .await?;
        tracing::debug!(event_id = %event_id, "event appended");
        Ok(event_id)
    }

    /// Appends `event` at the aggregate's current revision.
    ///
    /// On success the aggregate's revision advances to the committed id.
    pub async fn commit(
        &self,
        stream_id: &AggregateId,
        aggregate: &mut A,
        event: &A::Event,
    ) -> Result<EventId, DomainError> {
        let payload = event.to_payload()?;
        let event_id = self
            .append(stream_id, aggregate.revision(), event.message(), payload)
            .await?;
        aggregate.set_revision(event_id);
        Ok(event_id)
    }
}
