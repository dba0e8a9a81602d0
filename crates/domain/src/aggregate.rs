//! Core aggregate and domain event traits.

use common::AggregateId;
use event_store::{EventEnvelope, EventId, Revision};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::DomainError;

/// Trait for domain events.
///
/// Implementors serialize with `#[serde(tag = "message", content = "payload")]`
/// so that the enum tag doubles as the event log `message` and the variant
/// content is the stored `payload`.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name stored as the event `message`.
    fn message(&self) -> &'static str;

    /// Returns true for the event that starts a stream.
    fn is_creation(&self) -> bool;

    /// Serializes the variant content as a standalone payload.
    fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        Ok(value
            .get_mut("payload")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    /// Rebuilds an event from its stored `message` and `payload`.
    fn from_message(message: &str, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "message": message, "payload": payload }))
    }
}

/// Trait for aggregates in an event-sourced system.
///
/// In event sourcing, aggregates:
/// - Are rebuilt by replaying events
/// - Validate commands against their current state
/// - Apply events to update state (pure, deterministic)
pub trait Aggregate: Default + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier, None before creation.
    fn id(&self) -> Option<&AggregateId>;

    /// Number of events applied since reconstruction.
    fn revision(&self) -> Revision;

    /// Sets the revision.
    ///
    /// Called after replay and after every successful append.
    fn set_revision(&mut self, revision: Revision);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// This method must be pure and deterministic:
    /// - Given the same state and event, it must always produce the same new state
    /// - It must not have side effects
    /// - It must not fail (events represent facts that have happened)
    fn apply(&mut self, event: Self::Event);

    /// Applies multiple events in sequence.
    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }
}

/// Replays committed events onto `aggregate`.
///
/// Events are applied in ascending event id order. Events at or below the
/// aggregate's current revision are skipped, which lets a restored snapshot
/// be combined with the full stream. The remaining ids must continue the
/// revision without gaps or duplicates, and a stream replayed from scratch
/// must open with its creation event.
pub fn rehydrate<A: Aggregate>(
    mut aggregate: A,
    mut events: Vec<EventEnvelope>,
) -> Result<A, DomainError> {
    events.sort_by_key(|e| e.event_id);

    let mut revision = aggregate.revision();
    for envelope in events {
        if envelope.event_id <= revision {
            continue;
        }
        if !envelope.event_id.follows(revision) {
            return Err(DomainError::Replay {
                stream_id: envelope.stream_id,
                reason: format!(
                    "expected event {} but found {}",
                    revision.next(),
                    envelope.event_id
                ),
            });
        }

        let event = A::Event::from_message(&envelope.message, envelope.payload)?;
        if revision == EventId::initial() && !event.is_creation() {
            return Err(DomainError::Replay {
                stream_id: envelope.stream_id,
                reason: format!(
                    "{} stream starts with {} instead of its creation event",
                    A::aggregate_type(),
                    envelope.message
                ),
            });
        }

        aggregate.apply(event);
        revision = envelope.event_id;
    }

    aggregate.set_revision(revision);
    Ok(aggregate)
}
