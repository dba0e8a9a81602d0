//! Domain error types.

use common::AggregateId;
use event_store::{EventId, EventStoreError};
use thiserror::Error;

use crate::organization::OrganizationError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A command was rejected by the organization aggregate.
    #[error(transparent)]
    Organization(#[from] OrganizationError),

    /// Another writer committed to the stream first.
    #[error("Optimistic lock failed on stream {stream_id}: expected revision {expected}, found {actual}")]
    OptimisticLock {
        stream_id: AggregateId,
        expected: EventId,
        actual: EventId,
    },

    /// The stream has no events.
    #[error("Stream not found: {0}")]
    StreamNotFound(AggregateId),

    /// Every attempt of a command lost the race against a concurrent writer.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DomainError>,
    },

    /// The stored events cannot be replayed into an aggregate.
    #[error("Cannot replay stream {stream_id}: {reason}")]
    Replay {
        stream_id: AggregateId,
        reason: String,
    },

    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(EventStoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    /// Returns true for errors the command manager retries.
    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, DomainError::OptimisticLock { .. })
    }

    /// Returns the aggregate error, if this is one.
    pub fn as_organization(&self) -> Option<&OrganizationError> {
        match self {
            DomainError::Organization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EventStoreError> for DomainError {
    fn from(e: EventStoreError) -> Self {
        match e {
            EventStoreError::ConcurrencyConflict {
                stream_id,
                expected,
                actual,
            } => DomainError::OptimisticLock {
                stream_id,
                expected,
                actual,
            },
            other => DomainError::EventStore(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflict_becomes_optimistic_lock() {
        let err: DomainError = EventStoreError::ConcurrencyConflict {
            stream_id: AggregateId::from("org"),
            expected: EventId::new(1),
            actual: EventId::new(2),
        }
        .into();

        assert!(err.is_optimistic_lock());
    }

    #[test]
    fn other_store_errors_are_not_retryable() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DomainError = EventStoreError::Serialization(json_err).into();
        assert!(matches!(err, DomainError::EventStore(_)));
        assert!(!err.is_optimistic_lock());
    }

    #[test]
    fn exhausted_retries_keep_the_last_error() {
        let err = DomainError::RetriesExhausted {
            attempts: 100,
            last: Box::new(DomainError::OptimisticLock {
                stream_id: AggregateId::from("org"),
                expected: EventId::new(4),
                actual: EventId::new(5),
            }),
        };

        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("expected revision 4"));
        assert!(err.to_string().starts_with("Gave up after 100 attempts"));
    }
}
