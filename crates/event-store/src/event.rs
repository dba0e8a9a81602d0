use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AggregateId;

/// Per-stream sequence number of a committed event.
///
/// Event ids start at 1 for the first event of a stream and increase by one
/// for every append. Zero is reserved for "nothing committed yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EventId(u64);

/// Number of events applied to an in-memory aggregate since reconstruction.
///
/// A revision equals the id of the last event the aggregate has seen, which is
/// what the event log compares against on append.
pub type Revision = EventId;

impl EventId {
    /// Creates an event id from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The position before any event has been committed.
    pub fn initial() -> Self {
        Self(0)
    }

    /// The id assigned to the first event of a stream.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the id that directly follows this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true when this id directly follows `previous`.
    pub fn follows(&self, previous: EventId) -> bool {
        self.0 == previous.0 + 1
    }

    /// Returns the raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EventId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<EventId> for u64 {
    fn from(id: EventId) -> Self {
        id.0
    }
}

/// Commit order of an event across every stream in the log.
///
/// Positions start at 1; [`Position::start`] (0) reads from the beginning.
/// They may have holes, so only their order is meaningful.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Position(u64);

impl Position {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// The position before the first event.
    pub fn start() -> Self {
        Self(0)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event read from the log together with its commit position.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub position: Position,
    pub envelope: EventEnvelope,
}

/// A committed event together with the stream coordinates it was stored at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The stream (aggregate) this event belongs to.
    pub stream_id: AggregateId,

    /// Sequence number within the stream.
    pub event_id: EventId,

    /// Event type name, e.g. `organizationCreated`.
    pub message: String,

    /// Event-specific data needed to replay the mutation.
    pub payload: serde_json::Value,

    /// When the event was committed.
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    /// Creates an envelope stamped with the current time.
    pub fn new(
        stream_id: AggregateId,
        event_id: EventId,
        message: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            stream_id,
            event_id,
            message: message.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}
