//! Append-only event log for the organization access-control core.
//!
//! - [`EventStore`] is the log contract: per-stream reads and
//!   expected-revision appends
//! - [`InMemoryEventStore`] backs tests and single-process runs
//! - [`PostgresEventStore`] is the durable implementation

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventId, Position, RecordedEvent, Revision};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use store::{EventStore, EventStoreExt, EventStream};
