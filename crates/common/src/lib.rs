//! Shared types for the organization access-control services.

mod types;

pub use types::AggregateId;
