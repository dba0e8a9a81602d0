//! Ordered, exactly-once projection of organization events.
//!
//! Committed events travel from the event log to the read model through:
//! - [`EventRelay`], which publishes new events to an [`EventBroker`]
//! - [`ProjectionConsumer`], which receives and acknowledges deliveries
//! - [`ProjectionHandler`], which checks each event against the stream's
//!   watermark in the [`OrderLedger`] before any [`Projection`] sees it
//!
//! Deliveries may be duplicated or reordered; each stream's events still
//! reach the read model exactly once and in event id order.

pub mod broker;
pub mod consumer;
pub mod error;
pub mod handler;
pub mod ledger;
pub mod projection;
pub mod read_model;
pub mod relay;
pub mod views;

pub use broker::{Delivery, DeliveryTag, EventBroker, InMemoryBroker};
pub use consumer::{DrainStats, ProjectionConsumer};
pub use error::{ProjectionError, Result};
pub use handler::{Disposition, ProjectionHandler};
pub use ledger::{InMemoryOrderLedger, OrderLedger, PostgresOrderLedger};
pub use projection::Projection;
pub use read_model::ReadModel;
pub use relay::EventRelay;
pub use views::{OrganizationSummary, OrganizationView};
