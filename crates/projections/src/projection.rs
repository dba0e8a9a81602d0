//! Core projection trait.

use async_trait::async_trait;
use event_store::EventEnvelope;

use crate::Result;

/// A projection that processes events and updates a read model.
///
/// Ordering and deduplication are the handler's job: a projection only sees
/// each stream's events once and in event id order, so its writes can be
/// plain upserts and deletes.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Returns the name of this projection.
    fn name(&self) -> &'static str;

    /// Returns true if this projection has a write for `message`.
    fn handles(&self, message: &str) -> bool;

    /// Applies a single event to the read model.
    async fn handle(&self, event: &EventEnvelope) -> Result<()>;
}
