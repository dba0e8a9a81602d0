//! Per-stream ordering protocol in front of the projections.

use event_store::EventEnvelope;

use crate::Result;
use crate::ledger::OrderLedger;
use crate::projection::Projection;

/// What the handler did with one delivered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Written to the read model; the watermark advanced.
    Applied,
    /// At or below the watermark; dropped without a write.
    Stale,
    /// Ahead of the watermark by more than one; left for redelivery.
    Deferred,
    /// Next in sequence but no projection handles its message; the watermark advanced.
    Unhandled,
}

impl Disposition {
    /// Returns true if the delivery should be acknowledged.
    pub fn should_ack(&self) -> bool {
        !matches!(self, Disposition::Deferred)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Applied => "applied",
            Disposition::Stale => "stale",
            Disposition::Deferred => "deferred",
            Disposition::Unhandled => "unhandled",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies each stream's events to the projections exactly once and in order.
///
/// For an event `e` with watermark `last`:
/// - `e.event_id <= last`: stale
/// - `e.event_id > last + 1`: deferred
/// - `e.event_id == last + 1`: projections write, then the watermark moves
///   to `e.event_id` by compare-and-set
///
/// The projection write and the watermark update are not atomic. A crash
/// between them leaves the delivery unacknowledged, so the event comes back
/// and is written again; projection writes must therefore be idempotent.
pub struct ProjectionHandler<L: OrderLedger> {
    ledger: L,
    projections: Vec<Box<dyn Projection>>,
}

impl<L: OrderLedger> ProjectionHandler<L> {
    /// Creates a handler with no projections.
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this handler.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Builder form of [`ProjectionHandler::register`].
    pub fn with_projection(mut self, projection: impl Projection + 'static) -> Self {
        self.register(Box::new(projection));
        self
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Decides what to do with `event` and applies it when it is next in line.
    ///
    /// On error nothing is acknowledged and the watermark is unchanged
    /// unless every projection write already succeeded.
    #[tracing::instrument(
        skip_all,
        fields(stream_id = %event.stream_id, event_id = %event.event_id, event_message = %event.message)
    )]
    pub async fn handle(&self, event: &EventEnvelope) -> Result<Disposition> {
        let last = self
            .ledger
            .get_last_processed_event(&event.stream_id)
            .await?;

        let disposition = if event.event_id <= last {
            Disposition::Stale
        } else if !event.event_id.follows(last) {
            tracing::debug!(last = %last, "predecessor not applied yet");
            Disposition::Deferred
        } else {
            let mut written = false;
            for projection in &self.projections {
                if projection.handles(&event.message) {
                    projection.handle(event).await?;
                    written = true;
                }
            }

            self.ledger
                .update_last_processed_event(&event.stream_id, last, event.event_id)
                .await?;

            if written {
                Disposition::Applied
            } else {
                Disposition::Unhandled
            }
        };

        metrics::counter!("projection_events_total", "disposition" => disposition.as_str())
            .increment(1);
        tracing::debug!(%disposition, "event handled");
        Ok(disposition)
    }
}
