//! Delivery loop between the broker and the projection handler.

use std::future::Future;
use std::time::Duration;

use crate::Result;
use crate::broker::EventBroker;
use crate::handler::{Disposition, ProjectionHandler};
use crate::ledger::OrderLedger;

/// Counts of what one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub applied: usize,
    pub stale: usize,
    pub deferred: usize,
    pub unhandled: usize,
    pub failed: usize,
}

impl DrainStats {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Applied => self.applied += 1,
            Disposition::Stale => self.stale += 1,
            Disposition::Deferred => self.deferred += 1,
            Disposition::Unhandled => self.unhandled += 1,
        }
    }

    /// Total deliveries received in the pass.
    pub fn received(&self) -> usize {
        self.applied + self.stale + self.deferred + self.unhandled + self.failed
    }
}

/// Receives deliveries, runs them through the handler and acknowledges them.
///
/// A failed delivery is logged and left unacknowledged; it never stops the
/// consumer.
pub struct ProjectionConsumer<B: EventBroker, L: OrderLedger> {
    broker: B,
    handler: ProjectionHandler<L>,
}

impl<B: EventBroker, L: OrderLedger> ProjectionConsumer<B, L> {
    pub fn new(broker: B, handler: ProjectionHandler<L>) -> Self {
        Self { broker, handler }
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub fn handler(&self) -> &ProjectionHandler<L> {
        &self.handler
    }

    /// Handles every delivery that is ready right now.
    ///
    /// Only broker failures are returned as errors.
    pub async fn drain(&self) -> Result<DrainStats> {
        let mut stats = DrainStats::default();

        while let Some(delivery) = self.broker.receive().await? {
            match self.handler.handle(&delivery.envelope).await {
                Ok(disposition) => {
                    if disposition.should_ack() {
                        self.broker.ack(delivery.tag).await?;
                    }
                    stats.record(disposition);
                }
                Err(e) => {
                    tracing::warn!(
                        stream_id = %delivery.envelope.stream_id,
                        event_id = %delivery.envelope.event_id,
                        error = %e,
                        "delivery failed, leaving it for redelivery"
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Drains the broker, then requeues unacknowledged deliveries.
    #[tracing::instrument(skip(self))]
    pub async fn tick(&self) -> Result<DrainStats> {
        let stats = self.drain().await?;
        let requeued = self.broker.redeliver_unacked().await?;
        if stats.received() > 0 || requeued > 0 {
            tracing::debug!(?stats, requeued, "consumer pass");
        }
        Ok(stats)
    }

    /// Runs [`ProjectionConsumer::tick`] every `interval` until `shutdown` resolves.
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("projection consumer stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "projection consumer pass failed");
                    }
                }
            }
        }
    }
}
