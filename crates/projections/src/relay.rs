//! Moves committed events from the event log onto the broker.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use common::AggregateId;
use event_store::{EventId, EventStore, EventStoreExt, Position, RecordedEvent};
use futures_util::StreamExt;
use tokio::sync::Mutex;

use crate::Result;
use crate::broker::EventBroker;

#[derive(Default)]
struct RelayState {
    /// Last commit position read from the log.
    position: Position,
    /// Highest event id published per stream.
    published: HashMap<AggregateId, EventId>,
}

/// Publishes every committed event to the broker.
///
/// Each pass reads the log only past the last commit position it has seen.
/// Commit positions can become visible out of order, so a stream whose next
/// event shows up with a gap is backfilled from the stream itself before the
/// newer event is published.
///
/// The relay's progress is not persisted: after a restart every event is
/// published again and the projection handler drops the ones it has already
/// applied.
pub struct EventRelay<S: EventStore, B: EventBroker> {
    store: S,
    broker: B,
    state: Mutex<RelayState>,
}

impl<S: EventStore, B: EventBroker> EventRelay<S, B> {
    pub fn new(store: S, broker: B) -> Self {
        Self {
            store,
            broker,
            state: Mutex::new(RelayState::default()),
        }
    }

    /// Last commit position this relay has read.
    pub async fn position(&self) -> Position {
        self.state.lock().await.position
    }

    /// Publishes every event not yet published. Returns how many.
    #[tracing::instrument(skip(self))]
    pub async fn relay_once(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut events = self.store.stream_events_after(state.position).await?;
        let mut count = 0;

        while let Some(recorded) = events.next().await {
            let RecordedEvent { position, envelope } = recorded?;
            let stream_id = envelope.stream_id.clone();
            let event_id = envelope.event_id;
            let high_water = state.published.get(&stream_id).copied().unwrap_or_default();

            if event_id > high_water {
                if !event_id.follows(high_water) {
                    tracing::debug!(%stream_id, %high_water, %event_id, "backfilling stream gap");
                    for missed in self.store.get_stream_after(&stream_id, high_water).await? {
                        if missed.event_id >= event_id {
                            break;
                        }
                        self.broker.publish(missed).await?;
                        count += 1;
                    }
                }

                self.broker.publish(envelope).await?;
                state.published.insert(stream_id, event_id);
                count += 1;
            }

            state.position = position;
        }

        if count > 0 {
            metrics::counter!("relay_events_published_total").increment(count as u64);
            tracing::debug!(count, position = %state.position, "events relayed");
        }
        Ok(count)
    }

    /// Runs [`EventRelay::relay_once`] every `interval` until `shutdown` resolves.
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("event relay stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.relay_once().await {
                        tracing::error!(error = %e, "event relay pass failed");
                    }
                }
            }
        }
    }
}
