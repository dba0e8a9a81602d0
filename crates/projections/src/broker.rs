//! At-least-once delivery of committed events.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use event_store::EventEnvelope;
use tokio::sync::Mutex;

use crate::Result;

/// Identifies one delivery of an event so it can be acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeliveryTag(u64);

impl std::fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An event handed to a consumer, pending acknowledgement.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub envelope: EventEnvelope,
}

/// Event channel with explicit acknowledgement.
///
/// Delivery is at least once with no ordering guarantee. A delivery that is
/// never acknowledged is handed out again after [`EventBroker::redeliver_unacked`].
#[async_trait]
pub trait EventBroker: Send + Sync {
    /// Queues an event for delivery.
    async fn publish(&self, envelope: EventEnvelope) -> Result<()>;

    /// Takes the next ready delivery, or None when nothing is ready.
    async fn receive(&self) -> Result<Option<Delivery>>;

    /// Permanently removes a delivery from the channel.
    async fn ack(&self, tag: DeliveryTag) -> Result<()>;

    /// Makes every unacknowledged delivery ready again. Returns how many.
    async fn redeliver_unacked(&self) -> Result<usize>;
}

#[async_trait]
impl<T: EventBroker + ?Sized> EventBroker for Arc<T> {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        (**self).publish(envelope).await
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        (**self).receive().await
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<()> {
        (**self).ack(tag).await
    }

    async fn redeliver_unacked(&self) -> Result<usize> {
        (**self).redeliver_unacked().await
    }
}

#[derive(Default)]
struct BrokerState {
    next_tag: u64,
    ready: VecDeque<Delivery>,
    unacked: BTreeMap<DeliveryTag, Delivery>,
}

/// In-process broker queue.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of deliveries waiting to be received.
    pub async fn ready_count(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Number of deliveries received but not yet acknowledged.
    pub async fn unacked_count(&self) -> usize {
        self.state.lock().await.unacked.len()
    }
}

#[async_trait]
impl EventBroker for InMemoryBroker {
    async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        let mut state = self.state.lock().await;
        state.next_tag += 1;
        let tag = DeliveryTag(state.next_tag);
        state.ready.push_back(Delivery { tag, envelope });
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>> {
        let mut state = self.state.lock().await;
        let Some(delivery) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.unacked.insert(delivery.tag, delivery.clone());
        Ok(Some(delivery))
    }

    async fn ack(&self, tag: DeliveryTag) -> Result<()> {
        self.state.lock().await.unacked.remove(&tag);
        Ok(())
    }

    async fn redeliver_unacked(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let pending = std::mem::take(&mut state.unacked);
        let count = pending.len();
        state.ready.extend(pending.into_values());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AggregateId;
    use event_store::EventId;

    fn envelope(id: u64) -> EventEnvelope {
        EventEnvelope::new(
            AggregateId::from("org"),
            EventId::new(id),
            "userAdded",
            serde_json::json!({ "userId": format!("u-{id}") }),
        )
    }

    #[tokio::test]
    async fn deliveries_come_out_in_publish_order() {
        let broker = InMemoryBroker::new();
        broker.publish(envelope(1)).await.unwrap();
        broker.publish(envelope(2)).await.unwrap();

        let first = broker.receive().await.unwrap().unwrap();
        let second = broker.receive().await.unwrap().unwrap();
        assert_eq!(first.envelope.event_id, EventId::new(1));
        assert_eq!(second.envelope.event_id, EventId::new(2));
        assert!(broker.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn acked_deliveries_are_gone() {
        let broker = InMemoryBroker::new();
        broker.publish(envelope(1)).await.unwrap();

        let delivery = broker.receive().await.unwrap().unwrap();
        broker.ack(delivery.tag).await.unwrap();

        assert_eq!(broker.redeliver_unacked().await.unwrap(), 0);
        assert!(broker.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unacked_deliveries_come_back() {
        let broker = InMemoryBroker::new();
        broker.publish(envelope(1)).await.unwrap();

        let delivery = broker.receive().await.unwrap().unwrap();
        assert_eq!(broker.unacked_count().await, 1);

        assert_eq!(broker.redeliver_unacked().await.unwrap(), 1);
        let again = broker.receive().await.unwrap().unwrap();
        assert_eq!(again.tag, delivery.tag);
        assert_eq!(again.envelope, delivery.envelope);
    }
}
