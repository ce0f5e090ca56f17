//! The receiving side of the event bus.

use crate::events::{BlockchainEvent, EventFilter};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::Stream;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("the event bus was closed")]
    Closed,
}

#[async_trait]
pub trait EventSubscriber: Send + Sync {
    async fn recv(&mut self) -> Result<BlockchainEvent, SubscriptionError>;
}

/// A live subscription to the bus, filtered by topic. Decrements the shared
/// subscription count on drop so `InMemoryEventBus` bookkeeping stays exact
/// even if a caller never explicitly unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<BlockchainEvent>,
    filter: EventFilter,
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    topic_key: String,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BlockchainEvent>,
        filter: EventFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
        topic_key: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            subscriptions,
            topic_key,
        }
    }

    /// Await the next event matching this subscription's filter, skipping
    /// events on other topics and tolerating slow-consumer lag.
    pub async fn recv(&mut self) -> Result<BlockchainEvent, SubscriptionError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }

    /// Non-blocking poll for an already-buffered event.
    pub fn try_recv(&mut self) -> Result<Option<BlockchainEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
            }
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

#[async_trait]
impl EventSubscriber for Subscription {
    async fn recv(&mut self) -> Result<BlockchainEvent, SubscriptionError> {
        Subscription::recv(self).await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut subs) = self.subscriptions.write() {
            if let Some(count) = subs.get_mut(&self.topic_key) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    subs.remove(&self.topic_key);
                }
            }
        }
    }
}

/// Adapts [`Subscription`] to [`tokio_stream::Stream`] for combinator-style
/// consumption (`.filter_map`, `.take`, selecting over multiple streams).
pub struct EventStream {
    subscription: Subscription,
}

impl EventStream {
    pub(crate) fn new(subscription: Subscription) -> Self {
        Self { subscription }
    }
}

impl Stream for EventStream {
    type Item = BlockchainEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let fut = this.subscription.recv();
        tokio::pin!(fut);
        match fut.poll(cx) {
            Poll::Ready(Ok(event)) => Poll::Ready(Some(event)),
            Poll::Ready(Err(SubscriptionError::Closed)) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventTopic;
    use crate::publisher::{EventPublisher, InMemoryEventBus};
    use tokio_stream::StreamExt;

    fn sample_event() -> BlockchainEvent {
        BlockchainEvent::SyncProgressed {
            best_downloaded: 42,
            target: Some(100),
        }
    }

    #[tokio::test]
    async fn subscription_receives_published_event() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        bus.publish(sample_event()).await;
        let received = sub.recv().await.unwrap();
        assert!(matches!(received, BlockchainEvent::SyncProgressed { .. }));
    }

    #[tokio::test]
    async fn subscription_filter_skips_other_topics() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::topics(vec![EventTopic::Peers]));
        bus.publish(sample_event()).await;
        bus.publish(BlockchainEvent::PeerBlacklisted {
            peer_id: "p1".into(),
            reason: "stalled".into(),
            duration_secs: 30,
        })
        .await;
        let received = sub.recv().await.unwrap();
        assert!(matches!(received, BlockchainEvent::PeerBlacklisted { .. }));
    }

    #[tokio::test]
    async fn dropping_subscription_decrements_count() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        {
            let _sub = bus.subscribe(EventFilter::all());
            assert_eq!(bus.subscriber_count(), 1);
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn try_recv_returns_none_when_empty() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[tokio::test]
    async fn try_recv_returns_buffered_event() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());
        bus.publish(sample_event()).await;
        assert!(sub.try_recv().unwrap().is_some());
    }

    #[tokio::test]
    async fn event_stream_yields_filtered_events() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.event_stream(EventFilter::topics(vec![EventTopic::Sync]));
        bus.publish(sample_event()).await;
        let event = stream.next().await.unwrap();
        assert!(matches!(event, BlockchainEvent::SyncProgressed { .. }));
    }
}
