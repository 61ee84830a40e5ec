//! The event bus: a typed, in-process pub/sub fabric with bounded,
//! per-subscriber buffers.
//!
//! Delivery policy (Open Question 2, resolved): each subscriber gets its own
//! bounded `tokio::sync::mpsc` channel. Publishing uses `try_send`; if a
//! subscriber's buffer is full the event is dropped for that subscriber only
//! and the drop is logged. The publisher never blocks. Ordering across
//! subscribers is unspecified, but every subscriber's own channel preserves
//! FIFO order for the events it actually receives.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::warn;

use super::types::Event;

/// The receiving half a subscriber reads from.
pub type Subscription = mpsc::Receiver<Event>;

struct Subscriber {
    name: String,
    sender: mpsc::Sender<Event>,
}

/// Typed in-process pub/sub bus. Cheaply cloneable; every clone shares the
/// same subscriber list.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Registers a new subscriber with the given buffer capacity. Subscribers
    /// registered after events have already been published may miss those
    /// earlier events; see the state-replay mitigation on stateful producers.
    pub async fn subscribe(&self, name: impl Into<String>, buffer_capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer_capacity.max(1));
        let name = name.into();
        self.subscribers.write().await.push(Subscriber {
            name,
            sender: tx,
        });
        rx
    }

    /// Enqueues `event` for delivery to every current subscriber.
    /// Never blocks: a full subscriber buffer causes the event to be dropped
    /// for that subscriber and logged, not for the publisher.
    pub async fn publish(&self, event: Event) {
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.iter() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber = %subscriber.name,
                        event = event.kind(),
                        "event bus: subscriber buffer full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(
                        subscriber = %subscriber.name,
                        event = event.kind(),
                        "event bus: subscriber channel closed, dropping event"
                    );
                }
            }
        }
    }

    /// Fan-out is live as soon as a subscriber is registered, so this is a
    /// no-op hook kept for components that want an explicit "the bus is
    /// live" signal.
    pub async fn start(&self) {}

    #[cfg(test)]
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn per_subscriber_fifo_delivery() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("test", 8).await;

        bus.publish(Event::ConfigValidated { dataplane_port: 5555 }).await;
        bus.publish(Event::BecameLeader).await;
        bus.publish(Event::ReconciliationTriggered).await;

        assert!(matches!(sub.recv().await.unwrap(), Event::ConfigValidated { .. }));
        assert!(matches!(sub.recv().await.unwrap(), Event::BecameLeader));
        assert!(matches!(
            sub.recv().await.unwrap(),
            Event::ReconciliationTriggered
        ));
    }

    #[tokio::test]
    async fn full_buffer_drops_event_without_blocking_publisher() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("slow", 1).await;

        // Fill the buffer, then publish a second event that must be dropped.
        bus.publish(Event::ConfigValidated { dataplane_port: 5555 }).await;
        bus.publish(Event::BecameLeader).await; // dropped: buffer full

        assert!(matches!(sub.recv().await.unwrap(), Event::ConfigValidated { .. }));
        // Nothing else should be waiting: the second event was dropped, not queued.
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_get_every_event() {
        let bus = EventBus::new();
        let mut a = bus.subscribe("a", 8).await;
        let mut b = bus.subscribe("b", 8).await;

        bus.publish(Event::BecameLeader).await;

        assert!(matches!(a.recv().await.unwrap(), Event::BecameLeader));
        assert!(matches!(b.recv().await.unwrap(), Event::BecameLeader));
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::new();
        bus.publish(Event::ConfigValidated { dataplane_port: 5555 }).await; // nobody subscribed yet

        let mut sub = bus.subscribe("late", 8).await;
        bus.publish(Event::BecameLeader).await;

        assert!(matches!(sub.recv().await.unwrap(), Event::BecameLeader));
    }
}
