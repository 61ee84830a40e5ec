//! The HTTP resource store's event-layer adapter.
//!
//! Converts validation outcomes into fleet-wide promotion/rejection and
//! drives per-URL periodic refresh timers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::store::HttpResourceStore;
use crate::events::{Event, EventBus};

/// Wires the HTTP resource store into the event bus: validation outcomes
/// become promotions/rejections, and registered URLs get their own refresh
/// timer task.
pub struct HttpStoreAdapter {
    bus: EventBus,
    store: Arc<HttpResourceStore>,
}

impl HttpStoreAdapter {
    pub fn new(bus: EventBus, store: Arc<HttpResourceStore>) -> Self {
        Self { bus, store }
    }

    /// Starts a self-resetting refresh timer for `url`. The timer stops when
    /// `shutdown` is cancelled. A zero delay means no periodic refresh.
    pub fn register_url(&self, url: String, shutdown: CancellationToken) {
        let store = self.store.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            loop {
                let Some(delay) = store.get_delay(&url).await else {
                    return;
                };
                if delay.is_zero() {
                    return;
                }

                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }

                match store.refresh_url(&url).await {
                    Ok(true) => {
                        debug!(url, "HTTP resource refresh observed a change");
                        bus.publish(Event::HTTPResourceUpdated { url: url.clone() }).await;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(url, error = %e, "periodic HTTP refresh failed");
                    }
                }
            }
        });
    }

    /// Runs the event loop until `shutdown` is triggered.
    pub async fn run(self, mut events: crate::events::Subscription, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { return };
                    self.handle_event(event).await;
                }
            }
        }
    }

    async fn handle_event(&self, event: Event) {
        match event {
            Event::ValidationCompleted => {
                for url in self.store.promote_all_pending().await {
                    self.bus.publish(Event::HTTPResourceAccepted { url }).await;
                }
            }
            Event::ValidationFailed { .. } => {
                for url in self.store.reject_all_pending().await {
                    self.bus.publish(Event::HTTPResourceRejected { url }).await;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validation_completed_promotes_every_pending_url() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("test", 8).await;
        let store = Arc::new(HttpResourceStore::new());
        store.load_fixture("http://h/a", "A").await;
        store.load_fixture("http://h/b", "B").await;
        store.stage_pending_for_test("http://h/a", "A2").await;
        store.stage_pending_for_test("http://h/b", "B2").await;

        let adapter = HttpStoreAdapter::new(bus, store.clone());
        adapter.handle_event(Event::ValidationCompleted).await;

        let mut accepted = vec![];
        while let Ok(event) = sub.try_recv() {
            if let Event::HTTPResourceAccepted { url } = event {
                accepted.push(url);
            }
        }
        accepted.sort();
        assert_eq!(accepted, vec!["http://h/a", "http://h/b"]);
        assert_eq!(store.get("http://h/a").await, Some("A2".to_string()));
    }

    #[tokio::test]
    async fn validation_failed_rejects_every_pending_url_and_keeps_accepted() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe("test", 8).await;
        let store = Arc::new(HttpResourceStore::new());
        store.load_fixture("http://h/a", "A").await;
        store.stage_pending_for_test("http://h/a", "A2").await;

        let adapter = HttpStoreAdapter::new(bus, store.clone());
        adapter
            .handle_event(Event::ValidationFailed { errors: vec!["bad".into()] })
            .await;

        let event = sub.recv().await.unwrap();
        assert!(matches!(event, Event::HTTPResourceRejected { url } if url == "http://h/a"));
        assert_eq!(store.get("http://h/a").await, Some("A".to_string()));
        assert_eq!(store.get_pending("http://h/a").await, None);
    }
}
