//! Bridges resource-change signals into render triggers.
//!
//! Mirrors the regeneration-queue idea of reacting to source updates with a
//! rebuild request rather than rebuilding inline: this coordinator watches
//! the bus for anything that changed data the renderer consumes and turns it
//! into one `ReconciliationTriggered`. Without it, `ConfigValidated`,
//! discovery updates, and HTTP refreshes would have nowhere to go and the
//! renderer would sit idle forever.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::{Event, EventBus, Subscription};

/// Subscribes to every event that represents a change in the renderer's
/// input data and republishes `ReconciliationTriggered` for each one.
pub struct ReconciliationCoordinator {
    bus: EventBus,
}

impl ReconciliationCoordinator {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Runs until `shutdown` fires.
    pub async fn run(self, mut events: Subscription, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { return };
                    if Self::triggers_reconciliation(&event) {
                        debug!(event = event.kind(), "reconciliation coordinator: triggering re-render");
                        self.bus.publish(Event::ReconciliationTriggered).await;
                    }
                }
            }
        }
    }

    fn triggers_reconciliation(event: &Event) -> bool {
        match event {
            Event::ResourceIndexUpdated(update) => !update.is_initial_sync,
            Event::ConfigValidated { .. }
            | Event::CredentialsUpdated { .. }
            | Event::ResourceSyncComplete { .. }
            | Event::HAProxyPodsDiscovered { .. }
            | Event::HAProxyPodTerminated { .. }
            | Event::HTTPResourceUpdated { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ResourceIndexUpdate;

    #[tokio::test]
    async fn http_resource_updated_triggers_reconciliation() {
        let bus = EventBus::new();
        let events = bus.subscribe("coordinator", 8).await;
        let mut observer = bus.subscribe("observer", 8).await;
        let shutdown = CancellationToken::new();
        let run_shutdown = shutdown.clone();

        tokio::spawn(ReconciliationCoordinator::new(bus.clone()).run(events, run_shutdown));

        bus.publish(Event::HTTPResourceUpdated { url: "http://h/x".into() }).await;
        assert!(matches!(observer.recv().await.unwrap(), Event::ReconciliationTriggered));
        shutdown.cancel();
    }

    #[tokio::test]
    async fn initial_sync_resource_index_update_is_not_a_trigger() {
        let bus = EventBus::new();
        let events = bus.subscribe("coordinator", 8).await;
        let mut observer = bus.subscribe("observer", 8).await;
        let shutdown = CancellationToken::new();
        let run_shutdown = shutdown.clone();

        tokio::spawn(ReconciliationCoordinator::new(bus.clone()).run(events, run_shutdown));

        bus.publish(Event::ResourceIndexUpdated(ResourceIndexUpdate {
            resource_type: "haproxy-pods".into(),
            created: 3,
            modified: 0,
            deleted: 0,
            is_initial_sync: true,
        }))
        .await;
        bus.publish(Event::ConfigValidated { dataplane_port: 5555 }).await;

        let event = tokio::time::timeout(std::time::Duration::from_millis(200), observer.recv())
            .await
            .expect("ConfigValidated should have triggered")
            .unwrap();
        assert!(matches!(event, Event::ReconciliationTriggered));
        assert!(observer.try_recv().is_err(), "initial sync must not also have triggered");
        shutdown.cancel();
    }
}
