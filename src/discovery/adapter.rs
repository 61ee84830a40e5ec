//! The stateful discovery adapter.
//!
//! Layers version-compatibility gating, exponential-backoff retry, and
//! removed-pod detection on top of the pure [`super::engine::discover_candidates`].
//! Owns its bookkeeping exclusively: no lock is needed around adapter state
//! because a single task drives the event loop (REDESIGN FLAG 3).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::dataplane::DataplaneVersionProber;
use super::engine::{discover_candidates, Credentials, Endpoint};
use super::version::Version;
use crate::clock::SharedClock;
use crate::events::{Event, EventBus};
use crate::store::StoreRegistry;

const POD_STORE_NAME: &str = "haproxy-pods";
const MAX_BACKOFF_SECS: i64 = 60;
const BASE_BACKOFF_SECS: i64 = 5;

#[derive(Debug, Clone)]
struct PendingRetry {
    last_attempt: chrono::DateTime<chrono::Utc>,
    retry_count: u32,
}

impl PendingRetry {
    fn due_at(&self) -> chrono::DateTime<chrono::Utc> {
        let backoff = (BASE_BACKOFF_SECS * 2i64.pow(self.retry_count)).min(MAX_BACKOFF_SECS);
        self.last_attempt + chrono::Duration::seconds(backoff)
    }
}

/// Discovers HAProxy pods, version-gates them against the controller's own
/// local HAProxy version, and publishes the admitted fleet on every pass.
pub struct DiscoveryAdapter {
    bus: EventBus,
    registry: StoreRegistry,
    prober: Arc<dyn DataplaneVersionProber>,
    local_version: Version,
    clock: SharedClock,

    dataplane_port: Option<u16>,
    credentials: Option<Credentials>,

    admitted: HashMap<String, Endpoint>,
    pending_retries: HashMap<String, PendingRetry>,
    warned_set: HashSet<String>,
    rejected_set: HashSet<String>,
}

impl DiscoveryAdapter {
    pub fn new(
        bus: EventBus,
        registry: StoreRegistry,
        prober: Arc<dyn DataplaneVersionProber>,
        local_version: Version,
        clock: SharedClock,
    ) -> Self {
        Self {
            bus,
            registry,
            prober,
            local_version,
            clock,
            dataplane_port: None,
            credentials: None,
            admitted: HashMap::new(),
            pending_retries: HashMap::new(),
            warned_set: HashSet::new(),
            rejected_set: HashSet::new(),
        }
    }

    fn ready(&self) -> bool {
        self.dataplane_port.is_some() && self.credentials.is_some() && self.registry.get(POD_STORE_NAME).is_some()
    }

    /// Time until the next backoff-gated retry is due, if any pods are pending.
    fn next_due_in(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.pending_retries
            .values()
            .map(PendingRetry::due_at)
            .min()
            .map(|due| {
                let remaining = due - now;
                remaining.to_std().unwrap_or(Duration::ZERO)
            })
    }

    /// Runs the event loop until `shutdown` is triggered. A single task owns
    /// every field on this adapter for the lifetime of the loop.
    pub async fn run(mut self, mut events: crate::events::Subscription, shutdown: CancellationToken) {
        loop {
            let sleep_for = self.next_due_in().unwrap_or(Duration::from_secs(3600));

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("discovery adapter: shutting down");
                    return;
                }
                _ = tokio::time::sleep(sleep_for) => {
                    if self.ready() {
                        self.run_pass().await;
                    }
                }
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        info!("discovery adapter: event bus closed, shutting down");
                        return;
                    };
                    if self.handle_event(event).await && self.ready() {
                        self.run_pass().await;
                    }
                }
            }
        }
    }

    /// Applies one event to adapter state. Returns true if a discovery pass
    /// should run as a result.
    async fn handle_event(&mut self, event: Event) -> bool {
        match event {
            Event::ConfigValidated { dataplane_port } => {
                self.dataplane_port = Some(dataplane_port);
                true
            }
            Event::CredentialsUpdated {
                username,
                password,
                version,
            } => {
                self.credentials = Some(Credentials {
                    username,
                    password,
                    version,
                });
                true
            }
            Event::ResourceIndexUpdated(update) => {
                update.resource_type == POD_STORE_NAME && !update.is_initial_sync
            }
            Event::ResourceSyncComplete { resource_type, .. } => resource_type == POD_STORE_NAME,
            Event::BecameLeader => {
                self.replay();
                false
            }
            _ => false,
        }
    }

    /// On leadership transition, republish the last-known admitted fleet
    /// instead of waiting for the next event-triggered pass.
    fn replay(&self) {
        if !self.admitted.is_empty() {
            let endpoints: Vec<Endpoint> = self.admitted.values().cloned().collect();
            let count = endpoints.len();
            let bus = self.bus.clone();
            tokio::spawn(async move {
                bus.publish(Event::HAProxyPodsDiscovered { endpoints, count }).await;
            });
        }
    }

    async fn run_pass(&mut self) {
        let (Some(dataplane_port), Some(credentials)) =
            (self.dataplane_port, self.credentials.clone())
        else {
            return;
        };
        let Some(pod_store) = self.registry.get(POD_STORE_NAME) else {
            return;
        };

        let candidates = match discover_candidates(pod_store.as_ref(), dataplane_port) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "discovery pass: failed to list pod candidates");
                return;
            }
        };

        let current_names: HashSet<String> = candidates.iter().map(|c| c.pod_name.clone()).collect();

        // Removed-pod detection: anything admitted that's no longer a
        // structural candidate at all is terminated and pruned from every
        // bookkeeping set.
        let removed: Vec<String> = self
            .admitted
            .keys()
            .filter(|name| !current_names.contains(*name))
            .cloned()
            .collect();
        for pod_name in &removed {
            self.admitted.remove(pod_name);
            self.pending_retries.remove(pod_name);
            self.warned_set.remove(pod_name);
            self.rejected_set.remove(pod_name);
            self.bus
                .publish(Event::HAProxyPodTerminated {
                    pod_name: pod_name.clone(),
                })
                .await;
        }
        self.pending_retries.retain(|name, _| current_names.contains(name));
        self.rejected_set.retain(|name| current_names.contains(name));

        let now = self.clock.now();
        for candidate in &candidates {
            // Already admitted: reuse without re-probing (monotonicity invariant).
            if self.admitted.contains_key(&candidate.pod_name) {
                continue;
            }
            // Permanently rejected for a version mismatch: never retried.
            if self.rejected_set.contains(&candidate.pod_name) {
                continue;
            }
            // Still in backoff: skip until due.
            if let Some(pending) = self.pending_retries.get(&candidate.pod_name) {
                if pending.due_at() > now {
                    continue;
                }
            }

            match self
                .prober
                .probe(&candidate.url, &credentials.username, &credentials.password)
                .await
            {
                Ok(remote_version) => {
                    if remote_version < self.local_version {
                        warn!(
                            pod = %candidate.pod_name,
                            remote = %remote_version.full,
                            local = %self.local_version.full,
                            "discovery: pod's HAProxy version is older than the controller's, permanently rejecting"
                        );
                        self.rejected_set.insert(candidate.pod_name.clone());
                        self.pending_retries.remove(&candidate.pod_name);
                        continue;
                    }
                    if remote_version > self.local_version && self.warned_set.insert(candidate.pod_name.clone()) {
                        warn!(
                            pod = %candidate.pod_name,
                            remote = %remote_version.full,
                            local = %self.local_version.full,
                            "discovery: pod's HAProxy version is newer than the controller's, admitting anyway"
                        );
                    }
                    self.pending_retries.remove(&candidate.pod_name);
                    self.admitted.insert(
                        candidate.pod_name.clone(),
                        Endpoint {
                            url: candidate.url.clone(),
                            username: credentials.username.clone(),
                            password: credentials.password.clone(),
                            pod_name: candidate.pod_name.clone(),
                            pod_namespace: candidate.pod_namespace.clone(),
                            detected_major: remote_version.major,
                            detected_minor: remote_version.minor,
                            detected_full_version: remote_version.full,
                        },
                    );
                }
                Err(e) => {
                    let retry_count = self
                        .pending_retries
                        .get(&candidate.pod_name)
                        .map(|p| p.retry_count + 1)
                        .unwrap_or(0);
                    warn!(pod = %candidate.pod_name, error = %e, retry_count, "discovery: version probe failed, backing off");
                    self.pending_retries.insert(
                        candidate.pod_name.clone(),
                        PendingRetry {
                            last_attempt: now,
                            retry_count,
                        },
                    );
                }
            }
        }

        if !removed.is_empty() || !self.admitted.is_empty() {
            let endpoints: Vec<Endpoint> = self.admitted.values().cloned().collect();
            let count = endpoints.len();
            self.bus
                .publish(Event::HAProxyPodsDiscovered { endpoints, count })
                .await;
        }
    }
}
