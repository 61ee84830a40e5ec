//! Exercises `DiscoveryAdapter` through its full `run()` event loop, not
//! just `run_pass()` directly, so the `ready()` gate and the backoff timer
//! selected against inside `run()` are actually under test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use haproxy_template_ingress::clock::{FakeClock, SharedClock};
use haproxy_template_ingress::discovery::{DataplaneVersionProber, DiscoveryAdapter, Version};
use haproxy_template_ingress::errors::DiscoveryError;
use haproxy_template_ingress::events::{Event, EventBus};
use haproxy_template_ingress::store::{MemoryResourceStore, ResourceStore, StoreRegistry};

struct ScriptedProber {
    responses: Mutex<HashMap<String, Vec<Result<Version, String>>>>,
}

impl ScriptedProber {
    fn new(responses: HashMap<String, Vec<Result<Version, String>>>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl DataplaneVersionProber for ScriptedProber {
    async fn probe(&self, base_url: &str, _u: &str, _p: &str) -> Result<Version, DiscoveryError> {
        let mut responses = self.responses.lock().unwrap();
        let queue = responses.get_mut(base_url).expect("unscripted url probed");
        match queue.remove(0) {
            Ok(v) => Ok(v),
            Err(e) => Err(DiscoveryError::probe_failed(base_url, e)),
        }
    }
}

fn running_pod(name: &str, ip: &str, port: u16) -> serde_json::Value {
    json!({
        "metadata": {"namespace": "ns", "name": name},
        "status": {
            "podIP": ip,
            "phase": "Running",
            "containerStatuses": [{"name": "haproxy", "ready": true}],
        },
        "spec": {"containers": [{"name": "haproxy", "ports": [{"containerPort": port}]}]},
    })
}

fn registry_with_pod(pod: serde_json::Value) -> StoreRegistry {
    let registry = StoreRegistry::new();
    let store = Arc::new(MemoryResourceStore::new(
        "haproxy-pods",
        vec!["metadata.namespace".into(), "metadata.name".into()],
        vec![],
    ));
    store.add(pod).unwrap();
    registry.register("haproxy-pods", store);
    registry
}

/// Scenario: config arrives first, then credentials. The pod store already
/// holds one running pod. Only the credentials event should complete the
/// `ready()` gate and produce exactly one `HAProxyPodsDiscovered`.
#[tokio::test(flavor = "multi_thread")]
async fn config_first_then_credentials_discovers_exactly_once() {
    let bus = EventBus::new();
    let mut observer = bus.subscribe("observer", 8).await;
    let adapter_events = bus.subscribe("discovery", 8).await;
    let registry = registry_with_pod(running_pod("pod-a", "10.0.0.1", 5555));

    let mut responses = HashMap::new();
    responses.insert(
        "http://10.0.0.1:5555/v3".to_string(),
        vec![Ok(Version::new(3, 2, "3.2.0"))],
    );
    let prober = Arc::new(ScriptedProber::new(responses));
    let clock: SharedClock = Arc::new(FakeClock::new(Utc::now()));
    let shutdown = CancellationToken::new();

    let adapter = DiscoveryAdapter::new(bus.clone(), registry, prober, Version::new(3, 2, "3.2.0"), clock);
    let run_shutdown = shutdown.clone();
    tokio::spawn(adapter.run(adapter_events, run_shutdown));

    bus.publish(Event::ConfigValidated { dataplane_port: 5555 }).await;

    // Config alone must not satisfy readiness: nothing should arrive yet.
    let premature = tokio::time::timeout(Duration::from_millis(100), observer.recv()).await;
    assert!(premature.is_err(), "ConfigValidated alone must not trigger a discovery pass");

    bus.publish(Event::CredentialsUpdated {
        username: "admin".into(),
        password: "secret".into(),
        version: "v1".into(),
    })
    .await;

    let event = tokio::time::timeout(Duration::from_secs(1), observer.recv())
        .await
        .expect("credentials should complete readiness and trigger discovery")
        .unwrap();
    match event {
        Event::HAProxyPodsDiscovered { endpoints, count } => {
            assert_eq!(count, 1);
            assert_eq!(endpoints[0].pod_name, "pod-a");
            assert_eq!(endpoints[0].url, "http://10.0.0.1:5555/v3");
            assert_eq!(endpoints[0].username, "admin");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert!(
        observer.try_recv().is_err(),
        "expected exactly one HAProxyPodsDiscovered"
    );
    shutdown.cancel();
}

/// Scenario: the first probe for a pod times out. A timer-driven pass ~5s
/// later (simulated via paused tokio time) admits it. A subsequent
/// discovery pass reuses the cached endpoint without probing again.
#[tokio::test(flavor = "multi_thread", start_paused = true)]
async fn retry_then_admission_reuses_cached_endpoint() {
    let bus = EventBus::new();
    let mut observer = bus.subscribe("observer", 8).await;
    let adapter_events = bus.subscribe("discovery", 8).await;
    let registry = registry_with_pod(running_pod("pod-x", "10.0.0.9", 5555));

    let mut responses = HashMap::new();
    responses.insert(
        "http://10.0.0.9:5555/v3".to_string(),
        vec![Err("timed out".to_string()), Ok(Version::new(3, 2, "3.2.0"))],
    );
    let prober = Arc::new(ScriptedProber::new(responses));
    let start = Utc::now();
    let clock = Arc::new(FakeClock::new(start));
    let shared_clock: SharedClock = clock.clone();
    let shutdown = CancellationToken::new();

    let adapter = DiscoveryAdapter::new(bus.clone(), registry, prober, Version::new(3, 2, "3.2.0"), shared_clock);
    let run_shutdown = shutdown.clone();
    tokio::spawn(adapter.run(adapter_events, run_shutdown));

    bus.publish(Event::ConfigValidated { dataplane_port: 5555 }).await;
    bus.publish(Event::CredentialsUpdated {
        username: "admin".into(),
        password: "secret".into(),
        version: "v1".into(),
    })
    .await;

    // First pass: the probe fails, nothing is admitted yet, so no
    // HAProxyPodsDiscovered is published (an empty fleet with nothing
    // removed produces no event).
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(observer.try_recv().is_err(), "a failed probe with nothing admitted must not publish");

    // Advance both the adapter's clock and tokio's virtual timer past the
    // base backoff window so the timer-driven pass fires.
    clock.advance(chrono::Duration::seconds(6));
    tokio::time::advance(Duration::from_secs(6)).await;

    let event = tokio::time::timeout(Duration::from_secs(1), observer.recv())
        .await
        .expect("the timer-driven retry pass should admit the pod")
        .unwrap();
    match event {
        Event::HAProxyPodsDiscovered { endpoints, count } => {
            assert_eq!(count, 1);
            assert_eq!(endpoints[0].pod_name, "pod-x");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // A further resource-index update triggers another pass. The cached
    // endpoint is reused: the scripted prober's queue for this URL is
    // already exhausted, so a second probe attempt would panic.
    bus.publish(Event::ResourceIndexUpdated(haproxy_template_ingress::events::ResourceIndexUpdate {
        resource_type: "haproxy-pods".into(),
        created: 0,
        modified: 1,
        deleted: 0,
        is_initial_sync: false,
    }))
    .await;

    let event = tokio::time::timeout(Duration::from_secs(1), observer.recv())
        .await
        .expect("the follow-up pass should republish the cached fleet")
        .unwrap();
    match event {
        Event::HAProxyPodsDiscovered { endpoints, count } => {
            assert_eq!(count, 1);
            assert_eq!(endpoints[0].pod_name, "pod-x");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    shutdown.cancel();
}
