//! The pure discovery engine: pod list in, endpoint candidates out.
//!
//! No I/O, no state, no version gating — just structural filtering over the
//! pod resource's JSON shape. The stateful adapter (see [`super::adapter`])
//! layers version-compatibility gating and retry bookkeeping on top of this.

use serde_json::Value;

use crate::errors::DiscoveryError;
use crate::store::ResourceStore;

/// Dataplane credentials, shared by every admitted endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub version: String,
}

/// A pod that passed every structural filter, before version gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub pod_name: String,
    pub pod_namespace: String,
}

/// A version-gated, admitted HAProxy pod endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub username: String,
    pub password: String,
    pub pod_name: String,
    pub pod_namespace: String,
    pub detected_major: u32,
    pub detected_minor: u32,
    pub detected_full_version: String,
}

/// Runs the pure per-pod filter chain over every resource in `pod_store`,
/// producing the set of structurally-valid candidates. Order is unspecified;
/// callers treat the result as a set keyed by `pod_name`.
pub fn discover_candidates(
    pod_store: &dyn ResourceStore,
    dataplane_port: u16,
) -> Result<Vec<Candidate>, DiscoveryError> {
    let pods = pod_store
        .list()
        .map_err(|e| DiscoveryError::PodListFailed(e.to_string()))?;

    let mut candidates = Vec::new();
    for pod in &pods {
        if let Some(candidate) = candidate_from_pod(pod, dataplane_port)? {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

fn candidate_from_pod(
    pod: &Value,
    dataplane_port: u16,
) -> Result<Option<Candidate>, DiscoveryError> {
    let pod_name = get_str(pod, &["metadata", "name"]).ok_or_else(|| {
        DiscoveryError::PodParseFailed {
            pod: "<unknown>".into(),
            message: "missing metadata.name".into(),
        }
    })?;

    // 1. Terminating pods are never candidates.
    if get_str(pod, &["metadata", "deletionTimestamp"]).is_some() {
        return Ok(None);
    }

    let pod_namespace = get_str(pod, &["metadata", "namespace"]).ok_or_else(|| {
        DiscoveryError::PodParseFailed {
            pod: pod_name.clone(),
            message: "missing metadata.namespace".into(),
        }
    })?;

    // 2. Pod must have an IP.
    let Some(pod_ip) = get_str(pod, &["status", "podIP"]) else {
        return Ok(None);
    };
    if pod_ip.is_empty() {
        return Ok(None);
    }

    // 3. Pod must be Running.
    if get_str(pod, &["status", "phase"]).as_deref() != Some("Running") {
        return Ok(None);
    }

    // 4. Locate the container exposing the configured Dataplane port.
    let containers = pod
        .pointer("/spec/containers")
        .and_then(Value::as_array)
        .ok_or_else(|| DiscoveryError::PodParseFailed {
            pod: pod_name.clone(),
            message: "missing spec.containers".into(),
        })?;

    let Some(container_name) = containers.iter().find_map(|c| {
        let ports = c.pointer("/ports").and_then(Value::as_array)?;
        let has_port = ports.iter().any(|p| {
            p.pointer("/containerPort")
                .and_then(Value::as_u64)
                .map(|port| port as u16 == dataplane_port)
                .unwrap_or(false)
        });
        if has_port {
            c.pointer("/name").and_then(Value::as_str).map(String::from)
        } else {
            None
        }
    }) else {
        // No container exposes the dataplane port: fail closed, skip this pod.
        return Ok(None);
    };

    // 5. That container's status must report ready.
    let container_statuses = pod
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
        .ok_or_else(|| DiscoveryError::PodParseFailed {
            pod: pod_name.clone(),
            message: "missing status.containerStatuses".into(),
        })?;

    let is_ready = container_statuses.iter().any(|cs| {
        cs.pointer("/name").and_then(Value::as_str) == Some(container_name.as_str())
            && cs
                .pointer("/ready")
                .and_then(Value::as_bool)
                .unwrap_or(false)
    });
    if !is_ready {
        return Ok(None);
    }

    let url = format!("http://{pod_ip}:{dataplane_port}/v3");
    url::Url::parse(&url).map_err(|e| DiscoveryError::PodParseFailed {
        pod: pod_name.clone(),
        message: format!("podIP '{pod_ip}' does not form a valid Dataplane URL: {e}"),
    })?;

    Ok(Some(Candidate {
        url,
        pod_name,
        pod_namespace,
    }))
}

fn get_str(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for segment in path {
        current = current.get(segment)?;
    }
    current.as_str().map(String::from)
}
