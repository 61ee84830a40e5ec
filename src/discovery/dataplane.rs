//! The Dataplane version-probe HTTP surface.
//!
//! Only the version-probe entry point is part of the core; the rest of the
//! Dataplane API (configuration pushes, deployment) is an external
//! collaborator referenced only by this interface.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::version::Version;
use crate::errors::DiscoveryError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct InfoResponse {
    version: String,
}

/// Something that can answer "what HAProxy version is running behind this URL?"
#[async_trait]
pub trait DataplaneVersionProber: Send + Sync {
    /// GET `{base_url}/info`, authenticated, with a bounded deadline.
    /// Any non-2xx or parse failure is a probe failure.
    async fn probe(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Version, DiscoveryError>;
}

/// Production prober backed by `reqwest`.
pub struct ReqwestVersionProber {
    client: reqwest::Client,
}

impl ReqwestVersionProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(PROBE_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
        }
    }
}

impl Default for ReqwestVersionProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataplaneVersionProber for ReqwestVersionProber {
    async fn probe(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Version, DiscoveryError> {
        let url = format!("{}/info", base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .basic_auth(username, Some(password))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| DiscoveryError::probe_failed(base_url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(DiscoveryError::probe_failed(
                base_url,
                format!("non-2xx status {}", response.status()),
            ));
        }

        let info: InfoResponse = response
            .json()
            .await
            .map_err(|e| DiscoveryError::probe_failed(base_url, format!("invalid JSON: {e}")))?;

        Version::from_str(&info.version)
            .map_err(|e| DiscoveryError::probe_failed(base_url, e))
    }
}

/// Detects the controller's own local HAProxy version at startup. Fatal if
/// it fails.
#[async_trait]
pub trait LocalVersionSource: Send + Sync {
    async fn detect(&self) -> Result<Version, DiscoveryError>;
}

/// A local version source that probes a fixed, locally-reachable Dataplane endpoint.
pub struct ProbedLocalVersionSource {
    prober: Box<dyn DataplaneVersionProber>,
    local_url: String,
    username: String,
    password: String,
}

impl ProbedLocalVersionSource {
    pub fn new(
        prober: Box<dyn DataplaneVersionProber>,
        local_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            prober,
            local_url: local_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl LocalVersionSource for ProbedLocalVersionSource {
    async fn detect(&self) -> Result<Version, DiscoveryError> {
        self.prober
            .probe(&self.local_url, &self.username, &self.password)
            .await
            .map_err(|e| DiscoveryError::VersionDetectionFailed(e.to_string()))
    }
}

/// A fixed local version, for tests and for deployments that pin the
/// controller's expected HAProxy version via configuration instead of
/// probing it.
pub struct FixedLocalVersionSource(pub Version);

#[async_trait]
impl LocalVersionSource for FixedLocalVersionSource {
    async fn detect(&self) -> Result<Version, DiscoveryError> {
        Ok(self.0.clone())
    }
}
