//! The HTTP resource store: fetch, two-version cache, conditional
//! refresh.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::auth::AuthMode;
use super::cache::{checksum, CacheEntry, FetchOptions, ValidationState};
use crate::errors::HttpStoreError;

/// Thread-safe, cache-first HTTP content store with validation-gated promotion.
/// The cache map's identity is stable for the store's lifetime; every
/// accessor goes through the single reader/writer lock.
pub struct HttpResourceStore {
    client: reqwest::Client,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl HttpResourceStore {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::limited(10))
                .build()
                .expect("reqwest client builds with static config"),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cache-first fetch. On miss, performs a GET with retries and stores the
    /// result as accepted. Non-critical failures return empty content and
    /// leave the cache untouched; critical failures propagate.
    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        auth: Option<AuthMode>,
    ) -> Result<String, HttpStoreError> {
        if let Some(entry) = self.cache.read().await.get(url) {
            return Ok(entry.accepted_content.clone());
        }

        match self.get_with_retries(url, &options, auth.as_ref()).await {
            Ok((body, etag, last_modified)) => {
                let mut entry =
                    CacheEntry::new_accepted(url, body.clone(), chrono::Utc::now(), options, auth);
                entry.etag = etag;
                entry.last_modified = last_modified;
                self.cache.write().await.insert(url.to_string(), entry);
                Ok(body)
            }
            Err(e) => {
                if options.critical {
                    Err(e)
                } else {
                    warn!(url, error = %e, "non-critical HTTP fetch failed, returning empty content");
                    Ok(String::new())
                }
            }
        }
    }

    /// Conditional GET against an existing cache entry. On a body change,
    /// stores the new body as pending and returns `true`. On 304 or an
    /// identical checksum, returns `false` without mutating the cache.
    pub async fn refresh_url(&self, url: &str) -> Result<bool, HttpStoreError> {
        let (options, auth, etag, last_modified) = {
            let cache = self.cache.read().await;
            let entry = cache
                .get(url)
                .ok_or_else(|| HttpStoreError::NoSuchEntry(url.to_string()))?;
            (
                entry.options.clone(),
                entry.auth.clone(),
                entry.etag.clone(),
                entry.last_modified.clone(),
            )
        };

        let mut request = self.client.get(url).timeout(options.timeout);
        if let Some(etag) = &etag {
            request = request.header("If-None-Match", etag);
        }
        if let Some(last_modified) = &last_modified {
            request = request.header("If-Modified-Since", last_modified);
        }
        if let Some(auth) = &auth {
            request = auth.apply(request);
        }

        let response = request
            .send()
            .await
            .map_err(|e| HttpStoreError::FetchFailed {
                url: url.to_string(),
                attempts: 1,
                message: e.to_string(),
            })?;

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(HttpStoreError::FetchFailed {
                url: url.to_string(),
                attempts: 1,
                message: format!("non-2xx status {}", response.status()),
            });
        }

        let new_etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let new_last_modified = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let body = response
            .text()
            .await
            .map_err(|e| HttpStoreError::FetchFailed {
                url: url.to_string(),
                attempts: 1,
                message: e.to_string(),
            })?;

        let mut cache = self.cache.write().await;
        let entry = cache
            .get_mut(url)
            .ok_or_else(|| HttpStoreError::NoSuchEntry(url.to_string()))?;
        entry.etag = new_etag;
        entry.last_modified = new_last_modified;

        if checksum(&body) == entry.accepted_checksum {
            return Ok(false);
        }
        Ok(entry.stage_pending(body))
    }

    async fn get_with_retries(
        &self,
        url: &str,
        options: &FetchOptions,
        auth: Option<&AuthMode>,
    ) -> Result<(String, Option<String>, Option<String>), HttpStoreError> {
        let attempts = options.retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let mut request = self.client.get(url).timeout(options.timeout);
            if let Some(auth) = auth {
                request = auth.apply(request);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let etag = response
                        .headers()
                        .get("etag")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    let last_modified = response
                        .headers()
                        .get("last-modified")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    let body = response.text().await.map_err(|e| e.to_string());
                    match body {
                        Ok(body) => return Ok((body, etag, last_modified)),
                        Err(e) => last_error = e,
                    }
                }
                Ok(response) => {
                    last_error = format!("non-2xx status {}", response.status());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                debug!(url, attempt, "HTTP fetch attempt failed, retrying");
                sleep(options.retry_delay).await;
            }
        }

        Err(HttpStoreError::FetchFailed {
            url: url.to_string(),
            attempts,
            message: last_error,
        })
    }

    pub async fn get(&self, url: &str) -> Option<String> {
        self.cache
            .read()
            .await
            .get(url)
            .map(|e| e.accepted_content.clone())
    }

    pub async fn get_pending(&self, url: &str) -> Option<String> {
        self.cache
            .read()
            .await
            .get(url)
            .and_then(|e| e.pending_content.clone())
    }

    /// Validation renders prefer pending content if any, else accepted.
    pub async fn get_for_validation(&self, url: &str) -> Option<String> {
        let cache = self.cache.read().await;
        let entry = cache.get(url)?;
        Some(
            entry
                .pending_content
                .clone()
                .unwrap_or_else(|| entry.accepted_content.clone()),
        )
    }

    pub async fn promote_pending(&self, url: &str) -> Result<(), HttpStoreError> {
        let mut cache = self.cache.write().await;
        let entry = cache
            .get_mut(url)
            .ok_or_else(|| HttpStoreError::NoSuchEntry(url.to_string()))?;
        entry.promote_pending();
        Ok(())
    }

    pub async fn reject_pending(&self, url: &str) -> Result<(), HttpStoreError> {
        let mut cache = self.cache.write().await;
        let entry = cache
            .get_mut(url)
            .ok_or_else(|| HttpStoreError::NoSuchEntry(url.to_string()))?;
        entry.reject_pending();
        Ok(())
    }

    /// Fleet-wide promotion: every URL currently holding pending content is promoted.
    pub async fn promote_all_pending(&self) -> Vec<String> {
        let mut cache = self.cache.write().await;
        let mut promoted = Vec::new();
        for (url, entry) in cache.iter_mut() {
            if entry.has_pending() {
                entry.promote_pending();
                promoted.push(url.clone());
            }
        }
        promoted
    }

    /// Fleet-wide rejection: every URL currently holding pending content is rejected.
    pub async fn reject_all_pending(&self) -> Vec<String> {
        let mut cache = self.cache.write().await;
        let mut rejected = Vec::new();
        for (url, entry) in cache.iter_mut() {
            if entry.has_pending() {
                entry.reject_pending();
                rejected.push(url.clone());
            }
        }
        rejected
    }

    /// Directly inject accepted content for tests, bypassing HTTP entirely.
    pub async fn load_fixture(&self, url: &str, content: impl Into<String>) {
        let entry = CacheEntry::new_accepted(
            url,
            content.into(),
            chrono::Utc::now(),
            FetchOptions::default(),
            None,
        );
        self.cache.write().await.insert(url.to_string(), entry);
    }

    pub async fn get_delay(&self, url: &str) -> Option<Duration> {
        self.cache.read().await.get(url)?.options.delay
    }

    pub async fn get_pending_urls(&self) -> Vec<String> {
        self.cache
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.has_pending())
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub async fn size(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    #[cfg(test)]
    pub async fn validation_state(&self, url: &str) -> Option<ValidationState> {
        self.cache.read().await.get(url).map(|e| e.validation_state)
    }

    /// Test-only: stage pending content directly, bypassing HTTP, to drive
    /// the validation-gated promotion/rejection paths without a mock server.
    #[cfg(test)]
    pub async fn stage_pending_for_test(&self, url: &str, content: impl Into<String>) {
        let mut cache = self.cache.write().await;
        if let Some(entry) = cache.get_mut(url) {
            entry.stage_pending(content.into());
        }
    }
}

impl Default for HttpResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedHttpResourceStore = Arc<HttpResourceStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_is_cache_first_after_first_successful_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_string("A"))
            .expect(1)
            .mount(&server)
            .await;

        let store = HttpResourceStore::new();
        let url = format!("{}/x", server.uri());

        let first = store.fetch(&url, FetchOptions::default(), None).await.unwrap();
        let second = store.fetch(&url, FetchOptions::default(), None).await.unwrap();
        assert_eq!(first, "A");
        assert_eq!(second, "A");
    }

    #[tokio::test]
    async fn two_version_lifecycle_rejects_then_accepts_pending_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(ResponseTemplate::new(200).set_body_string("A"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/x"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("B")
                    .insert_header("etag", "\"v2\""),
            )
            .mount(&server)
            .await;

        let store = HttpResourceStore::new();
        let url = format!("{}/x", server.uri());

        store.fetch(&url, FetchOptions::default(), None).await.unwrap();
        assert_eq!(store.get(&url).await, Some("A".to_string()));

        let changed = store.refresh_url(&url).await.unwrap();
        assert!(changed);
        assert_eq!(store.get_pending(&url).await, Some("B".to_string()));

        store.reject_pending(&url).await.unwrap();
        assert_eq!(store.get(&url).await, Some("A".to_string()));
        assert_eq!(store.get_pending(&url).await, None);

        let changed_again = store.refresh_url(&url).await.unwrap();
        assert!(changed_again);
        assert_eq!(store.get_pending(&url).await, Some("B".to_string()));

        store.promote_pending(&url).await.unwrap();
        assert_eq!(store.get(&url).await, Some("B".to_string()));
        assert_eq!(store.get_pending(&url).await, None);
    }

    #[tokio::test]
    async fn non_critical_failure_returns_empty_without_mutating_cache() {
        let store = HttpResourceStore::new();
        let options = FetchOptions {
            retries: 1,
            critical: false,
            ..FetchOptions::default()
        };
        let result = store
            .fetch("http://127.0.0.1:1/unreachable", options, None)
            .await
            .unwrap();
        assert_eq!(result, "");
        assert_eq!(store.size().await, 0);
    }

    #[tokio::test]
    async fn critical_failure_propagates() {
        let store = HttpResourceStore::new();
        let options = FetchOptions {
            retries: 1,
            critical: true,
            ..FetchOptions::default()
        };
        let result = store.fetch("http://127.0.0.1:1/unreachable", options, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn basic_auth_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secure"))
            .and(header("authorization", "Basic dTpw"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let store = HttpResourceStore::new();
        let url = format!("{}/secure", server.uri());
        let auth = AuthMode::Basic {
            username: "u".into(),
            password: "p".into(),
        };
        let body = store.fetch(&url, FetchOptions::default(), Some(auth)).await.unwrap();
        assert_eq!(body, "ok");
    }
}
