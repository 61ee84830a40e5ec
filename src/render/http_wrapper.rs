//! Template-facing HTTP fetch surface.
//!
//! Bridges the synchronous template-function call site to the async
//! [`HttpResourceStore`] via `block_in_place`, which is sound here because
//! the render cycle that drives this runs on a multi-threaded Tokio runtime
//! and never nests inside another blocking call.

use std::sync::Arc;

use super::context::RenderMode;
use crate::errors::RenderError;
use crate::http_store::{AuthMode, FetchOptions, HttpResourceStore};

/// A registrar callback invoked when a freshly-fetched URL declares a
/// non-zero refresh delay, so the caller (the rendering engine) can start a
/// periodic-refresh timer for it via the HTTP store's adapter.
pub type RefreshRegistrar = Arc<dyn Fn(String) + Send + Sync>;

pub struct HttpWrapper {
    store: Arc<HttpResourceStore>,
    mode: RenderMode,
    refresh_registrar: Option<RefreshRegistrar>,
}

impl HttpWrapper {
    pub fn new(store: Arc<HttpResourceStore>, mode: RenderMode, refresh_registrar: Option<RefreshRegistrar>) -> Self {
        Self {
            store,
            mode,
            refresh_registrar,
        }
    }

    /// Validation renders prefer pending content if any, else accepted.
    /// Production renders only ever see accepted content. On a cache miss,
    /// performs a synchronous fetch and registers periodic refresh if the
    /// URL declares a delay. A critical fetch that ultimately fails
    /// propagates as a render error instead of substituting empty content;
    /// the store itself already absorbs non-critical failures into `Ok("")`.
    pub fn fetch(&self, url: &str, options: FetchOptions, auth: Option<AuthMode>) -> Result<String, RenderError> {
        let cached = block_on(async {
            match self.mode {
                RenderMode::Validation => self.store.get_for_validation(url).await,
                RenderMode::Production => self.store.get(url).await,
            }
        });
        if let Some(content) = cached {
            return Ok(content);
        }

        let delay = options.delay;
        let body = block_on(self.store.fetch(url, options, auth)).map_err(|e| RenderError::HttpFetchFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if let Some(delay) = delay {
            if !delay.is_zero() {
                if let Some(registrar) = &self.refresh_registrar {
                    registrar(url.to_string());
                }
            }
        }
        Ok(body)
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
