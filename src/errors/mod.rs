//! Error type definitions for the HAProxy template ingress controller.
//!
//! Each subsystem gets its own `thiserror` enum so call sites can match on
//! the failure they actually care about; [`ControllerError`] aggregates
//! them for code (CLI wiring, tests) that just wants one error type.

use thiserror::Error;

/// Errors from the event bus.
#[derive(Error, Debug)]
pub enum EventBusError {
    /// A subscriber tried to register after the bus was told to stop accepting new subscribers.
    #[error("cannot subscribe: event bus is shutting down")]
    ShuttingDown,
}

/// Errors from the resource store registry and individual stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying store failed to list its resources.
    #[error("failed to list resources for store '{store}': {message}")]
    ListFailed { store: String, message: String },

    /// The underlying store failed an indexed lookup.
    #[error("failed to look up resources in store '{store}': {message}")]
    GetFailed { store: String, message: String },

    /// A requested store name is not registered.
    #[error("no store registered under name '{0}'")]
    NotFound(String),

    /// An index was queried with the wrong number of key components.
    #[error("index '{index}' on store '{store}' expects {expected} key(s), got {actual}")]
    KeyArityMismatch {
        store: String,
        index: String,
        expected: usize,
        actual: usize,
    },
}

/// Errors from HAProxy pod discovery.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Listing the pod store failed; the whole discovery pass is aborted.
    #[error("failed to list HAProxy pod store: {0}")]
    PodListFailed(String),

    /// The local HAProxy version could not be detected at construction time. Fatal.
    #[error("failed to detect local HAProxy version: {0}")]
    VersionDetectionFailed(String),

    /// A single pod's resource could not be parsed into a candidate.
    #[error("failed to parse pod '{pod}': {message}")]
    PodParseFailed { pod: String, message: String },

    /// A version probe against a candidate pod failed (timeout, connection, non-2xx, parse).
    #[error("version probe failed for pod '{pod}': {message}")]
    ProbeFailed { pod: String, message: String },
}

/// Errors from the rendering engine.
#[derive(Error, Debug)]
pub enum RenderError {
    /// One or more templates failed to compile at construction time. Fatal for the renderer.
    #[error("template compilation failed: {0}")]
    TemplateCompile(String),

    /// A named template failed to render during a cycle.
    #[error("failed to render template '{template}': {message}")]
    TemplateRender { template: String, message: String },

    /// Setting up the temporary validation directory failed.
    #[error("failed to set up validation environment: {0}")]
    ValidationSetup(String),

    /// The file registry detected a conflicting registration for the same (type, filename).
    #[error("file registry conflict for {file_type:?} file '{filename}': content differs between registrations")]
    FileRegistryConflict {
        file_type: crate::render::file_registry::FileType,
        filename: String,
    },

    /// A template invoked the `fail(message)` function.
    #[error("template called fail(): {0}")]
    TemplateFail(String),

    /// A critical `http.fetch()` call failed inside a template.
    #[error("critical HTTP fetch failed for '{url}': {message}")]
    HttpFetchFailed { url: String, message: String },
}

/// Errors from the HTTP resource store.
#[derive(Error, Debug)]
pub enum HttpStoreError {
    /// The HTTP request ultimately failed after exhausting retries, and the fetch was critical.
    #[error("fetch failed for '{url}' after {attempts} attempt(s): {message}")]
    FetchFailed {
        url: String,
        attempts: u32,
        message: String,
    },

    /// More than one authentication mode was supplied for a single URL.
    #[error("multiple authentication modes supplied for '{0}'")]
    AmbiguousAuth(String),

    /// The URL does not have a cache entry yet.
    #[error("no cache entry for '{0}'")]
    NoSuchEntry(String),
}

/// Configuration loading/validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid configuration: {field} - {message}")]
    Invalid { field: String, message: String },
}

/// Top-level error type used by the binary entrypoint and cross-subsystem glue.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("HTTP store error: {0}")]
    HttpStore(#[from] HttpStoreError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ConfigError {
    pub fn invalid<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl DiscoveryError {
    pub fn probe_failed<P: Into<String>, M: Into<String>>(pod: P, message: M) -> Self {
        Self::ProbeFailed {
            pod: pod.into(),
            message: message.into(),
        }
    }
}

impl RenderError {
    pub fn template_render<T: Into<String>, M: Into<String>>(template: T, message: M) -> Self {
        Self::TemplateRender {
            template: template.into(),
            message: message.into(),
        }
    }
}
