//! The typed event catalog.
//!
//! Per REDESIGN FLAG 1, payloads are modeled as variants of a single enum
//! rather than an opaque value that consumers type-assert on. Adding a new
//! event kind is a compiler-checked change at every `match`.

use std::collections::BTreeMap;

use crate::discovery::Endpoint;
use crate::render::file_registry::AuxiliaryFiles;

/// One resource type's change batch, as published by the watcher layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIndexUpdate {
    pub resource_type: String,
    pub created: u64,
    pub modified: u64,
    pub deleted: u64,
    pub is_initial_sync: bool,
}

/// A successful render's outputs, cached by the renderer for leadership replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTemplate {
    pub production_config: String,
    pub validation_config: String,
    pub validation_paths: crate::render::paths::ResolvedPaths,
    pub auxiliary_files: AuxiliaryFiles,
    pub file_count: usize,
    pub duration_ms: u64,
}

/// Every event kind the core publishes or consumes. See the event catalog below.
#[derive(Debug, Clone)]
pub enum Event {
    /// New controller configuration became active.
    ConfigValidated { dataplane_port: u16 },

    /// New Dataplane credentials are available.
    CredentialsUpdated {
        username: String,
        password: String,
        version: String,
    },

    /// One watched resource type's store changed.
    ResourceIndexUpdated(ResourceIndexUpdate),

    /// The initial list of a resource type finished.
    ResourceSyncComplete { resource_type: String, count: u64 },

    /// This replica won leadership.
    BecameLeader,

    /// Request to re-render.
    ReconciliationTriggered,

    /// A successful render.
    TemplateRendered(RenderedTemplate),

    /// A render attempt failed.
    TemplateRenderFailed {
        template_name: String,
        formatted_error: String,
    },

    /// Local validation of a rendered config succeeded.
    ValidationCompleted,

    /// Local validation of a rendered config failed.
    ValidationFailed { errors: Vec<String> },

    /// The current admitted HAProxy pod endpoint set.
    HAProxyPodsDiscovered {
        endpoints: Vec<Endpoint>,
        count: usize,
    },

    /// A previously admitted pod disappeared.
    HAProxyPodTerminated { pod_name: String },

    /// An HTTP resource store URL produced new pending content.
    HTTPResourceUpdated { url: String },

    /// An HTTP resource store URL's pending content was promoted.
    HTTPResourceAccepted { url: String },

    /// An HTTP resource store URL's pending content was rejected.
    HTTPResourceRejected { url: String },
}

impl Event {
    /// A short tag used for logging without dumping whole payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConfigValidated { .. } => "ConfigValidated",
            Event::CredentialsUpdated { .. } => "CredentialsUpdated",
            Event::ResourceIndexUpdated(_) => "ResourceIndexUpdated",
            Event::ResourceSyncComplete { .. } => "ResourceSyncComplete",
            Event::BecameLeader => "BecameLeader",
            Event::ReconciliationTriggered => "ReconciliationTriggered",
            Event::TemplateRendered(_) => "TemplateRendered",
            Event::TemplateRenderFailed { .. } => "TemplateRenderFailed",
            Event::ValidationCompleted => "ValidationCompleted",
            Event::ValidationFailed { .. } => "ValidationFailed",
            Event::HAProxyPodsDiscovered { .. } => "HAProxyPodsDiscovered",
            Event::HAProxyPodTerminated { .. } => "HAProxyPodTerminated",
            Event::HTTPResourceUpdated { .. } => "HTTPResourceUpdated",
            Event::HTTPResourceAccepted { .. } => "HTTPResourceAccepted",
            Event::HTTPResourceRejected { .. } => "HTTPResourceRejected",
        }
    }
}

/// Extra-context template variables merged at the top level of the render context.
pub type ExtraContext = BTreeMap<String, serde_json::Value>;
