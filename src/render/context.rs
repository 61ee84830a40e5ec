//! Render context construction.
//!
//! `RenderContext` is the live, per-cycle state that custom template
//! functions close over (see [`super::template_engine`]); the accompanying
//! `serde_json::Value` built by [`build_static_context`] is the part tera
//! renders directly as ordinary context variables.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use super::file_registry::FileRegistry;
use super::http_wrapper::HttpWrapper;
use super::paths::ResolvedPaths;
use super::store_wrapper::StoreWrapper;
use crate::discovery::Capabilities;
use crate::events::ExtraContext;

/// Whether this render cycle is building the production output (deployed)
/// or the validation output (local syntax check only).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Production,
    Validation,
}

/// A named, priority-ordered snippet reference, already sorted for display.
#[derive(Debug, Clone)]
pub struct SnippetRef {
    pub name: String,
    pub priority: u32,
}

/// Sorts snippets by `(priority, name)`. Default priority is 500. Stable
/// and deterministic: the same input always yields the same order.
pub fn sort_snippets(mut snippets: Vec<SnippetRef>) -> Vec<SnippetRef> {
    snippets.sort_by(|a, b| (a.priority, &a.name).cmp(&(b.priority, &b.name)));
    snippets
}

/// The live objects one render cycle's custom template functions operate
/// against. Bound into the engine's "active render" slot for the duration
/// of a single `tera.render` call.
pub struct RenderContext {
    pub mode: RenderMode,
    pub resources: BTreeMap<String, Arc<StoreWrapper>>,
    pub controller_haproxy_pods: Arc<StoreWrapper>,
    pub file_registry: Arc<FileRegistry>,
    pub http: Arc<HttpWrapper>,
    pub paths: ResolvedPaths,
}

/// Builds the ordinary (non-function) context variables: `capabilities`,
/// `dataplane`, `template_snippets`, `resources.<type>` (eagerly materialized
/// via `List()`), `controller.haproxy_pods`, and user extra-context merged
/// at the top level.
pub fn build_static_context(
    render_ctx: &RenderContext,
    capabilities: &Capabilities,
    dataplane: &Value,
    snippets: &[SnippetRef],
    extra_context: &ExtraContext,
) -> Value {
    let mut resources = serde_json::Map::new();
    for (name, wrapper) in &render_ctx.resources {
        resources.insert(name.clone(), json!(wrapper.list().as_ref()));
    }

    let mut controller = serde_json::Map::new();
    controller.insert(
        "haproxy_pods".into(),
        json!(render_ctx.controller_haproxy_pods.list().as_ref()),
    );

    let snippet_names: Vec<&str> = snippets.iter().map(|s| s.name.as_str()).collect();

    let mut top = serde_json::Map::new();
    top.insert("resources".into(), Value::Object(resources));
    top.insert("controller".into(), Value::Object(controller));
    top.insert("template_snippets".into(), json!(snippet_names));
    top.insert("capabilities".into(), json!(capabilities.as_context_map()));
    top.insert("dataplane".into(), dataplane.clone());

    for (key, value) in extra_context {
        top.insert(key.clone(), value.clone());
    }

    Value::Object(top)
}
