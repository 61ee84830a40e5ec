//! The template engine contract and
//! its `tera`-backed implementation.
//!
//! Tera has no notion of a method call on a context value
//! (`resources.foo.List()`), so that surface is realized as global functions
//! (`resource_list`, `resource_fetch`,
//! `resource_get_single`, `http_fetch`, `register_file`, `get_path`) that
//! close over a per-cycle [`RenderContext`] slot, plus ordinary context
//! variables for everything that doesn't need live dispatch.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tera::{Tera, Value as TeraValue};

use super::context::RenderContext;
use super::file_registry::FileType;
use super::store_wrapper::coerce_key;
use crate::errors::RenderError;
use crate::http_store::{AuthMode, FetchOptions};

/// A config-declared post-processing step applied to a template's output
/// after rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessStep {
    TrimTrailingWhitespace,
    EnsureTrailingNewline,
}

pub fn apply_post_processors(content: &str, steps: &[PostProcessStep]) -> String {
    let mut content = content.to_string();
    for step in steps {
        content = match step {
            PostProcessStep::TrimTrailingWhitespace => content
                .lines()
                .map(|line| line.trim_end())
                .collect::<Vec<_>>()
                .join("\n"),
            PostProcessStep::EnsureTrailingNewline => {
                if content.ends_with('\n') {
                    content
                } else {
                    content + "\n"
                }
            }
        };
    }
    content
}

/// What the rendering engine needs from a template engine: named
/// pre-compilation (fatal on failure), render-by-name, and the mandatory
/// filters/functions.
pub trait TemplateEngine: Send + Sync {
    fn render(&self, name: &str, context: &Value, render_ctx: Arc<RenderContext>) -> Result<String, RenderError>;
}

fn file_type_from_str(s: &str) -> Option<FileType> {
    match s {
        "map" => Some(FileType::Map),
        "cert" => Some(FileType::Cert),
        "file" => Some(FileType::File),
        "crt-list" => Some(FileType::CrtList),
        _ => None,
    }
}

/// Production implementation backed by `tera`. All templates under
/// `template_dir` are compiled once at construction; any compile failure is
/// fatal, matching the "fatal at startup" contract.
pub struct TeraTemplateEngine {
    tera: Tera,
    active: Arc<Mutex<Option<Arc<RenderContext>>>>,
}

impl TeraTemplateEngine {
    pub fn new(template_dir: &Path) -> Result<Self, RenderError> {
        let glob_pattern = format!("{}/**/*", template_dir.display());
        let mut tera = Tera::new(&glob_pattern).map_err(|e| RenderError::TemplateCompile(e.to_string()))?;

        tera.register_filter("glob_match", glob_match_filter);
        tera.register_filter("b64decode", b64decode_filter);

        let active: Arc<Mutex<Option<Arc<RenderContext>>>> = Arc::new(Mutex::new(None));

        tera.register_function("fail", fail_function());
        tera.register_function("get_path", get_path_function(active.clone()));
        tera.register_function("register_file", register_file_function(active.clone()));
        tera.register_function("resource_fetch", resource_fetch_function(active.clone()));
        tera.register_function("resource_get_single", resource_get_single_function(active.clone()));
        tera.register_function("http_fetch", http_fetch_function(active.clone()));

        Ok(Self { tera, active })
    }
}

/// Prefixes the message `fail_function` raises so `render` can tell a
/// template's explicit `fail()` call apart from an ordinary render error.
const FAIL_FUNCTION_MARKER: &str = "\u{1}fail\u{1}";

impl TemplateEngine for TeraTemplateEngine {
    fn render(&self, name: &str, context: &Value, render_ctx: Arc<RenderContext>) -> Result<String, RenderError> {
        let tera_context = tera::Context::from_serialize(context)
            .map_err(|e| RenderError::template_render(name, format!("invalid context: {e}")))?;

        *self.active.lock().expect("render-context slot poisoned") = Some(render_ctx);
        let result = self.tera.render(name, &tera_context);
        *self.active.lock().expect("render-context slot poisoned") = None;

        result.map_err(|e| {
            let message = format_tera_error(&e);
            match message.strip_prefix(FAIL_FUNCTION_MARKER) {
                Some(fail_message) => RenderError::TemplateFail(fail_message.to_string()),
                None => RenderError::template_render(name, message),
            }
        })
    }
}

fn format_tera_error(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        message.push_str(&format!("\ncaused by: {err}"));
        source = err.source();
    }
    message
}

fn glob_match_filter(value: &TeraValue, args: &HashMap<String, TeraValue>) -> tera::Result<TeraValue> {
    let haystack = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("glob_match: value is not a string"))?;
    let pattern_str = args
        .get("pattern")
        .and_then(TeraValue::as_str)
        .ok_or_else(|| tera::Error::msg("glob_match: missing 'pattern' argument"))?;
    let pattern = glob::Pattern::new(pattern_str).map_err(|e| tera::Error::msg(e.to_string()))?;
    Ok(TeraValue::Bool(pattern.matches(haystack)))
}

fn b64decode_filter(value: &TeraValue, _args: &HashMap<String, TeraValue>) -> tera::Result<TeraValue> {
    let encoded = value
        .as_str()
        .ok_or_else(|| tera::Error::msg("b64decode: value is not a string"))?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| tera::Error::msg(format!("b64decode: {e}")))?;
    let text = String::from_utf8(decoded).map_err(|e| tera::Error::msg(format!("b64decode: {e}")))?;
    Ok(TeraValue::String(text))
}

fn fail_function() -> impl tera::Function {
    move |args: &HashMap<String, TeraValue>| -> tera::Result<TeraValue> {
        let message = args
            .get("message")
            .and_then(TeraValue::as_str)
            .unwrap_or("template called fail() with no message");
        Err(tera::Error::msg(format!("{FAIL_FUNCTION_MARKER}{message}")))
    }
}

fn get_path_function(active: Arc<Mutex<Option<Arc<RenderContext>>>>) -> impl tera::Function {
    move |args: &HashMap<String, TeraValue>| -> tera::Result<TeraValue> {
        let guard = active.lock().expect("render-context slot poisoned");
        let ctx = guard.as_ref().ok_or_else(|| tera::Error::msg("get_path: no active render"))?;
        let filename = args
            .get("filename")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("get_path: missing 'filename'"))?;
        let type_str = args
            .get("type")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("get_path: missing 'type'"))?;
        let file_type = file_type_from_str(type_str)
            .ok_or_else(|| tera::Error::msg(format!("get_path: unknown type '{type_str}'")))?;
        let path = ctx.paths.get_path(filename, file_type);
        Ok(TeraValue::String(path.to_string_lossy().into_owned()))
    }
}

fn register_file_function(active: Arc<Mutex<Option<Arc<RenderContext>>>>) -> impl tera::Function {
    move |args: &HashMap<String, TeraValue>| -> tera::Result<TeraValue> {
        let guard = active.lock().expect("render-context slot poisoned");
        let ctx = guard.as_ref().ok_or_else(|| tera::Error::msg("register_file: no active render"))?;
        let filename = args
            .get("filename")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("register_file: missing 'filename'"))?;
        let content = args
            .get("content")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("register_file: missing 'content'"))?;
        let type_str = args
            .get("type")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("register_file: missing 'type'"))?;
        let file_type = file_type_from_str(type_str)
            .ok_or_else(|| tera::Error::msg(format!("register_file: unknown type '{type_str}'")))?;
        let path = ctx
            .file_registry
            .register(file_type, filename, content)
            .map_err(|e| tera::Error::msg(e.to_string()))?;
        Ok(TeraValue::String(path.to_string_lossy().into_owned()))
    }
}

fn resource_fetch_function(active: Arc<Mutex<Option<Arc<RenderContext>>>>) -> impl tera::Function {
    move |args: &HashMap<String, TeraValue>| -> tera::Result<TeraValue> {
        let guard = active.lock().expect("render-context slot poisoned");
        let ctx = guard.as_ref().ok_or_else(|| tera::Error::msg("resource_fetch: no active render"))?;
        let type_name = args
            .get("type")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("resource_fetch: missing 'type'"))?;
        let wrapper = ctx
            .resources
            .get(type_name)
            .ok_or_else(|| tera::Error::msg(format!("resource_fetch: unknown resource type '{type_name}'")))?;
        let keys: Vec<TeraValue> = args
            .get("keys")
            .and_then(TeraValue::as_array)
            .cloned()
            .unwrap_or_default();
        let keys: Vec<TeraValue> = keys.iter().map(|k| serde_json::json!(coerce_key(k))).collect();
        Ok(serde_json::json!(wrapper.fetch(&keys)))
    }
}

fn resource_get_single_function(active: Arc<Mutex<Option<Arc<RenderContext>>>>) -> impl tera::Function {
    move |args: &HashMap<String, TeraValue>| -> tera::Result<TeraValue> {
        let guard = active.lock().expect("render-context slot poisoned");
        let ctx = guard.as_ref().ok_or_else(|| tera::Error::msg("resource_get_single: no active render"))?;
        let type_name = args
            .get("type")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("resource_get_single: missing 'type'"))?;
        let wrapper = ctx
            .resources
            .get(type_name)
            .ok_or_else(|| tera::Error::msg(format!("resource_get_single: unknown resource type '{type_name}'")))?;
        let keys: Vec<TeraValue> = args
            .get("keys")
            .and_then(TeraValue::as_array)
            .cloned()
            .unwrap_or_default();
        let keys: Vec<TeraValue> = keys.iter().map(|k| serde_json::json!(coerce_key(k))).collect();
        Ok(wrapper.get_single(&keys).unwrap_or(TeraValue::Null))
    }
}

fn http_fetch_function(active: Arc<Mutex<Option<Arc<RenderContext>>>>) -> impl tera::Function {
    move |args: &HashMap<String, TeraValue>| -> tera::Result<TeraValue> {
        let guard = active.lock().expect("render-context slot poisoned");
        let ctx = guard.as_ref().ok_or_else(|| tera::Error::msg("http_fetch: no active render"))?;
        let url = args
            .get("url")
            .and_then(TeraValue::as_str)
            .ok_or_else(|| tera::Error::msg("http_fetch: missing 'url'"))?;

        let options = args
            .get("options")
            .map(|v| parse_fetch_options(v))
            .unwrap_or_default();
        let auth = args.get("auth").and_then(parse_auth_mode);

        match ctx.http.fetch(url, options, auth) {
            Ok(body) => Ok(TeraValue::String(body)),
            Err(e) => Err(tera::Error::msg(e.to_string())),
        }
    }
}

fn parse_fetch_options(value: &TeraValue) -> FetchOptions {
    let mut options = FetchOptions::default();
    if let Some(delay) = value.get("delay").and_then(TeraValue::as_u64) {
        options.delay = Some(std::time::Duration::from_secs(delay));
    }
    if let Some(timeout) = value.get("timeout").and_then(TeraValue::as_u64) {
        options.timeout = std::time::Duration::from_secs(timeout);
    }
    if let Some(retries) = value.get("retries").and_then(TeraValue::as_u64) {
        options.retries = retries as u32;
    }
    if let Some(critical) = value.get("critical").and_then(TeraValue::as_bool) {
        options.critical = critical;
    }
    options
}

fn parse_auth_mode(value: &TeraValue) -> Option<AuthMode> {
    let auth_type = value.get("type").and_then(TeraValue::as_str)?;
    match auth_type {
        "basic" => Some(AuthMode::Basic {
            username: value.get("username")?.as_str()?.to_string(),
            password: value.get("password")?.as_str()?.to_string(),
        }),
        "bearer" => Some(AuthMode::Bearer {
            token: value.get("token")?.as_str()?.to_string(),
        }),
        "header" => {
            let headers = value.get("headers")?.as_object()?;
            let headers = headers
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect();
            Some(AuthMode::Header { headers })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::http_wrapper::HttpWrapper;
    use crate::discovery::Capabilities;
    use crate::discovery::Version;
    use crate::http_store::HttpResourceStore;
    use crate::render::context::RenderMode;
    use crate::render::file_registry::FileRegistry;
    use crate::render::paths::{resolve_paths, PathConfig};
    use crate::render::store_wrapper::StoreWrapper;
    use crate::store::MemoryResourceStore;
    use std::collections::BTreeMap;

    #[test]
    fn post_processor_ensures_trailing_newline() {
        let out = apply_post_processors("no newline", &[PostProcessStep::EnsureTrailingNewline]);
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn post_processor_trims_trailing_whitespace_per_line() {
        let out = apply_post_processors("a  \nb\t\n", &[PostProcessStep::TrimTrailingWhitespace]);
        assert_eq!(out, "a\nb");
    }

    fn render_context(http: Arc<HttpWrapper>) -> Arc<RenderContext> {
        let base = PathConfig {
            maps_dir: "/etc/haproxy/maps".into(),
            ssl_dir: "/etc/haproxy/ssl".into(),
            general_dir: "/etc/haproxy/files".into(),
            config_file: "/etc/haproxy/haproxy.cfg".into(),
        };
        let paths = resolve_paths(&base, &Capabilities::for_version(&Version::new(3, 2, "3.2.0")));
        let pods = std::sync::Arc::new(MemoryResourceStore::new(
            "haproxy-pods",
            vec!["metadata.namespace".into(), "metadata.name".into()],
            vec![],
        ));
        Arc::new(RenderContext {
            mode: RenderMode::Production,
            resources: BTreeMap::new(),
            controller_haproxy_pods: Arc::new(StoreWrapper::new(pods)),
            file_registry: Arc::new(FileRegistry::new(paths.clone())),
            http,
            paths,
        })
    }

    #[test]
    fn fail_function_raises_a_template_fail_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.tera"), "{{ fail(message=\"boom\") }}").unwrap();
        let engine = TeraTemplateEngine::new(dir.path()).unwrap();

        let http = Arc::new(HttpWrapper::new(Arc::new(HttpResourceStore::new()), RenderMode::Production, None));
        let err = engine.render("t.tera", &serde_json::json!({}), render_context(http)).unwrap_err();
        assert!(matches!(err, RenderError::TemplateFail(msg) if msg == "boom"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn critical_http_fetch_failure_propagates_as_a_render_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("t.tera"),
            "{{ http_fetch(url=\"http://127.0.0.1:1/unreachable\", options=opts) }}",
        )
        .unwrap();
        let engine = TeraTemplateEngine::new(dir.path()).unwrap();

        let http = Arc::new(HttpWrapper::new(Arc::new(HttpResourceStore::new()), RenderMode::Production, None));
        let context = serde_json::json!({ "opts": { "critical": true, "retries": 0 } });
        let err = engine.render("t.tera", &context, render_context(http)).unwrap_err();
        assert!(matches!(err, RenderError::TemplateRender { .. }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_critical_http_fetch_failure_renders_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("t.tera"),
            "[{{ http_fetch(url=\"http://127.0.0.1:1/unreachable\", options=opts) }}]",
        )
        .unwrap();
        let engine = TeraTemplateEngine::new(dir.path()).unwrap();

        let http = Arc::new(HttpWrapper::new(Arc::new(HttpResourceStore::new()), RenderMode::Production, None));
        let context = serde_json::json!({ "opts": { "retries": 0 } });
        let out = engine.render("t.tera", &context, render_context(http)).unwrap();
        assert_eq!(out, "[]");
    }
}
