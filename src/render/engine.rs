//! The rendering engine: builds production and validation
//! outputs from the same logical resource snapshot and publishes the
//! result, with cached-state replay on leadership acquisition.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::context::{build_static_context, RenderContext, RenderMode, SnippetRef};
use super::file_registry::{FileRegistry, FileType};
use super::http_wrapper::HttpWrapper;
use super::paths::{resolve_paths, PathConfig, ResolvedPaths};
use super::store_wrapper::StoreWrapper;
use super::template_engine::{apply_post_processors, PostProcessStep, TemplateEngine};
use crate::discovery::Capabilities;
use crate::errors::RenderError;
use crate::events::{Event, EventBus, ExtraContext, RenderedTemplate};
use crate::http_store::HttpStoreAdapter;
use crate::store::StoreRegistry;

/// One template declared in configuration that renders to a named output
/// file (a map, general file, or SSL certificate).
#[derive(Debug, Clone, Deserialize)]
pub struct AuxTemplateSpec {
    pub name: String,
    pub output: String,
    #[serde(default)]
    pub post_process: Vec<PostProcessStep>,
}

pub struct RenderingEngine {
    template_engine: Arc<dyn TemplateEngine>,
    registry: StoreRegistry,
    http_store: Arc<crate::http_store::HttpResourceStore>,
    http_adapter: Arc<HttpStoreAdapter>,
    bus: EventBus,
    shutdown: CancellationToken,

    production_paths_config: PathConfig,
    main_template: String,
    main_post_process: Vec<PostProcessStep>,
    maps: Vec<AuxTemplateSpec>,
    general_files: Vec<AuxTemplateSpec>,
    certificates: Vec<AuxTemplateSpec>,
    snippets: Vec<SnippetRef>,
    capabilities: Capabilities,
    dataplane_context: Value,
    extra_context: ExtraContext,

    last_render: Mutex<Option<RenderedTemplate>>,
}

impl RenderingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        template_engine: Arc<dyn TemplateEngine>,
        registry: StoreRegistry,
        http_store: Arc<crate::http_store::HttpResourceStore>,
        http_adapter: Arc<HttpStoreAdapter>,
        bus: EventBus,
        shutdown: CancellationToken,
        production_paths_config: PathConfig,
        main_template: String,
        main_post_process: Vec<PostProcessStep>,
        maps: Vec<AuxTemplateSpec>,
        general_files: Vec<AuxTemplateSpec>,
        certificates: Vec<AuxTemplateSpec>,
        snippets: Vec<SnippetRef>,
        capabilities: Capabilities,
        dataplane_context: Value,
        extra_context: ExtraContext,
    ) -> Self {
        Self {
            template_engine,
            registry,
            http_store,
            http_adapter,
            bus,
            shutdown,
            production_paths_config,
            main_template,
            main_post_process,
            maps,
            general_files,
            certificates,
            snippets,
            capabilities,
            dataplane_context,
            extra_context,
            last_render: Mutex::new(None),
        }
    }

    /// Runs until `shutdown` fires: re-renders on `ReconciliationTriggered`,
    /// replays the last successful render on `BecameLeader`.
    pub async fn run(self, mut events: crate::events::Subscription, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else { return };
                    match event {
                        Event::ReconciliationTriggered => self.execute_and_publish().await,
                        Event::BecameLeader => self.replay().await,
                        _ => {}
                    }
                }
            }
        }
    }

    async fn execute_and_publish(&self) {
        match self.render_cycle().await {
            Ok(rendered) => {
                *self.last_render.lock().expect("render cache lock poisoned") = Some(rendered.clone());
                self.bus.publish(Event::TemplateRendered(rendered)).await;
            }
            Err(e) => {
                error!(error = %e, "render cycle failed");
                let (template_name, formatted_error) = match &e {
                    RenderError::TemplateRender { template, message } => (template.clone(), message.clone()),
                    other => (self.main_template.clone(), other.to_string()),
                };
                self.bus
                    .publish(Event::TemplateRenderFailed {
                        template_name,
                        formatted_error,
                    })
                    .await;
            }
        }
    }

    async fn replay(&self) {
        let cached = self.last_render.lock().expect("render cache lock poisoned").clone();
        if let Some(rendered) = cached {
            info!("renderer: replaying cached render on leadership acquisition");
            self.bus.publish(Event::TemplateRendered(rendered)).await;
        }
    }

    async fn render_cycle(&self) -> Result<RenderedTemplate, RenderError> {
        let start = Instant::now();

        let temp_dir = tempfile::Builder::new()
            .prefix("haproxy-validate-")
            .tempdir()
            .map_err(|e| RenderError::ValidationSetup(e.to_string()))?;

        let maps_dir = temp_dir.path().join("maps");
        let certs_dir = temp_dir.path().join("certs");
        let general_dir = temp_dir.path().join("general");
        for dir in [&maps_dir, &certs_dir, &general_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| RenderError::ValidationSetup(e.to_string()))?;
        }
        let config_file = temp_dir.path().join("haproxy.cfg");
        tokio::fs::write(&config_file, "")
            .await
            .map_err(|e| RenderError::ValidationSetup(e.to_string()))?;

        let production_paths = resolve_paths(&self.production_paths_config, &self.capabilities);
        let validation_base = PathConfig {
            maps_dir,
            ssl_dir: certs_dir,
            general_dir,
            config_file,
        };
        let validation_paths = resolve_paths(&validation_base, &self.capabilities);

        let (production_config, production_aux) = self
            .render_pass(RenderMode::Production, production_paths.clone(), true)
            .await?;
        let (validation_config, _discarded) = self
            .render_pass(RenderMode::Validation, validation_paths.clone(), false)
            .await?;

        let duration_ms = start.elapsed().as_millis() as u64;

        Ok(RenderedTemplate {
            production_config,
            validation_config,
            validation_paths,
            file_count: production_aux.total_count(),
            auxiliary_files: production_aux,
            duration_ms,
        })
    }

    async fn render_pass(
        &self,
        mode: RenderMode,
        paths: ResolvedPaths,
        register_refresh: bool,
    ) -> Result<(String, super::file_registry::AuxiliaryFiles), RenderError> {
        let resources: BTreeMap<String, Arc<StoreWrapper>> = self
            .registry
            .all()
            .into_iter()
            .map(|(name, store)| (name, Arc::new(StoreWrapper::new(store))))
            .collect();

        let controller_haproxy_pods = match self.registry.get("haproxy-pods") {
            Some(store) => Arc::new(StoreWrapper::new(store)),
            None => Arc::new(StoreWrapper::new(Arc::new(crate::store::MemoryResourceStore::new(
                "haproxy-pods",
                vec!["metadata.namespace".into(), "metadata.name".into()],
                vec![],
            )))),
        };

        let file_registry = Arc::new(FileRegistry::new(paths.clone()));

        let refresh_registrar = if register_refresh {
            let http_adapter = self.http_adapter.clone();
            let shutdown = self.shutdown.clone();
            Some(Arc::new(move |url: String| {
                http_adapter.register_url(url, shutdown.clone());
            }) as super::http_wrapper::RefreshRegistrar)
        } else {
            None
        };
        let http = Arc::new(HttpWrapper::new(self.http_store.clone(), mode, refresh_registrar));

        let render_ctx = Arc::new(RenderContext {
            mode,
            resources,
            controller_haproxy_pods,
            file_registry: file_registry.clone(),
            http,
            paths,
        });

        let static_context = build_static_context(
            &render_ctx,
            &self.capabilities,
            &self.dataplane_context,
            &self.snippets,
            &self.extra_context,
        );

        let mut main_output = self
            .template_engine
            .render(&self.main_template, &static_context, render_ctx.clone())?;
        main_output = apply_post_processors(&main_output, &self.main_post_process);

        self.render_aux_specs(&self.maps, FileType::Map, &static_context, &render_ctx, &file_registry)?;
        self.render_aux_specs(
            &self.general_files,
            FileType::File,
            &static_context,
            &render_ctx,
            &file_registry,
        )?;
        self.render_aux_specs(
            &self.certificates,
            FileType::Cert,
            &static_context,
            &render_ctx,
            &file_registry,
        )?;

        Ok((main_output, file_registry.get_files()))
    }

    fn render_aux_specs(
        &self,
        specs: &[AuxTemplateSpec],
        file_type: FileType,
        static_context: &Value,
        render_ctx: &Arc<RenderContext>,
        file_registry: &Arc<FileRegistry>,
    ) -> Result<(), RenderError> {
        for spec in specs {
            let mut content = self
                .template_engine
                .render(&spec.name, static_context, render_ctx.clone())?;
            content = apply_post_processors(&content, &spec.post_process);
            file_registry.register(file_type, &spec.output, &content)?;
        }
        Ok(())
    }
}
