use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use haproxy_template_ingress::clock::SystemClock;
use haproxy_template_ingress::config::ControllerConfig;
use haproxy_template_ingress::credentials::CredentialsSource;
use haproxy_template_ingress::discovery::{
    Capabilities, DiscoveryAdapter, FixedLocalVersionSource, LocalVersionSource,
    ProbedLocalVersionSource, ReqwestVersionProber, Version,
};
use haproxy_template_ingress::events::EventBus;
use haproxy_template_ingress::http_store::{HttpResourceStore, HttpStoreAdapter};
use haproxy_template_ingress::reconcile::ReconciliationCoordinator;
use haproxy_template_ingress::render::{RenderingEngine, TeraTemplateEngine};
use haproxy_template_ingress::store::{MemoryResourceStore, StoreRegistry};

#[derive(Parser)]
#[command(name = "haproxy-ingress-controller")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Renders HAProxy configuration from cluster resources and publishes it via the Dataplane API")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Dataplane API port (overrides the config file)
    #[arg(long)]
    dataplane_port: Option<u16>,

    /// Path to a secret file holding Dataplane credentials
    #[arg(long)]
    credentials_file: Option<PathBuf>,

    /// A fixed local HAProxy version to assume instead of probing it. Mainly
    /// for deployments that pin their HAProxy image version explicitly.
    #[arg(long)]
    local_version: Option<String>,

    /// Log level filter
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON instead of the default human-readable format
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(cli: &Cli) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("haproxy_template_ingress={}", cli.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = ControllerConfig::load(Some(&cli.config))?;
    if let Some(port) = cli.dataplane_port {
        config.dataplane.port = port;
    }

    let credentials_source = CredentialsSource::new(cli.credentials_file.clone());
    let credentials = credentials_source.load()?;

    let local_version: Version = match &cli.local_version {
        Some(v) => FixedLocalVersionSource(v.parse().map_err(anyhow::Error::msg)?).detect().await?,
        None => {
            let local_url = format!("http://127.0.0.1:{}/v3", config.dataplane.port);
            let source = ProbedLocalVersionSource::new(
                Box::new(ReqwestVersionProber::new()),
                local_url,
                credentials.username.clone(),
                credentials.password.clone(),
            );
            source.detect().await?
        }
    };
    let capabilities = Capabilities::for_version(&local_version);
    info!(version = %local_version.full, ?capabilities, "detected local HAProxy version");

    let bus = EventBus::new();
    let shutdown = CancellationToken::new();

    let registry = StoreRegistry::new();
    registry.register(
        "haproxy-pods",
        Arc::new(MemoryResourceStore::new(
            "haproxy-pods",
            vec!["metadata.namespace".into(), "metadata.name".into()],
            vec![],
        )),
    );

    let http_store = Arc::new(HttpResourceStore::new());
    let http_adapter_shared = Arc::new(HttpStoreAdapter::new(bus.clone(), http_store.clone()));
    let http_adapter_owned = HttpStoreAdapter::new(bus.clone(), http_store.clone());

    let template_engine = Arc::new(TeraTemplateEngine::new(&config.templates.directory)?);

    let dataplane_context = serde_json::json!({
        "port": config.dataplane.port,
        "timeout_secs": config.dataplane.timeout.as_secs(),
    });

    let renderer = RenderingEngine::new(
        template_engine,
        registry.clone(),
        http_store.clone(),
        http_adapter_shared,
        bus.clone(),
        shutdown.clone(),
        config.paths.clone().into(),
        config.templates.main_template.clone(),
        Vec::new(),
        config.templates.maps.clone(),
        config.templates.general_files.clone(),
        config.templates.certificates.clone(),
        config.resolved_snippets(),
        capabilities,
        dataplane_context,
        config.extra_context(),
    );

    let discovery = DiscoveryAdapter::new(
        bus.clone(),
        registry.clone(),
        Arc::new(ReqwestVersionProber::new()),
        local_version,
        Arc::new(SystemClock),
    );

    let coordinator = ReconciliationCoordinator::new(bus.clone());

    let renderer_events = bus.subscribe("renderer", config.event_bus.buffer_capacity).await;
    let discovery_events = bus.subscribe("discovery", config.event_bus.buffer_capacity).await;
    let http_events = bus.subscribe("http-store", config.event_bus.buffer_capacity).await;
    let coordinator_events = bus.subscribe("reconciliation-coordinator", config.event_bus.buffer_capacity).await;

    let renderer_shutdown = shutdown.clone();
    let discovery_shutdown = shutdown.clone();
    let http_shutdown = shutdown.clone();
    let coordinator_shutdown = shutdown.clone();

    let renderer_task = tokio::spawn(renderer.run(renderer_events, renderer_shutdown));
    let discovery_task = tokio::spawn(discovery.run(discovery_events, discovery_shutdown));
    let http_task = tokio::spawn(http_adapter_owned.run(http_events, http_shutdown));
    let coordinator_task = tokio::spawn(coordinator.run(coordinator_events, coordinator_shutdown));

    credentials_source.publish(&bus, &credentials).await;
    bus.publish(haproxy_template_ingress::events::Event::ConfigValidated {
        dataplane_port: config.dataplane.port,
    })
    .await;
    bus.publish(haproxy_template_ingress::events::Event::BecameLeader).await;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping");
    shutdown.cancel();

    let _ = tokio::join!(renderer_task, discovery_task, http_task, coordinator_task);
    Ok(())
}
