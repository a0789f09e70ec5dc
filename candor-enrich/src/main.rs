//! candor-enrich - Candidate enrichment service
//!
//! Serves the enrichment funnel over HTTP: POST /enrich runs the standard
//! stages over a candidate list, GET /events streams run progress.

use std::path::PathBuf;

use anyhow::{Context, Result};
use candor_common::config::{load_toml_config, resolve_root_folder, LoggingConfig, CONFIG_FILE_NAME};
use candor_common::events::EventBus;
use candor_enrich::cache::{CachePolicy, CacheStore};
use candor_enrich::config::EnrichConfig;
use candor_enrich::stages::Collaborators;
use candor_enrich::AppState;
use clap::Parser;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ENV_ROOT_FOLDER: &str = "CANDOR_ROOT_FOLDER";

/// Command-line arguments for candor-enrich
#[derive(Parser, Debug)]
#[command(name = "candor-enrich")]
#[command(about = "Candidate enrichment funnel service")]
#[command(version)]
struct Args {
    /// Root folder for cache and config (else $CANDOR_ROOT_FOLDER, TOML, OS default)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Path to the TOML config file (default: <root>/candor-enrich.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding [server].bind
    #[arg(short, long, env = "CANDOR_BIND")]
    bind: Option<String>,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Step 1: Locate and load the bootstrap TOML
    let toml_path = args.config.clone().unwrap_or_else(|| {
        resolve_root_folder(args.root_folder.as_deref(), ENV_ROOT_FOLDER, None).join(CONFIG_FILE_NAME)
    });
    let toml_config = load_toml_config(&toml_path)
        .with_context(|| format!("Failed to load config {}", toml_path.display()))?;

    init_tracing(&toml_config.logging)?;

    info!("Starting candor-enrich");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Config: {}", toml_path.display());

    // Step 2: Resolve root folder and service config
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ENV_ROOT_FOLDER, Some(&toml_config));
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let mut config = EnrichConfig::resolve(&toml_config, &root_folder);
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    // Step 3: Cache and collaborators
    let policy = CachePolicy::from(&config.cache);
    let cache = CacheStore::new(&config.cache_dir, policy).context("Failed to open cache")?;
    let stats = cache.stats().await;
    info!(
        directory = %config.cache_dir.display(),
        %policy,
        entries = stats.total_entries,
        expired = stats.expired_entries,
        "Cache ready"
    );

    let collaborators =
        Collaborators::from_config(&config, &cache).context("Failed to set up collaborators")?;
    info!("Stages: {}", collaborators.stage_names().join(" → "));

    // Step 4: Serve
    let event_bus = EventBus::new(100);
    let state = AppState::new(cache, collaborators, config.funnel.clone(), event_bus);
    let app = candor_enrich::build_router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;
    info!("Listening on http://{}", config.bind);
    info!("Health check: http://{}/health", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
