//! OCR Service - Main entry point

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ocr_service::models::{Downloader, ModelRegistry, catalog};
use ocr_service::{EngineState, ServiceConfig, api, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "ocr-service")]
#[command(about = "OCR over HTTP with on-demand model downloads", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the model cache directory
    #[arg(long, global = true)]
    model_home: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json", global = true)]
    log_format: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),
    /// Download model archives ahead of time, e.g. during an image build
    Fetch(FetchArgs),
    /// Show the model catalog and what is installed
    List,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Override recognition language
    #[arg(long)]
    lang: Option<String>,

    /// Override number of engine workers
    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args, Debug)]
struct FetchArgs {
    /// Language pack to fetch (repeatable; defaults to the configured language)
    #[arg(long = "lang")]
    langs: Vec<String>,

    /// Fetch every archive in the catalog
    #[arg(long, conflicts_with = "langs")]
    all: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    // Load configuration
    let mut config = ServiceConfig::load(cli.config)?;

    // CLI overrides
    if let Some(home) = cli.model_home {
        config.model_home = home;
    }

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => serve(config, args).await,
        Command::Fetch(args) => fetch(config, args).await,
        Command::List => list(config).await,
    }
}

fn build_registry(config: &ServiceConfig) -> Result<ModelRegistry> {
    let downloader = Downloader::new(
        Duration::from_secs(config.download_timeout_secs),
        config.download_retries,
    )
    .context("Failed to build download client")?;
    Ok(ModelRegistry::new(config.model_home.clone(), downloader))
}

async fn serve(mut config: ServiceConfig, args: ServeArgs) -> Result<()> {
    tracing::info!("Starting OCR service");

    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(lang) = args.lang {
        config.lang = lang;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    config.validate()?;

    tracing::info!(
        port = config.port,
        lang = %config.lang,
        workers = config.workers,
        model_home = ?config.model_home,
        download_policy = ?config.download_policy,
        "Configuration loaded"
    );

    // Setup metrics
    let prometheus_handle = metrics::setup_metrics()?;
    metrics::set_engine_ready(false);

    let pack = catalog::pack_for(&config.lang, &config.catalog_sources())?;
    let registry = Arc::new(build_registry(&config)?);
    registry.add_pack(&pack, config.use_angle_cls).await;

    let engine = Arc::new(EngineState::new());

    // Setup API
    let app_state = api::AppState {
        engine: engine.clone(),
        models: registry.clone(),
        lang: config.lang.clone(),
        workers: config.workers,
        max_body_bytes: config.max_body_bytes,
        prometheus_handle,
    };

    let app = api::create_router(app_state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind API server")?;

    // Models download and load after the listener is up so /health answers meanwhile
    let provision_handle = tokio::spawn({
        let engine = engine.clone();
        let registry = registry.clone();
        let config = config.clone();
        async move {
            // Failure is recorded in the engine status and surfaced by /health
            let _ = engine.provision(&registry, &pack, &config).await;
        }
    });

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutting down...");
    provision_handle.abort();
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn fetch(config: ServiceConfig, args: FetchArgs) -> Result<()> {
    let sources = config.catalog_sources();
    let registry = build_registry(&config)?;

    std::fs::create_dir_all(&config.model_home)
        .with_context(|| format!("Cannot create model home directory: {:?}", config.model_home))?;

    if args.all {
        let archives = catalog::all_archives(&sources);
        tracing::info!(count = archives.len(), "Fetching full catalog");
        for archive in &archives {
            registry
                .ensure(archive)
                .await
                .with_context(|| format!("Failed to fetch {}", archive.name))?;
        }
    } else {
        let langs = if args.langs.is_empty() {
            vec![config.lang.clone()]
        } else {
            args.langs
        };

        for lang in &langs {
            let pack = catalog::pack_for(lang, &sources)?;
            tracing::info!(lang = %lang, "Fetching language pack");
            registry
                .ensure_pack(&pack, config.use_angle_cls)
                .await
                .with_context(|| format!("Failed to fetch models for '{}'", lang))?;
        }
    }

    for entry in registry.list().await {
        tracing::info!(
            model = %entry.name,
            kind = %entry.kind,
            path = ?entry.path,
            size_bytes = ?entry.size_bytes,
            "Model ready"
        );
    }

    Ok(())
}

async fn list(config: ServiceConfig) -> Result<()> {
    let registry = build_registry(&config)?;
    for archive in catalog::all_archives(&config.catalog_sources()) {
        registry.add_model(&archive).await;
    }

    println!("Model home: {}", config.model_home.display());
    println!("Languages:  {}", catalog::supported_languages().join(", "));
    println!();
    for entry in registry.list().await {
        println!(
            "{:<4} {:<40} {:<10} {}",
            entry.kind.dir_name(),
            entry.name,
            entry.status.to_string(),
            entry.path.display()
        );
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
