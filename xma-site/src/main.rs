//! xma-site - agency site backend service
//!
//! Serves checkout, lead capture, attribution collection, Web Vitals and
//! CMS content over HTTP. Analytics events are forwarded to PostHog when an
//! API key is configured.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xma_common::config::{is_configured, TomlConfig};
use xma_common::events::EventBus;
use xma_site::{build_router, db, AppState};
use xma_tracking::{spawn_forwarder, AnalyticsSink, NoopSink, PostHogClient};

/// Command-line arguments for xma-site
#[derive(Parser, Debug)]
#[command(name = "xma-site")]
#[command(about = "Agency site backend: checkout, leads, attribution and content")]
#[command(version)]
struct Args {
    /// Config file (overrides XMA_CONFIG and the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides bind_address from the config file)
    #[arg(short, long, env = "XMA_BIND")]
    bind: Option<String>,

    /// SQLite database path (overrides database_path from the config file)
    #[arg(short, long, env = "XMA_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,xma_site=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any slow startup work
    info!(
        "Starting XMA site service (xma-site) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    info!("Database path: {}", config.database_path.display());
    let pool = db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let sink: Arc<dyn AnalyticsSink> = match &config.posthog.api_key {
        Some(key) if is_configured(&config.posthog.api_key) => {
            info!(host = %config.posthog.host, "PostHog analytics enabled");
            Arc::new(PostHogClient::new(key.clone(), &config.posthog.host)?)
        }
        _ => {
            warn!("PostHog API key not configured; analytics events are discarded");
            Arc::new(NoopSink)
        }
    };

    let event_bus = EventBus::new(config.tracking.event_bus_capacity);
    let forwarder = spawn_forwarder(&event_bus, sink.clone());

    let state = AppState::from_config(pool.clone(), &config, event_bus, sink)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    info!("xma-site listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Router (and with it the last EventBus sender) is gone; let the
    // forwarder drain what is left
    match tokio::time::timeout(Duration::from_secs(5), forwarder).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Analytics forwarder ended abnormally: {}", e),
        Err(_) => warn!("Analytics forwarder did not drain in time"),
    }
    pool.close().await;
    info!("xma-site stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
