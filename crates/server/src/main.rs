use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appcache_core::{
    load_config, validate_config, HttpTransport, PersistentCache, SanitizedConfig, SqliteCache,
    Transport, UpdateOrchestrator,
};
use appcache_server::{api::create_router, events::event_listener, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("APPCACHE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let sanitized = SanitizedConfig::from(&config);
    let config_json = serde_json::to_string(&sanitized).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );
    info!("Manifest URL: {}", sanitized.manifest.url);
    info!("Cache database: {:?}", config.cache.path);

    // Create SQLite persistent cache
    let cache: Arc<dyn PersistentCache> = Arc::new(
        SqliteCache::new(&config.cache.path)
            .context("Failed to create persistent cache")?
            .with_retained_generations(config.cache.retained_generations),
    );
    info!("Persistent cache initialized");

    // Create HTTP transport
    let transport: Arc<dyn Transport> = Arc::new(
        HttpTransport::new(&config.transport).context("Failed to create HTTP transport")?,
    );
    info!(
        "Using transport: {} (max {} concurrent fetches)",
        transport.name(),
        config.transport.max_concurrent_fetches
    );

    // Create orchestrator and start the first cycle
    let orchestrator = Arc::new(UpdateOrchestrator::new(
        config.orchestrator.clone(),
        transport,
        cache,
    ));
    orchestrator.set_event_listener(event_listener(
        &orchestrator,
        config.orchestrator.auto_swap,
    ));
    orchestrator
        .init(config.manifest.url.as_str())
        .context("Failed to start the first update cycle")?;
    info!(session = %orchestrator.session(), "Update orchestrator started");

    // Periodic updates
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let updater = match config.orchestrator.update_interval_secs {
        0 => {
            info!("Periodic updates disabled, updating on demand only");
            None
        }
        secs => Some(spawn_update_loop(
            Arc::clone(&orchestrator),
            Duration::from_secs(secs),
            shutdown_tx.subscribe(),
        )),
    };

    // Create app state and router
    let state = Arc::new(AppState::new(config.clone(), Arc::clone(&orchestrator)));
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let _ = shutdown_tx.send(());
    if let Some(updater) = updater {
        let _ = updater.await;
    }

    orchestrator.abort();
    info!("Update orchestrator stopped");

    Ok(())
}

/// Call `update(false)` every `period` until shutdown.
fn spawn_update_loop(
    orchestrator: Arc<UpdateOrchestrator>,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately and init already ran a cycle.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match orchestrator.update(false) {
                        Ok(true) => debug!("Periodic update started"),
                        Ok(false) => debug!("Previous cycle still running, skipping periodic update"),
                        Err(e) => warn!(error = %e, "Periodic update failed"),
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Update loop shutting down");
                    break;
                }
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
