use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bumper_core::{
    load_config, validate_config, HttpPromotionApi, LogNotifier, Notifier, PromotionApi,
    PromotionEngine, SqliteTenantStore, SqliteTokenLedger, TenantStore, TokenLedger,
    WebhookNotifier,
};

use bumper_server::api::create_router;
use bumper_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
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
    let config_path = std::env::var("BUMPER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully (version {})", VERSION);
    info!("Database path: {:?}", config.database.path);
    info!("Upstream base URL: {}", config.upstream.base_url);

    // Log a config fingerprint without leaking secrets
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!("Config hash: {}", &config_hash[..16]);

    // Create SQLite stores
    let store: Arc<dyn TenantStore> = Arc::new(
        SqliteTenantStore::new(&config.database.path)
            .context("Failed to create tenant store")?,
    );
    info!("Tenant store initialized");

    let ledger: Arc<dyn TokenLedger> = Arc::new(
        SqliteTokenLedger::new(&config.database.path)
            .context("Failed to create token ledger")?,
    );
    info!("Token ledger initialized");

    // Create upstream API client
    let api: Arc<dyn PromotionApi> = Arc::new(
        HttpPromotionApi::new(config.upstream.clone())
            .context("Failed to create upstream client")?,
    );
    info!("Upstream client initialized");

    // Create notifier, falling back to logs when no webhook is configured
    let notifier: Arc<dyn Notifier> = match &config.notifier {
        Some(notifier_config) => {
            info!("Using webhook notifier");
            Arc::new(
                WebhookNotifier::new(notifier_config)
                    .context("Failed to create webhook notifier")?,
            )
        }
        None => {
            info!("No notifier configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    // Create the promotion engine
    let engine = Arc::new(PromotionEngine::new(
        config.engine.clone(),
        Arc::clone(&store),
        Arc::clone(&ledger),
        api,
        notifier,
    ));

    // Timer jobs do not survive a restart; clear their records
    let stale = engine
        .recover_stale_jobs()
        .context("Failed to recover stale jobs")?;
    if stale > 0 {
        warn!("Cleared {} stale job records from a previous run", stale);
    }

    // Re-arm auto start for active tenants when configured
    if config.engine.auto_start.is_some() {
        for tenant in store.list_tenants().context("Failed to list tenants")? {
            if !tenant.active {
                continue;
            }
            if let Err(e) = engine.enable_auto_start(&tenant.id) {
                warn!("Failed to enable auto start for tenant {}: {}", tenant.id, e);
            }
        }
    }

    // Create app state and router
    let state = Arc::new(AppState::new(
        config.clone(),
        store,
        ledger,
        Arc::clone(&engine),
    ));
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

    // Tear down timer jobs before exiting
    info!("Server shutting down...");
    engine.shutdown();
    info!("Engine stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
