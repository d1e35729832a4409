//! Pomo Sync - A local Pomodoro timer service
//!
//! This is the main entry point for the pomo-sync application.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use pomo_sync::{
    api::create_router,
    config::Config,
    services::{CommandNotifier, LogNotifier, Notifier},
    state::AppState,
    storage::FileStore,
    utils::{shutdown_signal, SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("pomo_sync={},tower_http=info", config.log_level()))
        .init();

    info!("Starting pomo-sync server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, data_file={}",
        config.host,
        config.port,
        config.data_file.display()
    );

    let store = FileStore::open(&config.data_file)
        .with_context(|| format!("Failed to open data file {}", config.data_file.display()))?;

    let notifier: Arc<dyn Notifier> = match &config.notify_command {
        Some(command) => {
            info!("Completion command: {}", command);
            Arc::new(CommandNotifier::new(command.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    // Create application state and restore the persisted timer
    let state = Arc::new(AppState::new(Arc::new(store), Arc::new(SystemClock), notifier));
    state
        .recover()
        .map_err(anyhow::Error::msg)
        .context("Failed to recover timer state")?;

    // Create HTTP router with all endpoints
    let app = create_router(Arc::clone(&state));

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /timer            - Current timer");
    info!("  POST /timer/start      - Start or resume");
    info!("  POST /timer/pause      - Pause");
    info!("  POST /timer/reset      - Reset current mode");
    info!("  POST /timer/mode       - Switch mode");
    info!("  POST /timer/visibility - Report client visibility");
    info!("  POST /timer/tick       - Recompute now");
    info!("  GET  /streaks          - Daily session streaks");
    info!("  GET  /health           - Health check");

    // Setup graceful shutdown
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    if let Err(e) = state.shutdown() {
        tracing::error!("Failed to flush timer state: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}
