//! OKX Bot - Entry Point
//!
//! 1. Loads configuration (config.yaml + OKX_BOT_* env overrides)
//! 2. Opens the runtime state store and bootstraps the state
//! 3. Optionally starts the decision loop
//! 4. Serves the HTTP query API until Ctrl+C

use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

use okx_bot::config::{self, constants};
use okx_bot::core::{decision_loop, init_logging, IdleCycle, StateService, StateStore};
use okx_bot::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenvy::dotenv().ok();

    init_logging();

    info!("okx_bot starting");

    let config = match config::load_config_from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Configuration failed");
            std::process::exit(1);
        }
    };
    info!(
        mode = %config.trading.mode,
        symbol = %config.trading.symbol,
        timeframe = %config.trading.timeframe,
        state_path = %config.runtime.state_path.display(),
        loop_enabled = config.runtime.loop_enabled,
        "Configuration loaded"
    );

    // A storage directory we cannot create is fatal at startup
    let store = StateStore::new(&config.runtime.state_path)?;
    let service = Arc::new(StateService::new(store, config.runtime.recent_orders_limit));

    let defaults = config.bootstrap_defaults();
    let initial = service.get_or_init(&defaults).await?;
    info!(status = %initial.status, updated_at = %initial.updated_at, "Runtime state ready");

    let addr = config.api.bind_addr()?;
    let config = Arc::new(config);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let loop_handle = if config.runtime.loop_enabled {
        let interval = Duration::from_secs(config.runtime.cycle_interval_secs);
        Some(tokio::spawn(decision_loop(
            Arc::clone(&service),
            IdleCycle,
            defaults,
            interval,
            shutdown_tx.subscribe(),
        )))
    } else {
        info!("Decision loop disabled (runtime.loop_enabled = false)");
        None
    };

    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("[SHUTDOWN] Graceful shutdown initiated");
                let _ = shutdown_signal.send(());
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for Ctrl+C signal");
            }
        }
    });

    let app_state = AppState {
        service: Arc::clone(&service),
        config: Arc::clone(&config),
    };
    if let Err(e) = server::start_server(app_state, addr, shutdown_tx.subscribe()).await {
        error!(error = %e, "HTTP server failed");
        let _ = shutdown_tx.send(());
    }

    if let Some(handle) = loop_handle {
        match timeout(constants::shutdown_timeout(), handle).await {
            Ok(Ok(Ok(state))) => info!(status = %state.status, "Decision loop stopped"),
            Ok(Ok(Err(e))) => error!(error = %e, "Decision loop failed"),
            Ok(Err(e)) => error!(error = %e, "Decision loop task panicked"),
            Err(_) => warn!("Decision loop did not stop in time"),
        }
    }

    info!("[SHUTDOWN] Clean exit");
    Ok(())
}
