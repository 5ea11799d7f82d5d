//! Pomo Keeper - A persistent pomodoro timer daemon
//! 
//! This is the main entry point for the pomo-keeper application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use pomo_keeper::{
    api::create_router,
    config::Config,
    services::{check_notify_send_available, BroadcastNotifier, FileStore, TokioTrigger},
    state::AppState,
    tasks::{phase_completion_task, recover_on_start, wake_up_recovery_task},
    utils::{shutdown_signal, Clock, SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("pomo_keeper={},tower_http=info", config.log_level()))
        .init();

    let data_dir = config.data_dir();
    info!("Starting pomo-keeper v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, data_dir={}, desktop_alerts={}",
          config.host, config.port, data_dir.display(), config.desktop_alerts);

    let mut desktop_alerts = config.desktop_alerts;
    if desktop_alerts {
        if let Err(e) = check_notify_send_available().await {
            warn!("{}", e);
            desktop_alerts = false;
        }
    }

    // Wire up the external collaborators
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(FileStore::open(&data_dir).await?);
    let (trigger, fired_rx) = TokioTrigger::new(Arc::clone(&clock));
    let notifier = Arc::new(BroadcastNotifier::new(desktop_alerts));

    let state = Arc::new(AppState::new(store, Arc::new(trigger), notifier, clock));

    // Start consuming trigger fires before reconciling, so an overdue re-arm is not lost
    let completion_state = Arc::clone(&state);
    tokio::spawn(async move {
        phase_completion_task(completion_state, fired_rx).await;
    });

    recover_on_start(&state).await?;

    // Start the wake-up recovery background task
    let recovery_state = Arc::clone(&state);
    let period = config.watchdog_period();
    tokio::spawn(async move {
        wake_up_recovery_task(recovery_state, period).await;
    });

    // Create HTTP router with all endpoints
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;
    
    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /state            - Timer state, settings and derived view");
    info!("  POST /start            - Start or resume the current phase");
    info!("  POST /pause            - Pause the running phase");
    info!("  POST /reset            - Back to idle focus");
    info!("  POST /skip             - Complete the current phase now");
    info!("  GET  /settings         - Current settings");
    info!("  PUT  /settings         - Update settings");
    info!("  POST /settings-changed - Ask display surfaces to refresh");
    info!("  GET  /events           - Server-sent state updates and alerts");
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

    info!("Server shutdown complete");
    Ok(())
}
