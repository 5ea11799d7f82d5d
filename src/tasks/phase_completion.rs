//! Phase completion background task

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::{services::TriggerFired, state::AppState};

/// Background task that turns deferred trigger fires into phase completions
pub async fn phase_completion_task(
    state: Arc<AppState>,
    mut fired_rx: mpsc::UnboundedReceiver<TriggerFired>,
) {
    info!("Starting phase completion task");

    while let Some(fired) = fired_rx.recv().await {
        debug!("Trigger {} fired for {}", fired.name, fired.scheduled_for);

        match state.on_trigger_fired(&fired).await {
            Ok(Some(next)) => {
                debug!("Advanced to {} ending at {:?}", next.phase, next.end_time);
            }
            Ok(None) => {
                debug!("Trigger fire did not change the timer");
            }
            Err(e) => {
                error!("Failed to complete phase: {}", e);
            }
        }
    }

    info!("Trigger channel closed, phase completion task stopping");
}
