//! Restart reconciliation and wake-up recovery

use std::{sync::Arc, time::Duration};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::state::{AppState, ReconcileOutcome};
use crate::services::StoreError;

/// Slack given to the regular trigger before the watchdog steps in.
pub const OVERDUE_GRACE_MS: i64 = 2_000;

/// Reconcile stored state once at startup.
pub async fn recover_on_start(state: &AppState) -> Result<ReconcileOutcome, StoreError> {
    info!("Reconciling stored timer state");
    state.reconcile().await
}

/// Background task that catches phase deadlines missed while the system slept.
///
/// Tokio timers follow a monotonic clock that can stand still during system
/// suspension, so the stored wall-clock deadline is re-checked periodically.
pub async fn wake_up_recovery_task(state: Arc<AppState>, period: Duration) {
    info!("Starting wake-up recovery task (every {:?})", period);
    
    let mut interval = interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    
    loop {
        interval.tick().await;
        
        match state.complete_if_overdue(OVERDUE_GRACE_MS).await {
            Ok(Some(next)) => {
                info!("Wake-up detected, recovered into {}", next.phase);
            }
            Ok(None) => {
                // Nothing overdue, continue monitoring
            }
            Err(e) => {
                warn!("Failed to check for overdue phase: {}", e);
            }
        }
    }
}
