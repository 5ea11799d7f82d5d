//! Deferred one-shot triggers at absolute wall-clock deadlines

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle, time::sleep};
use tracing::{debug, warn};

use crate::utils::Clock;

/// Name of the trigger that ends the current phase.
pub const PHASE_END: &str = "phase_end";

/// Delivered when an armed trigger's deadline is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerFired {
    pub name: String,
    /// Deadline the trigger was armed for, epoch ms.
    pub scheduled_for: i64,
}

/// Schedules named one-shot wake-ups.
///
/// Arming a name replaces whatever was pending under it. Delivery is
/// best-effort: a fire can be late, and one already delivered cannot be
/// taken back by `cancel`.
pub trait DeferredTrigger: Send + Sync {
    fn arm(&self, name: &str, at_ms: i64);
    fn cancel(&self, name: &str);
}

/// In-process trigger backed by tokio timers.
///
/// Pending triggers die with the process; they are re-armed from the stored
/// deadline on the next start.
pub struct TokioTrigger {
    clock: Arc<dyn Clock>,
    fired_tx: mpsc::UnboundedSender<TriggerFired>,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioTrigger {
    /// Create the trigger and the receiving end of its fire events.
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::UnboundedReceiver<TriggerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let trigger = Self {
            clock,
            fired_tx,
            pending: Mutex::new(HashMap::new()),
        };
        (trigger, fired_rx)
    }

    /// Whether a trigger with this name is waiting to fire.
    pub fn is_armed(&self, name: &str) -> bool {
        self.pending()
            .get(name)
            .is_some_and(|handle| !handle.is_finished())
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeferredTrigger for TokioTrigger {
    fn arm(&self, name: &str, at_ms: i64) {
        let delay = Duration::from_millis(at_ms.saturating_sub(self.clock.now_ms()).max(0) as u64);
        let fired_tx = self.fired_tx.clone();
        let fired = TriggerFired {
            name: name.to_string(),
            scheduled_for: at_ms,
        };

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            debug!("Trigger {} fired (scheduled for {})", fired.name, fired.scheduled_for);
            if fired_tx.send(fired).is_err() {
                warn!("Trigger fired but nobody is listening");
            }
        });

        if let Some(previous) = self.pending().insert(name.to_string(), handle) {
            previous.abort();
        }
        debug!("Armed trigger {} for {} (in {:?})", name, at_ms, delay);
    }

    fn cancel(&self, name: &str) {
        if let Some(handle) = self.pending().remove(name) {
            handle.abort();
            debug!("Cancelled trigger {}", name);
        }
    }
}

impl Drop for TokioTrigger {
    fn drop(&mut self) {
        for (_, handle) in self.pending().drain() {
            handle.abort();
        }
    }
}

/// A call made against a [`RecordingTrigger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCall {
    Arm { name: String, at_ms: i64 },
    Cancel { name: String },
}

/// Trigger that only records what it was asked to do. Fires are delivered by
/// the caller, which makes late, lost and duplicate fires easy to reproduce.
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    calls: Mutex<Vec<TriggerCall>>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<TriggerCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Deadline of the most recent arm, if it was not cancelled afterwards.
    pub fn armed_at(&self, name: &str) -> Option<i64> {
        let calls = self.calls();
        for call in calls.iter().rev() {
            match call {
                TriggerCall::Arm { name: n, at_ms } if n == name => return Some(*at_ms),
                TriggerCall::Cancel { name: n } if n == name => return None,
                _ => {}
            }
        }
        None
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&self, call: TriggerCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl DeferredTrigger for RecordingTrigger {
    fn arm(&self, name: &str, at_ms: i64) {
        self.record(TriggerCall::Arm {
            name: name.to_string(),
            at_ms,
        });
    }

    fn cancel(&self, name: &str) {
        self.record(TriggerCall::Cancel {
            name: name.to_string(),
        });
    }
}
