//! Best-effort fan-out to display surfaces and user alerts

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use super::system::send_desktop_notification;
use crate::state::Phase;

/// Event pushed to every listening display surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    /// Timer state or settings changed; listeners should re-pull the state.
    StateUpdated,
    PhaseAlert(PhaseAlert),
}

impl TimerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TimerEvent::StateUpdated => "state_updated",
            TimerEvent::PhaseAlert(_) => "phase_alert",
        }
    }
}

/// User-facing alert for the phase that just began.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseAlert {
    pub phase: Phase,
    pub title: &'static str,
    pub body: &'static str,
}

impl PhaseAlert {
    pub fn for_phase(phase: Phase) -> Self {
        let (title, body) = match phase {
            Phase::Focus => ("Time to Focus", "Let's get back to deep work."),
            Phase::ShortBreak => ("Short Break", "Stretch, hydrate, breathe."),
            Phase::LongBreak => ("Long Break", "Enjoy a longer break!"),
        };
        Self { phase, title, body }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("no display surface is listening")]
    NoListeners,
    #[error("desktop alert failed: {0}")]
    Desktop(String),
}

/// Fire-and-forget notification sink. Callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn state_updated(&self) -> Result<(), NotifyError>;
    async fn alert(&self, alert: &PhaseAlert) -> Result<(), NotifyError>;

    /// Live event feed for display surfaces, when this notifier has one.
    fn subscribe(&self) -> Option<broadcast::Receiver<TimerEvent>> {
        None
    }
}

/// Broadcasts events to subscribers, optionally mirroring alerts to the desktop.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    events_tx: broadcast::Sender<TimerEvent>,
    desktop_alerts: bool,
}

impl BroadcastNotifier {
    pub fn new(desktop_alerts: bool) -> Self {
        let (events_tx, _) = broadcast::channel(100);
        Self {
            events_tx,
            desktop_alerts,
        }
    }

    fn send(&self, event: TimerEvent) -> Result<(), NotifyError> {
        self.events_tx
            .send(event)
            .map(|_| ())
            .map_err(|_| NotifyError::NoListeners)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn state_updated(&self) -> Result<(), NotifyError> {
        self.send(TimerEvent::StateUpdated)
    }

    async fn alert(&self, alert: &PhaseAlert) -> Result<(), NotifyError> {
        let desktop = if self.desktop_alerts {
            send_desktop_notification(alert.title, alert.body)
                .await
                .map_err(NotifyError::Desktop)
        } else {
            Ok(())
        };
        let broadcast = self.send(TimerEvent::PhaseAlert(alert.clone()));
        desktop.and(broadcast)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<TimerEvent>> {
        Some(self.events_tx.subscribe())
    }
}
