//! Main application state: the persistent phase state machine

use std::{sync::Arc, time::Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use super::{
    phase_clock,
    transitions::{self, Transition, TriggerAction},
    Phase, PhaseView, Settings, SettingsPatch, TimerState,
};
use crate::{
    services::{
        DeferredTrigger, Notifier, NotifyError, PhaseAlert, Store, StoreError, TimerEvent,
        TriggerFired, PHASE_END, SETTINGS_KEY, STATE_KEY,
    },
    utils::Clock,
};

/// A trigger fire this far ahead of the stored deadline belongs to a
/// superseded deadline and is not treated as phase completion.
pub const EARLY_FIRE_TOLERANCE_MS: i64 = 1_000;

/// Stored state and settings as seen at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: TimerState,
    pub settings: Settings,
    pub now: i64,
}

impl Snapshot {
    pub fn view(&self) -> PhaseView {
        PhaseView::at(&self.state, &self.settings, self.now)
    }
}

/// What reconciliation found when the process (re)started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Timer is not running; nothing to arm.
    Idle,
    /// Deadline still ahead; the phase-end trigger was armed for it.
    Rearmed { end_time: i64 },
    /// Deadline passed while the process was gone; the phase was completed.
    CompletedOverdue(TimerState),
}

/// Owns every read-modify-write of the `state` record.
///
/// Nothing is cached between calls: each command reads both records fresh,
/// computes the transition, writes it back and adjusts the trigger while
/// holding `state_lock`. Notifications go out after the lock is released.
pub struct AppState {
    store: Arc<dyn Store>,
    trigger: Arc<dyn DeferredTrigger>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    state_lock: Mutex<()>,
    /// Process start, for uptime reporting
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        trigger: Arc<dyn DeferredTrigger>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            trigger,
            notifier,
            clock,
            state_lock: Mutex::new(()),
            start_time: Instant::now(),
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Live event feed for display surfaces, if the notifier offers one.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<TimerEvent>> {
        self.notifier.subscribe()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current state and settings; remaining time is derived by the reader.
    pub async fn get_state(&self) -> Result<Snapshot, StoreError> {
        let settings = self.load_settings().await?;
        let state = self.load_state_for(&settings).await?;
        Ok(Snapshot {
            state,
            settings,
            now: self.now(),
        })
    }

    /// Stored settings, defaults when absent or unreadable, clamped to valid values.
    pub async fn load_settings(&self) -> Result<Settings, StoreError> {
        let stored = self.read(SETTINGS_KEY).await?;
        Ok(decode::<Settings>(SETTINGS_KEY, stored)
            .unwrap_or_default()
            .sanitized())
    }

    /// Stored timer state, initial state when absent or unreadable, repaired
    /// against the current settings.
    pub async fn load_state(&self) -> Result<TimerState, StoreError> {
        let settings = self.load_settings().await?;
        self.load_state_for(&settings).await
    }

    async fn load_state_for(&self, settings: &Settings) -> Result<TimerState, StoreError> {
        let stored = self.read(STATE_KEY).await?;
        Ok(decode::<TimerState>(STATE_KEY, stored)
            .map(|state| repair(state, settings))
            .unwrap_or_default())
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn start(&self) -> Result<TimerState, StoreError> {
        let t = self
            .run("start", |state, settings, now| transitions::start(state, settings, now))
            .await?;
        if t.changed {
            info!("Timer started: {} until {:?}", t.state.phase, t.state.end_time);
        }
        Ok(t.state)
    }

    pub async fn pause(&self) -> Result<TimerState, StoreError> {
        let t = self
            .run("pause", |state, _, now| transitions::pause(state, now))
            .await?;
        if t.changed {
            info!("Timer paused: {} with {:?}ms left", t.state.phase, t.state.remaining_ms);
        }
        Ok(t.state)
    }

    pub async fn reset(&self) -> Result<TimerState, StoreError> {
        let t = self.run("reset", |state, _, _| transitions::reset(state)).await?;
        info!("Timer reset (cycle count stays at {})", t.state.cycle_count);
        Ok(t.state)
    }

    /// End the current phase now, whether or not the timer is running.
    pub async fn skip(&self) -> Result<TimerState, StoreError> {
        let t = self
            .run("skip", |state, settings, now| {
                transitions::complete(state, settings, now)
            })
            .await?;
        info!("Phase skipped, now {} (cycle {})", t.state.phase, t.state.cycle_count);
        Ok(t.state)
    }

    /// Handle a fired phase-end trigger.
    ///
    /// Returns the new state when the phase advanced, `None` when the fire
    /// was stale (timer paused or reset meanwhile) or early (a superseded
    /// deadline; the trigger is re-armed for the stored one).
    pub async fn natural_completion(&self) -> Result<Option<TimerState>, StoreError> {
        let t = self
            .run("natural completion", |state, settings, now| {
                match (state.running, state.end_time) {
                    (true, Some(end_time)) if end_time - now > EARLY_FIRE_TOLERANCE_MS => {
                        debug!("Trigger fired {}ms early, re-arming", end_time - now);
                        Transition {
                            state: *state,
                            trigger: TriggerAction::Arm(end_time),
                            alert: None,
                            changed: false,
                        }
                    }
                    (true, Some(_)) => transitions::complete(state, settings, now),
                    _ => {
                        debug!("Ignoring stale phase-end trigger, timer is not running");
                        Transition {
                            state: *state,
                            trigger: TriggerAction::Keep,
                            alert: None,
                            changed: false,
                        }
                    }
                }
            })
            .await?;

        if t.changed {
            info!("Phase completed, now {} (cycle {})", t.state.phase, t.state.cycle_count);
            Ok(Some(t.state))
        } else {
            Ok(None)
        }
    }

    /// Dispatch a fire from the deferred trigger.
    pub async fn on_trigger_fired(
        &self,
        fired: &TriggerFired,
    ) -> Result<Option<TimerState>, StoreError> {
        if fired.name != PHASE_END {
            debug!("Ignoring unknown trigger {}", fired.name);
            return Ok(None);
        }
        self.natural_completion().await
    }

    /// Complete the phase if its deadline passed more than `grace_ms` ago.
    ///
    /// Covers fires lost while the machine was suspended. The grace period
    /// lets the regular trigger win in the common case.
    pub async fn complete_if_overdue(&self, grace_ms: i64) -> Result<Option<TimerState>, StoreError> {
        let overdue = {
            let state = self.load_state().await?;
            match (state.running, state.end_time) {
                (true, Some(end_time)) => self.now() - end_time > grace_ms,
                _ => false,
            }
        };
        if !overdue {
            return Ok(None);
        }
        info!("Phase deadline was missed, completing it now");
        self.natural_completion().await
    }

    /// Apply a settings change from the configuration surface.
    pub async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        let settings = {
            let _guard = self.state_lock.lock().await;
            let settings = patch.apply(self.load_settings().await?);
            self.save(SETTINGS_KEY, &settings).await?;
            settings
        };
        info!(
            "Settings updated: focus={}m short={}m long={}m cycles={}",
            settings.focus_minutes,
            settings.short_break_minutes,
            settings.long_break_minutes,
            settings.cycles_before_long
        );
        self.settings_changed().await;
        Ok(settings)
    }

    /// Tell display surfaces to re-pull; no state is touched.
    pub async fn settings_changed(&self) {
        self.broadcast_state_updated().await;
    }

    // ── Restart recovery ─────────────────────────────────────────────

    /// Bring stored records and the trigger in line after a (re)start.
    ///
    /// Missing records are created with defaults. Remaining time is never
    /// recomputed here; only the trigger is re-armed for a future deadline,
    /// or the phase completed when the deadline already passed.
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, StoreError> {
        let (outcome, transition) = {
            let _guard = self.state_lock.lock().await;

            let stored_settings = self.read(SETTINGS_KEY).await?;
            if decode::<Settings>(SETTINGS_KEY, stored_settings).is_none() {
                info!("No settings stored, writing defaults");
                self.save(SETTINGS_KEY, &Settings::default()).await?;
            }
            let settings = self.load_settings().await?;

            let stored_state = self.read(STATE_KEY).await?;
            let state = match decode::<TimerState>(STATE_KEY, stored_state) {
                Some(stored) => {
                    let repaired = repair(stored, &settings);
                    if repaired != stored {
                        warn!("Stored timer state was inconsistent, repairing it");
                        self.save(STATE_KEY, &repaired).await?;
                    }
                    repaired
                }
                None => {
                    info!("No timer state stored, writing initial idle focus");
                    let initial = TimerState::initial();
                    self.save(STATE_KEY, &initial).await?;
                    initial
                }
            };

            match (state.running, state.end_time) {
                (true, Some(end_time)) if end_time > self.now() => {
                    self.trigger.arm(PHASE_END, end_time);
                    (ReconcileOutcome::Rearmed { end_time }, None)
                }
                (true, Some(_)) => {
                    let t = transitions::complete(&state, &settings, self.now());
                    self.commit(&t).await?;
                    (ReconcileOutcome::CompletedOverdue(t.state), Some(t))
                }
                _ => (ReconcileOutcome::Idle, None),
            }
        };

        match outcome {
            ReconcileOutcome::Idle => info!("Reconciled: timer idle"),
            ReconcileOutcome::Rearmed { end_time } => {
                info!("Reconciled: phase-end trigger re-armed for {}", end_time)
            }
            ReconcileOutcome::CompletedOverdue(state) => {
                info!("Reconciled: overdue phase completed, now {}", state.phase)
            }
        }
        if let Some(t) = transition {
            self.dispatch("reconcile", &t).await;
        }
        Ok(outcome)
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Serialized read-modify-write of the `state` record.
    async fn run<F>(&self, command: &str, decide: F) -> Result<Transition, StoreError>
    where
        F: FnOnce(&TimerState, &Settings, i64) -> Transition,
    {
        let transition = {
            let _guard = self.state_lock.lock().await;
            let settings = self.load_settings().await?;
            let state = self.load_state_for(&settings).await?;
            let transition = decide(&state, &settings, self.now());
            self.commit(&transition).await?;
            transition
        };
        self.dispatch(command, &transition).await;
        Ok(transition)
    }

    /// Persist a transition and adjust the trigger. Caller holds `state_lock`.
    async fn commit(&self, transition: &Transition) -> Result<(), StoreError> {
        if transition.changed {
            self.save(STATE_KEY, &transition.state).await?;
        }
        match transition.trigger {
            TriggerAction::Keep => {}
            TriggerAction::Arm(at_ms) => self.trigger.arm(PHASE_END, at_ms),
            TriggerAction::Cancel => self.trigger.cancel(PHASE_END),
        }
        Ok(())
    }

    async fn dispatch(&self, command: &str, transition: &Transition) {
        if !transition.changed {
            debug!("{} left the timer unchanged", command);
            return;
        }
        self.broadcast_state_updated().await;
        if let Some(phase) = transition.alert {
            self.alert(phase).await;
        }
    }

    async fn broadcast_state_updated(&self) {
        if let Err(e) = self.notifier.state_updated().await {
            debug!("State update not delivered: {}", e);
        }
    }

    async fn alert(&self, phase: Phase) {
        match self.notifier.alert(&PhaseAlert::for_phase(phase)).await {
            Ok(()) | Err(NotifyError::NoListeners) => {}
            Err(e) => warn!("Phase alert not delivered: {}", e),
        }
    }

    /// Raw record read; a corrupt record counts as missing.
    async fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.store.get(key).await {
            Err(StoreError::Corrupt { key, source }) => {
                warn!("Stored {} record is corrupt, using defaults: {}", key, source);
                Ok(None)
            }
            other => other,
        }
    }

    async fn save<T: serde::Serialize>(&self, key: &str, record: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(record).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, value).await
    }

    /// Calculate uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// Make a stored state consistent and keep any paused remainder within the
/// phase it belongs to.
fn repair(state: TimerState, settings: &Settings) -> TimerState {
    let total = phase_clock::total_ms(state.phase, settings);
    state.normalized().with_remaining_at_most(total)
}

/// Decode a stored record, treating unreadable ones like missing ones.
fn decode<T: DeserializeOwned>(key: &str, stored: Option<Value>) -> Option<T> {
    let value = stored?;
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("Stored {} record is unreadable, using defaults: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::{BroadcastNotifier, MemoryStore, RecordingTrigger, TriggerCall},
        utils::ManualClock,
    };
    use serde_json::json;

    const T0: i64 = 1_700_000_000_000;

    struct Harness {
        app: Arc<AppState>,
        store: Arc<MemoryStore>,
        trigger: Arc<RecordingTrigger>,
        clock: Arc<ManualClock>,
        events: broadcast::Receiver<TimerEvent>,
    }

    async fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let trigger = Arc::new(RecordingTrigger::new());
        let clock = Arc::new(ManualClock::new(T0));
        let notifier = Arc::new(BroadcastNotifier::new(false));
        let events = notifier.subscribe().unwrap();
        let app = Arc::new(AppState::new(
            store.clone(),
            trigger.clone(),
            notifier,
            clock.clone(),
        ));
        app.reconcile().await.unwrap();
        Harness {
            app,
            store,
            trigger,
            clock,
            events,
        }
    }

    #[tokio::test]
    async fn first_start_writes_default_records() {
        let h = harness().await;
        assert_eq!(
            h.store.get(SETTINGS_KEY).await.unwrap(),
            Some(serde_json::to_value(Settings::default()).unwrap())
        );
        assert_eq!(h.app.load_state().await.unwrap(), TimerState::initial());
        assert!(h.trigger.calls().is_empty());
    }

    #[tokio::test]
    async fn start_arms_trigger_and_broadcasts() {
        let mut h = harness().await;
        let state = h.app.start().await.unwrap();
        assert_eq!(state.end_time, Some(T0 + 1_500_000));
        assert_eq!(h.trigger.armed_at(PHASE_END), Some(T0 + 1_500_000));
        assert_eq!(h.events.try_recv().unwrap(), TimerEvent::StateUpdated);
    }

    #[tokio::test]
    async fn second_start_is_silent_noop() {
        let mut h = harness().await;
        h.app.start().await.unwrap();
        let _ = h.events.try_recv();
        h.trigger.clear();

        h.clock.advance(10_000);
        let state = h.app.start().await.unwrap();
        assert_eq!(state.end_time, Some(T0 + 1_500_000));
        assert!(h.trigger.calls().is_empty());
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn pause_cancels_trigger_and_freezes_remaining() {
        let h = harness().await;
        h.app.start().await.unwrap();
        h.clock.advance(60_000);
        let state = h.app.pause().await.unwrap();
        assert_eq!(state.remaining_ms, Some(1_440_000));
        assert_eq!(
            h.trigger.calls().last(),
            Some(&TriggerCall::Cancel {
                name: PHASE_END.to_string()
            })
        );
        let snapshot = h.app.get_state().await.unwrap();
        assert_eq!(snapshot.view().remaining_ms, 1_440_000);
    }

    #[tokio::test]
    async fn stale_fire_after_pause_changes_nothing() {
        let h = harness().await;
        h.app.start().await.unwrap();
        h.clock.advance(1_000);
        let paused = h.app.pause().await.unwrap();

        h.clock.set(T0 + 1_500_000);
        assert_eq!(h.app.natural_completion().await.unwrap(), None);
        assert_eq!(h.app.load_state().await.unwrap(), paused);
    }

    #[tokio::test]
    async fn early_fire_rearms_for_stored_deadline() {
        let h = harness().await;
        h.app.start().await.unwrap();
        h.trigger.clear();

        h.clock.advance(5_000);
        assert_eq!(h.app.natural_completion().await.unwrap(), None);
        assert_eq!(h.trigger.armed_at(PHASE_END), Some(T0 + 1_500_000));
        assert_eq!(h.app.load_state().await.unwrap().phase, Phase::Focus);
    }

    #[tokio::test]
    async fn completion_advances_and_alerts() {
        let mut h = harness().await;
        h.app.start().await.unwrap();
        let _ = h.events.try_recv();

        h.clock.set(T0 + 1_500_000);
        let next = h.app.natural_completion().await.unwrap().unwrap();
        assert_eq!(next.phase, Phase::ShortBreak);
        assert_eq!(next.cycle_count, 1);
        assert_eq!(next.end_time, Some(T0 + 1_800_000));
        assert_eq!(h.trigger.armed_at(PHASE_END), Some(T0 + 1_800_000));

        assert_eq!(h.events.try_recv().unwrap(), TimerEvent::StateUpdated);
        assert_eq!(
            h.events.try_recv().unwrap(),
            TimerEvent::PhaseAlert(PhaseAlert::for_phase(Phase::ShortBreak))
        );
    }

    #[tokio::test]
    async fn skip_while_idle_still_advances() {
        let h = harness().await;
        let state = h.app.skip().await.unwrap();
        assert_eq!(state.phase, Phase::ShortBreak);
        assert!(state.running);
        assert_eq!(state.cycle_count, 1);
        assert_eq!(h.trigger.armed_at(PHASE_END), Some(T0 + 300_000));
    }

    #[tokio::test]
    async fn reset_keeps_cycle_count() {
        let h = harness().await;
        h.app.skip().await.unwrap();
        let state = h.app.reset().await.unwrap();
        assert_eq!(state, TimerState {
            cycle_count: 1,
            ..TimerState::initial()
        });
        assert_eq!(h.trigger.armed_at(PHASE_END), None);
    }

    #[tokio::test]
    async fn settings_are_clamped_and_used_by_next_start() {
        let h = harness().await;
        let patch: SettingsPatch = serde_json::from_value(json!({ "focusMinutes": 0 })).unwrap();
        let settings = h.app.update_settings(&patch).await.unwrap();
        assert_eq!(settings.focus_minutes, 1);

        let state = h.app.start().await.unwrap();
        assert_eq!(state.end_time, Some(T0 + 60_000));
    }

    #[tokio::test]
    async fn unreadable_state_record_falls_back_to_initial() {
        let h = harness().await;
        h.store.set(STATE_KEY, json!({"phase": 7})).await.unwrap();
        assert_eq!(h.app.load_state().await.unwrap(), TimerState::initial());
    }

    #[tokio::test]
    async fn overdue_check_respects_grace() {
        let h = harness().await;
        h.app.start().await.unwrap();

        h.clock.set(T0 + 1_500_000 + 1_000);
        assert_eq!(h.app.complete_if_overdue(2_000).await.unwrap(), None);

        h.clock.set(T0 + 1_500_000 + 5_000);
        let next = h.app.complete_if_overdue(2_000).await.unwrap().unwrap();
        assert_eq!(next.phase, Phase::ShortBreak);
    }

    #[tokio::test]
    async fn start_with_oversized_stored_remainder_runs_one_full_phase() {
        let h = harness().await;
        h.store
            .set(
                STATE_KEY,
                json!({
                    "phase": "focus",
                    "running": false,
                    "endTime": null,
                    "remainingMs": i64::MAX - 10,
                    "cycleCount": 0
                }),
            )
            .await
            .unwrap();

        let state = h.app.start().await.unwrap();
        assert_eq!(state.end_time, Some(T0 + 1_500_000));
        assert_eq!(h.trigger.armed_at(PHASE_END), Some(T0 + 1_500_000));
    }

    #[tokio::test]
    async fn corrupt_state_file_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("state.json"), "{ not json").unwrap();
        let store = Arc::new(crate::services::FileStore::open(dir.path()).await.unwrap());
        let app = AppState::new(
            store,
            Arc::new(RecordingTrigger::new()),
            Arc::new(BroadcastNotifier::new(false)),
            Arc::new(ManualClock::new(T0)),
        );

        assert_eq!(app.load_state().await.unwrap(), TimerState::initial());
        assert_eq!(app.reconcile().await.unwrap(), ReconcileOutcome::Idle);
        assert_eq!(app.start().await.unwrap().end_time, Some(T0 + 1_500_000));
    }

    #[tokio::test]
    async fn reconcile_caps_oversized_remainder_on_disk() {
        let h = harness().await;
        let oversized = TimerState::paused(Phase::ShortBreak, 10_000_000, 3);
        h.store
            .set(STATE_KEY, serde_json::to_value(oversized).unwrap())
            .await
            .unwrap();

        h.app.reconcile().await.unwrap();
        let stored: TimerState =
            serde_json::from_value(h.store.get(STATE_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.remaining_ms, Some(300_000));
        assert_eq!(stored.cycle_count, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_skips_are_serialized() {
        const SKIPS: u32 = 40;
        let h = harness().await;

        let tasks: Vec<_> = (0..SKIPS)
            .map(|_| {
                let app = h.app.clone();
                tokio::spawn(async move { app.skip().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let state = h.app.load_state().await.unwrap();
        assert_eq!(state.cycle_count, SKIPS / 2);
        assert_eq!(state.phase, Phase::Focus);
        assert!(state.running);
        assert_eq!(h.trigger.armed_at(PHASE_END), state.end_time);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_commands_and_completion_leave_consistent_state() {
        let h = harness().await;
        h.app.start().await.unwrap();
        h.clock.set(T0 + 1_500_000);

        let mut completions = Vec::new();
        let mut commands = Vec::new();
        for i in 0..30 {
            let app = h.app.clone();
            completions.push(tokio::spawn(async move { app.natural_completion().await }));
            let app = h.app.clone();
            commands.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    app.pause().await
                } else {
                    app.start().await
                }
            }));
        }

        let mut completed = 0;
        for task in completions {
            if task.await.unwrap().unwrap().is_some() {
                completed += 1;
            }
        }
        for task in commands {
            task.await.unwrap().unwrap();
        }

        let state = h.app.load_state().await.unwrap();
        assert!(state.is_consistent());
        assert!(completed <= 1);
        assert_eq!(state.cycle_count, completed);
        if state.running {
            assert_eq!(h.trigger.armed_at(PHASE_END), state.end_time);
        } else {
            assert_eq!(h.trigger.armed_at(PHASE_END), None);
        }
    }
}
