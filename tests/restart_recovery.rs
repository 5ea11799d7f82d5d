//! Restart and trigger-delivery scenarios against the file store.

use std::{path::Path, sync::Arc, time::Duration};

use pomo_keeper::{
    services::{
        BroadcastNotifier, DeferredTrigger, FileStore, RecordingTrigger, Store, TokioTrigger,
        PHASE_END, STATE_KEY,
    },
    state::{Phase, ReconcileOutcome, TimerState},
    tasks::phase_completion_task,
    utils::{Clock, ManualClock},
    AppState,
};
use serde_json::json;

const T0: i64 = 1_700_000_000_000;
const FOCUS_MS: i64 = 25 * 60_000;

async fn boot(
    dir: &Path,
    clock: Arc<ManualClock>,
) -> (AppState, Arc<RecordingTrigger>, ReconcileOutcome) {
    let trigger = Arc::new(RecordingTrigger::new());
    let app = AppState::new(
        Arc::new(FileStore::open(dir).await.unwrap()),
        trigger.clone(),
        Arc::new(BroadcastNotifier::new(false)),
        clock,
    );
    let outcome = app.reconcile().await.unwrap();
    (app, trigger, outcome)
}

#[tokio::test]
async fn first_boot_creates_both_records() {
    let dir = tempfile::tempdir().unwrap();
    let (_, trigger, outcome) = boot(dir.path(), Arc::new(ManualClock::new(T0))).await;

    assert_eq!(outcome, ReconcileOutcome::Idle);
    assert!(dir.path().join("settings.json").exists());
    assert!(dir.path().join("state.json").exists());
    assert!(trigger.calls().is_empty());
}

#[tokio::test]
async fn running_timer_is_rearmed_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let (app, _, _) = boot(dir.path(), clock.clone()).await;
    app.start().await.unwrap();
    drop(app);

    clock.advance(10 * 60_000);
    let (app, trigger, outcome) = boot(dir.path(), clock.clone()).await;

    assert_eq!(outcome, ReconcileOutcome::Rearmed { end_time: T0 + FOCUS_MS });
    assert_eq!(trigger.armed_at(PHASE_END), Some(T0 + FOCUS_MS));

    // Remaining time comes from the stored deadline, not a counter.
    let view = app.get_state().await.unwrap().view();
    assert_eq!(view.remaining_ms, 15 * 60_000);
}

#[tokio::test]
async fn deadline_missed_while_stopped_completes_on_boot() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let (app, _, _) = boot(dir.path(), clock.clone()).await;
    app.start().await.unwrap();
    drop(app);

    clock.advance(FOCUS_MS + 42_000);
    let (app, trigger, outcome) = boot(dir.path(), clock.clone()).await;

    let now = clock.now_ms();
    let expected = TimerState::running(Phase::ShortBreak, now + 5 * 60_000, 1);
    assert_eq!(outcome, ReconcileOutcome::CompletedOverdue(expected));
    assert_eq!(app.load_state().await.unwrap(), expected);
    assert_eq!(trigger.armed_at(PHASE_END), Some(now + 5 * 60_000));
}

#[tokio::test]
async fn paused_timer_survives_restart_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let (app, _, _) = boot(dir.path(), clock.clone()).await;
    app.start().await.unwrap();
    clock.advance(60_000);
    let paused = app.pause().await.unwrap();
    drop(app);

    clock.advance(3 * 3_600_000);
    let (app, trigger, outcome) = boot(dir.path(), clock.clone()).await;
    assert_eq!(outcome, ReconcileOutcome::Idle);
    assert!(trigger.calls().is_empty());
    assert_eq!(app.load_state().await.unwrap(), paused);
    assert_eq!(paused.remaining_ms, Some(FOCUS_MS - 60_000));
}

#[tokio::test]
async fn inconsistent_record_is_repaired_on_boot() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    store
        .set(
            STATE_KEY,
            json!({
                "phase": "longBreak",
                "running": true,
                "endTime": null,
                "remainingMs": 1234,
                "cycleCount": 4
            }),
        )
        .await
        .unwrap();

    let (app, _, outcome) = boot(dir.path(), Arc::new(ManualClock::new(T0))).await;
    assert_eq!(outcome, ReconcileOutcome::Idle);
    let state = app.load_state().await.unwrap();
    assert!(state.is_consistent());
    assert_eq!(state.phase, Phase::LongBreak);
    assert_eq!(state.cycle_count, 4);
}

#[tokio::test]
async fn tokio_trigger_delivers_completion_through_background_task() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let (trigger, fired_rx) = TokioTrigger::new(clock.clone());
    let trigger = Arc::new(trigger);
    let app = Arc::new(AppState::new(
        Arc::new(FileStore::open(dir.path()).await.unwrap()),
        trigger.clone(),
        Arc::new(BroadcastNotifier::new(false)),
        clock.clone(),
    ));
    app.reconcile().await.unwrap();
    tokio::spawn(phase_completion_task(Arc::clone(&app), fired_rx));

    // Leave 20ms of focus, then resume so the real trigger fires almost at once.
    app.start().await.unwrap();
    clock.advance(FOCUS_MS - 20);
    app.pause().await.unwrap();
    app.start().await.unwrap();
    assert!(trigger.is_armed(PHASE_END));

    let advanced = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = app.load_state().await.unwrap();
            if state.phase != Phase::Focus {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(advanced.phase, Phase::ShortBreak);
    assert_eq!(advanced.cycle_count, 1);
    assert!(advanced.running);
}

#[tokio::test]
async fn stale_fire_after_reset_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let (app, trigger, _) = boot(dir.path(), clock.clone()).await;

    app.start().await.unwrap();
    clock.advance(FOCUS_MS);
    let reset = app.reset().await.unwrap();

    // The fire for the old deadline arrives after the reset.
    trigger.arm(PHASE_END, T0 + FOCUS_MS);
    assert_eq!(app.natural_completion().await.unwrap(), None);
    assert_eq!(app.load_state().await.unwrap(), reset);
}
