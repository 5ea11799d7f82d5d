//! Pure transition functions for the phase state machine
//!
//! Each function takes the freshly read state and returns the state to write
//! back together with what must happen to the deferred trigger. Persisting,
//! arming and notifying are left to [`super::AppState`].

use super::{phase_clock, Phase, Settings, TimerState};

/// What to do with the pending `phase_end` trigger after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Leave whatever is armed alone.
    Keep,
    /// Arm (or re-arm) for this absolute deadline in epoch ms.
    Arm(i64),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub state: TimerState,
    pub trigger: TriggerAction,
    /// Phase the user should be alerted about, set on phase completion.
    pub alert: Option<Phase>,
    /// False for no-ops; nothing is written or broadcast for those.
    pub changed: bool,
}

impl Transition {
    fn unchanged(state: TimerState) -> Self {
        Self {
            state,
            trigger: TriggerAction::Keep,
            alert: None,
            changed: false,
        }
    }
}

/// Phase that follows `phase`, and the cycle count after leaving it.
///
/// Leaving focus counts a cycle; a long break follows when the incremented
/// count is a multiple of `cycles_before_long`. Breaks always lead to focus.
pub fn next_phase(phase: Phase, cycle_count: u32, settings: &Settings) -> (Phase, u32) {
    match phase {
        Phase::Focus => {
            let cycles = cycle_count.saturating_add(1);
            if cycles % settings.cycles_before_long.max(1) == 0 {
                (Phase::LongBreak, cycles)
            } else {
                (Phase::ShortBreak, cycles)
            }
        }
        Phase::ShortBreak | Phase::LongBreak => (Phase::Focus, cycle_count),
    }
}

/// Start or resume. A running timer is left untouched.
pub fn start(state: &TimerState, settings: &Settings, now: i64) -> Transition {
    if state.running {
        return Transition::unchanged(*state);
    }
    let baseline = state
        .remaining_ms
        .unwrap_or_else(|| phase_clock::total_ms(state.phase, settings));
    let end_time = now.saturating_add(baseline);

    Transition {
        state: TimerState::running(state.phase, end_time, state.cycle_count),
        trigger: TriggerAction::Arm(end_time),
        alert: None,
        changed: true,
    }
}

/// Freeze the remaining time. A timer that is not running is left untouched.
pub fn pause(state: &TimerState, now: i64) -> Transition {
    let end_time = match (state.running, state.end_time) {
        (true, Some(end_time)) => end_time,
        _ => return Transition::unchanged(*state),
    };

    Transition {
        state: TimerState::paused(state.phase, end_time.saturating_sub(now), state.cycle_count),
        trigger: TriggerAction::Cancel,
        alert: None,
        changed: true,
    }
}

/// Back to idle focus at full duration. The cycle count is kept.
pub fn reset(state: &TimerState) -> Transition {
    Transition {
        state: TimerState {
            phase: Phase::Focus,
            running: false,
            end_time: None,
            remaining_ms: None,
            cycle_count: state.cycle_count,
        },
        trigger: TriggerAction::Cancel,
        alert: None,
        changed: true,
    }
}

/// Finish the current phase and immediately run the next one.
///
/// Callers decide whether completion applies: trigger fires require a
/// running timer, skip does not.
pub fn complete(state: &TimerState, settings: &Settings, now: i64) -> Transition {
    let (phase, cycle_count) = next_phase(state.phase, state.cycle_count, settings);
    let end_time = now.saturating_add(phase_clock::total_ms(phase, settings));

    Transition {
        state: TimerState::running(phase, end_time, cycle_count),
        trigger: TriggerAction::Arm(end_time),
        alert: Some(phase),
        changed: true,
    }
}
