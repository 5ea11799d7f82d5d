//! Phase clock: durations and remaining time derived from wall-clock timestamps
//!
//! Nothing here ticks. Remaining time is recomputed from the stored absolute
//! deadline whenever someone asks, so a restarted process reads the same
//! answer as the one that armed the timer.

use serde::Serialize;

use super::{Phase, Settings, TimerState};

pub const MS_PER_MINUTE: i64 = 60_000;

/// Configured minutes for `phase`.
pub fn minutes_for(phase: Phase, settings: &Settings) -> u32 {
    match phase {
        Phase::Focus => settings.focus_minutes,
        Phase::ShortBreak => settings.short_break_minutes,
        Phase::LongBreak => settings.long_break_minutes,
    }
}

/// Full duration of `phase` in milliseconds.
pub fn total_ms(phase: Phase, settings: &Settings) -> i64 {
    i64::from(minutes_for(phase, settings)) * MS_PER_MINUTE
}

/// Milliseconds left in the current phase at `now`.
pub fn remaining(state: &TimerState, total_ms: i64, now: i64) -> i64 {
    match (state.running, state.end_time) {
        (true, Some(end_time)) => (end_time - now).max(0),
        _ => state.remaining_ms.unwrap_or(total_ms),
    }
}

/// `MM:SS`, rounding partial seconds down.
pub fn format_mmss(ms: i64) -> String {
    let secs = ms.max(0) / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Elapsed share of the phase as a whole percentage in `0..=100`.
pub fn progress_percent(remaining_ms: i64, total_ms: i64) -> u8 {
    if total_ms <= 0 {
        return 0;
    }
    let done = 1.0 - remaining_ms as f64 / total_ms as f64;
    (done.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Short badge text: whole minutes while running, a pause glyph when paused
/// mid-phase and a dash when idle at full duration.
pub fn badge_text(state: &TimerState, remaining_ms: i64) -> String {
    if state.running {
        let minutes = remaining_ms.max(0) / MS_PER_MINUTE;
        return minutes.min(99).to_string();
    }
    if state.remaining_ms.is_some() {
        "⏸".to_string()
    } else {
        "—".to_string()
    }
}

fn subtitle(state: &TimerState) -> &'static str {
    match (state.running, state.phase) {
        (false, _) => "Paused",
        (true, Phase::Focus) => "Deep work in progress…",
        (true, _) => "Take a breather 😌",
    }
}

/// Everything a display surface needs to render the timer at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseView {
    pub remaining_ms: i64,
    pub total_ms: i64,
    pub progress_pct: u8,
    pub display: String,
    pub badge: String,
    pub title: &'static str,
    pub subtitle: &'static str,
}

impl PhaseView {
    pub fn at(state: &TimerState, settings: &Settings, now: i64) -> Self {
        let total = total_ms(state.phase, settings);
        let remaining_ms = remaining(state, total, now);
        Self {
            remaining_ms,
            total_ms: total,
            progress_pct: progress_percent(remaining_ms, total),
            display: format_mmss(remaining_ms),
            badge: badge_text(state, remaining_ms),
            title: state.phase.title(),
            subtitle: subtitle(state),
        }
    }
}
