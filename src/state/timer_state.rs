//! Persisted timer state record

use std::fmt;

use serde::{Deserialize, Serialize};

/// Timer phase. Rotation is fixed: focus, then a short or long break, then focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Focus,
    #[serde(alias = "short")]
    ShortBreak,
    #[serde(alias = "long")]
    LongBreak,
}

impl Phase {
    /// Human readable title shown by display surfaces.
    pub fn title(self) -> &'static str {
        match self {
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Focus => "focus",
            Phase::ShortBreak => "short-break",
            Phase::LongBreak => "long-break",
        })
    }
}

/// Timer state, persisted under the `state` key and owned by the state machine.
///
/// `end_time` is set exactly when `running` is true. `remaining_ms` is only
/// set while paused mid-phase; when it is absent on an idle timer the full
/// phase duration is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    pub phase: Phase,
    pub running: bool,
    /// Absolute deadline in epoch milliseconds.
    pub end_time: Option<i64>,
    pub remaining_ms: Option<i64>,
    /// Focus phases completed since the record was created.
    #[serde(default)]
    pub cycle_count: u32,
}

impl TimerState {
    /// Idle focus at full duration, the state written on first start.
    pub fn initial() -> Self {
        Self {
            phase: Phase::Focus,
            running: false,
            end_time: None,
            remaining_ms: None,
            cycle_count: 0,
        }
    }

    pub fn running(phase: Phase, end_time: i64, cycle_count: u32) -> Self {
        Self {
            phase,
            running: true,
            end_time: Some(end_time),
            remaining_ms: None,
            cycle_count,
        }
    }

    pub fn paused(phase: Phase, remaining_ms: i64, cycle_count: u32) -> Self {
        Self {
            phase,
            running: false,
            end_time: None,
            remaining_ms: Some(remaining_ms.max(0)),
            cycle_count,
        }
    }

    /// Whether the running flag and the time fields agree.
    pub fn is_consistent(&self) -> bool {
        if self.running {
            self.end_time.is_some_and(|end| end > 0) && self.remaining_ms.is_none()
        } else {
            self.end_time.is_none() && self.remaining_ms.map_or(true, |ms| ms >= 0)
        }
    }

    /// Repair a record read from disk so it satisfies [`Self::is_consistent`].
    ///
    /// A running record without a usable deadline cannot be resumed and falls
    /// back to idle at full duration.
    pub fn normalized(self) -> Self {
        if self.is_consistent() {
            return self;
        }
        match (self.running, self.end_time) {
            (true, Some(end_time)) if end_time > 0 => {
                Self::running(self.phase, end_time, self.cycle_count)
            }
            (true, _) => Self {
                running: false,
                end_time: None,
                remaining_ms: None,
                ..self
            },
            (false, _) => Self {
                end_time: None,
                remaining_ms: self.remaining_ms.map(|ms| ms.max(0)),
                ..self
            },
        }
    }

    /// Cap a paused remainder at the full phase duration.
    pub fn with_remaining_at_most(self, total_ms: i64) -> Self {
        Self {
            remaining_ms: self.remaining_ms.map(|ms| ms.clamp(0, total_ms.max(0))),
            ..self
        }
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::initial()
    }
}
