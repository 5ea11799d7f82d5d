//! Timer settings record and its configuration boundary

use serde::{Deserialize, Serialize};

pub const DEFAULT_FOCUS_MINUTES: u32 = 25;
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;
pub const DEFAULT_CYCLES_BEFORE_LONG: u32 = 4;

/// Durations and long-break cadence, persisted under the `settings` key.
///
/// Every field is at least 1 once it has passed through [`Settings::sanitized`]
/// or [`SettingsPatch::apply`]. The state machine relies on that and does not
/// re-validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(alias = "focusM")]
    pub focus_minutes: u32,
    #[serde(alias = "shortBreakM")]
    pub short_break_minutes: u32,
    #[serde(alias = "longBreakM")]
    pub long_break_minutes: u32,
    pub cycles_before_long: u32,
}

impl Settings {
    /// Clamp every field to the minimum of 1.
    pub fn sanitized(self) -> Self {
        Self {
            focus_minutes: self.focus_minutes.max(1),
            short_break_minutes: self.short_break_minutes.max(1),
            long_break_minutes: self.long_break_minutes.max(1),
            cycles_before_long: self.cycles_before_long.max(1),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            short_break_minutes: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
            cycles_before_long: DEFAULT_CYCLES_BEFORE_LONG,
        }
    }
}

/// Partial settings update as sent by a display surface.
///
/// Values are signed so that out-of-range input (0, negatives) is clamped
/// rather than rejected.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(alias = "focusM")]
    pub focus_minutes: Option<i64>,
    #[serde(alias = "shortBreakM")]
    pub short_break_minutes: Option<i64>,
    #[serde(alias = "longBreakM")]
    pub long_break_minutes: Option<i64>,
    pub cycles_before_long: Option<i64>,
}

impl SettingsPatch {
    /// Merge the patch over `current`, clamping each provided value to `1..=u32::MAX`.
    pub fn apply(&self, current: Settings) -> Settings {
        let pick = |value: Option<i64>, fallback: u32| match value {
            Some(v) => clamp_minutes(v),
            None => fallback,
        };

        Settings {
            focus_minutes: pick(self.focus_minutes, current.focus_minutes),
            short_break_minutes: pick(self.short_break_minutes, current.short_break_minutes),
            long_break_minutes: pick(self.long_break_minutes, current.long_break_minutes),
            cycles_before_long: pick(self.cycles_before_long, current.cycles_before_long),
        }
        .sanitized()
    }
}

fn clamp_minutes(value: i64) -> u32 {
    value.clamp(1, i64::from(u32::MAX)) as u32
}
