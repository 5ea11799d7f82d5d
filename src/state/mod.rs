//! State management module
//! 
//! The persisted records, the phase clock, the pure transition table and the
//! `AppState` that applies transitions against the durable store.

pub mod app_state;
pub mod phase_clock;
pub mod settings;
pub mod timer_state;
pub mod transitions;

// Re-export main types
pub use app_state::{AppState, ReconcileOutcome, Snapshot};
pub use phase_clock::PhaseView;
pub use settings::{Settings, SettingsPatch};
pub use timer_state::{Phase, TimerState};
