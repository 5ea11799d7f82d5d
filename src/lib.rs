//! Pomo Keeper - A persistent pomodoro timer daemon
//! 
//! This library provides a focus/break phase state machine whose state lives
//! in a durable store, so the timer survives process restarts and system
//! suspension, plus the HTTP surface display clients talk to.

pub mod config;
pub mod state;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use state::AppState;
pub use api::create_router;
pub use utils::signals::shutdown_signal;
