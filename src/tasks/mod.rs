//! Background tasks module
//! 
//! This module contains background tasks that run alongside the HTTP server.

pub mod phase_completion;
pub mod wake_up_recovery;

// Re-export main functions
pub use phase_completion::phase_completion_task;
pub use wake_up_recovery::{recover_on_start, wake_up_recovery_task, OVERDUE_GRACE_MS};
