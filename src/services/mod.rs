//! External collaborators module
//! 
//! Durable storage, deferred triggers, display-surface notifications and
//! desktop alert delivery.

pub mod notifier;
pub mod store;
pub mod system;
pub mod trigger;

// Re-export main items
pub use notifier::{BroadcastNotifier, Notifier, NotifyError, PhaseAlert, TimerEvent};
pub use store::{FileStore, MemoryStore, Store, StoreError, SETTINGS_KEY, STATE_KEY};
pub use system::*;
pub use trigger::{
    DeferredTrigger, RecordingTrigger, TokioTrigger, TriggerCall, TriggerFired, PHASE_END,
};
