//! API response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{PhaseView, Settings, Snapshot, TimerState};

/// Acknowledgement for commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Stored records plus the view derived from them at request time
#[derive(Debug, Clone, Serialize)]
pub struct StateResponse {
    pub state: TimerState,
    pub settings: Settings,
    pub view: PhaseView,
}

impl From<Snapshot> for StateResponse {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            view: snapshot.view(),
            state: snapshot.state,
            settings: snapshot.settings,
        }
    }
}

/// Response to a settings update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub ok: bool,
    pub settings: Settings,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub uptime: String,
}

impl HealthResponse {
    /// Create a new health response
    pub fn ok(uptime: String) -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime,
        }
    }
}
