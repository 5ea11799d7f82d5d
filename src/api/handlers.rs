//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info};

use crate::{
    services::TimerEvent,
    state::{AppState, Settings, SettingsPatch},
};
use super::responses::{HealthResponse, OkResponse, SettingsResponse, StateResponse};

/// Handle GET /state - Return stored state, settings and the derived view
pub async fn get_state_handler(State(state): State<Arc<AppState>>) -> Result<Json<StateResponse>, StatusCode> {
    match state.get_state().await {
        Ok(snapshot) => Ok(Json(snapshot.into())),
        Err(e) => {
            error!("Failed to read timer state: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /start - Start or resume the current phase
pub async fn start_handler(State(state): State<Arc<AppState>>) -> Result<Json<OkResponse>, StatusCode> {
    match state.start().await {
        Ok(_) => Ok(Json(OkResponse::ok())),
        Err(e) => {
            error!("Failed to start timer: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /pause - Pause the running phase
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> Result<Json<OkResponse>, StatusCode> {
    match state.pause().await {
        Ok(_) => Ok(Json(OkResponse::ok())),
        Err(e) => {
            error!("Failed to pause timer: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /reset - Back to idle focus
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> Result<Json<OkResponse>, StatusCode> {
    match state.reset().await {
        Ok(_) => Ok(Json(OkResponse::ok())),
        Err(e) => {
            error!("Failed to reset timer: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /skip - Complete the current phase now
pub async fn skip_handler(State(state): State<Arc<AppState>>) -> Result<Json<OkResponse>, StatusCode> {
    match state.skip().await {
        Ok(_) => Ok(Json(OkResponse::ok())),
        Err(e) => {
            error!("Failed to skip phase: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle GET /settings - Return current settings
pub async fn get_settings_handler(State(state): State<Arc<AppState>>) -> Result<Json<Settings>, StatusCode> {
    state.load_settings().await.map(Json).map_err(|e| {
        error!("Failed to read settings: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Handle PUT /settings - Update settings, clamping values below 1
pub async fn put_settings_handler(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<SettingsResponse>, StatusCode> {
    match state.update_settings(&patch).await {
        Ok(settings) => Ok(Json(SettingsResponse { ok: true, settings })),
        Err(e) => {
            error!("Failed to update settings: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /settings-changed - Ask display surfaces to re-pull state
pub async fn settings_changed_handler(State(state): State<Arc<AppState>>) -> Json<OkResponse> {
    info!("Settings changed externally, notifying display surfaces");
    state.settings_changed().await;
    Json(OkResponse::ok())
}

/// Handle GET /events - Server-sent event stream for display surfaces
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, StatusCode> {
    let rx = state.subscribe().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    debug!("Display surface subscribed to events");

    let events = stream::unfold(rx, |mut rx| async move {
        let event = next_event(&mut rx).await?;
        let sse = Event::default().event(event.name()).json_data(&event);
        Some((sse, rx))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Next event for a subscriber, `None` once the channel is closed.
async fn next_event(rx: &mut broadcast::Receiver<TimerEvent>) -> Option<TimerEvent> {
    match rx.recv().await {
        Ok(event) => Some(event),
        // Missed events collapse into one refresh request
        Err(RecvError::Lagged(skipped)) => {
            debug!("Event subscriber lagged by {} events", skipped);
            Some(TimerEvent::StateUpdated)
        }
        Err(RecvError::Closed) => None,
    }
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.get_uptime()))
}
