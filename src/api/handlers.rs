//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use tracing::{error, info};

use super::responses::{
    HealthResponse, ModeRequest, StreaksResponse, TimerView, VisibilityRequest,
};
use crate::state::{AppState, TimerState};

type TimerResult = Result<Json<TimerView>, StatusCode>;

/// Wrap a state operation result into a timer view
fn timer_view(state: &AppState, action: &str, result: Result<TimerState, String>) -> TimerResult {
    match result {
        Ok(timer) => Ok(Json(TimerView::new(timer, state.is_visible()))),
        Err(e) => {
            error!("Failed to {} timer: {}", action, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle GET /timer - Return the current timer
pub async fn timer_handler(State(state): State<Arc<AppState>>) -> TimerResult {
    timer_view(&state, "read", state.get_timer_state())
}

/// Handle POST /timer/start - Start or resume the countdown
pub async fn start_handler(State(state): State<Arc<AppState>>) -> TimerResult {
    info!("Start endpoint called");
    timer_view(&state, "start", state.start_timer())
}

/// Handle POST /timer/pause - Pause the countdown
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> TimerResult {
    info!("Pause endpoint called");
    timer_view(&state, "pause", state.pause_timer())
}

/// Handle POST /timer/reset - Reload the current mode's duration
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> TimerResult {
    info!("Reset endpoint called");
    timer_view(&state, "reset", state.reset_timer())
}

/// Handle POST /timer/mode - Switch mode
pub async fn mode_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ModeRequest>,
) -> TimerResult {
    info!("Mode endpoint called with {}", request.mode);
    timer_view(&state, "switch mode of", state.set_mode(request.mode))
}

/// Handle POST /timer/visibility - Client shown or hidden
pub async fn visibility_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VisibilityRequest>,
) -> TimerResult {
    timer_view(&state, "update visibility of", state.set_visibility(request.visible))
}

/// Handle POST /timer/tick - Recompute right now
pub async fn tick_handler(State(state): State<Arc<AppState>>) -> TimerResult {
    let result = state.force_tick().and_then(|_| state.get_timer_state());
    timer_view(&state, "tick", result)
}

/// Handle GET /streaks - Guest streak ledger
pub async fn streaks_handler(State(state): State<Arc<AppState>>) -> Json<StreaksResponse> {
    let ledger = state.streaks();
    let current_streak = ledger.current_streak(state.today());
    Json(StreaksResponse {
        streaks: ledger.streaks,
        current_streak,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::ok(state.get_uptime()))
}
