//! Liveness on the API listener and the runtime log-level switch

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use tracing::info;

use sbx_core::types::LogLevel;

use super::error::ApiResult;
use super::AppState;

pub async fn healthcheck() -> &'static str {
    "OK"
}

pub async fn get_level(State(state): State<AppState>) -> Json<LogLevel> {
    Json(LogLevel {
        level: state.log.current(),
    })
}

pub async fn set_level(
    State(state): State<AppState>,
    payload: Result<Json<LogLevel>, JsonRejection>,
) -> ApiResult<Json<LogLevel>> {
    let Json(request) = payload?;
    let level = state.log.set(&request.level)?;
    info!(level = %level, "log level changed");
    Ok(Json(LogLevel { level }))
}
