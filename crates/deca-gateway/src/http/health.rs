//! GET /health

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

use super::{error_response, HandlerError};

#[derive(Serialize)]
pub struct HealthReply {
    pub ok: bool,
    pub version: &'static str,
    pub uptime_secs: u64,
}

pub async fn health_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<HealthReply>, HandlerError> {
    if state.config.gateway.health_requires_auth && !super::check_auth(&state, &headers) {
        return Err(error_response(StatusCode::UNAUTHORIZED, "unauthorized"));
    }
    Ok(Json(HealthReply {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
    }))
}
