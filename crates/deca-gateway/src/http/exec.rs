//! POST /exec — capability-routed command execution.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};

use deca_heartbeat::TriggerReason;
use deca_providers::{ExecRequest, ExecResult};

use crate::app::AppState;

use super::{error_response, require_auth, HandlerError};

pub async fn exec_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ExecRequest>,
) -> Result<Json<ExecResult>, HandlerError> {
    require_auth(&state, &headers)?;
    if req.command.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "command must not be empty",
        ));
    }
    let result = state.providers.exec(&req).await;
    // Command runs often change workspace state the task file cares about.
    state.heartbeat.request_now(TriggerReason::Exec, "exec");
    Ok(Json(result))
}
