//! GET /auth/key — shared-secret hand-off for origin-allowlisted consoles.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use deca_core::config::AUTH_HEADER;

use crate::app::AppState;

use super::{error_response, HandlerError};

#[derive(Debug, Serialize)]
pub struct AuthKeyReply {
    pub key: String,
    pub header: &'static str,
}

pub async fn auth_key_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AuthKeyReply>, HandlerError> {
    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let allowed = state
        .config
        .gateway
        .origin_allowlist
        .iter()
        .any(|o| o == origin);
    if !allowed {
        warn!(origin, "auth key requested from disallowed origin");
        return Err(error_response(StatusCode::FORBIDDEN, "origin not allowed"));
    }

    let Some(key) = state.config.gateway.key.clone() else {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "no gateway key configured",
        ));
    };
    Ok(Json(AuthKeyReply {
        key,
        header: AUTH_HEADER,
    }))
}
