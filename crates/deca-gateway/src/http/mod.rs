//! HTTP surface: health, auth key hand-off, provider introspection, exec,
//! and programmatic chat.

pub mod auth;
pub mod chat;
pub mod exec;
pub mod health;
pub mod providers;

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use deca_core::config::AUTH_HEADER;

use crate::app::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type HandlerError = (StatusCode, Json<ErrorBody>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Shared-secret check. A gateway without a configured key accepts everyone
/// (localhost-only deployments).
pub fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    match &state.config.gateway.key {
        None => true,
        Some(expected) => headers
            .get(AUTH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|got| got == expected)
            .unwrap_or(false),
    }
}

pub fn require_auth(state: &AppState, headers: &HeaderMap) -> Result<(), HandlerError> {
    if check_auth(state, headers) {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::UNAUTHORIZED,
            format!("missing or invalid {AUTH_HEADER} header"),
        ))
    }
}
