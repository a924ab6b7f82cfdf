//! POST /chat — programmatic agent access.
//!
//! Routes through the same per-session lanes as platform messages, keyed by
//! the caller's sender id, so HTTP traffic serializes with everything else
//! targeting that session.

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use deca_core::key::{build_session_key, SessionScope};

use crate::app::AppState;
use crate::dispatch::run_in_lane;

use super::{error_response, require_auth, HandlerError};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    pub message: String,
    pub sender_id: String,
}

#[derive(Serialize)]
pub struct ChatReply {
    pub success: bool,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, HandlerError> {
    require_auth(&state, &headers)?;
    if body.message.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "message must not be empty",
        ));
    }

    let key = build_session_key(
        &state.config.agent.agent_id,
        &SessionScope::User {
            user_id: body.sender_id.clone(),
        },
    );

    match run_in_lane(Arc::clone(&state.agent), &state.lanes, &key, body.message).await {
        Ok(response) => Ok(Json(ChatReply {
            success: true,
            response,
            error: None,
        })),
        Err(e) => {
            warn!(error = %e, "POST /chat failed");
            Ok(Json(ChatReply {
                success: false,
                response: String::new(),
                error: Some(e),
            }))
        }
    }
}
