//! Shared application state and router assembly.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use deca_agent::Agent;
use deca_core::config::DecaConfig;
use deca_heartbeat::HeartbeatManager;
use deca_providers::ProviderRouter;
use deca_scheduler::CronScheduler;
use deca_sessions::LaneRouter;

use crate::dispatch::Dispatcher;

/// Central shared state, passed as `Arc<AppState>` to all handlers.
pub struct AppState {
    pub config: DecaConfig,
    pub agent: Arc<Agent>,
    pub lanes: Arc<LaneRouter>,
    pub dispatcher: Arc<Dispatcher>,
    pub providers: Arc<ProviderRouter>,
    pub scheduler: Arc<CronScheduler>,
    pub heartbeat: Arc<HeartbeatManager>,
    pub started_at: Instant,
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/auth/key", get(crate::http::auth::auth_key_handler))
        .route(
            "/capabilities",
            get(crate::http::providers::capabilities_handler),
        )
        .route("/providers", get(crate::http::providers::providers_handler))
        .route("/exec", post(crate::http::exec::exec_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
