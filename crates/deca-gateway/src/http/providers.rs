//! GET /capabilities and GET /providers

use std::sync::Arc;

use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use deca_providers::Capabilities;

use crate::app::AppState;

use super::{require_auth, HandlerError};

#[derive(Serialize)]
pub struct CapabilityEntry {
    pub name: String,
    pub capabilities: Capabilities,
}

pub async fn capabilities_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<CapabilityEntry>>, HandlerError> {
    require_auth(&state, &headers)?;
    let entries = state
        .providers
        .all()
        .iter()
        .map(|p| CapabilityEntry {
            name: p.name().to_string(),
            capabilities: p.capabilities(),
        })
        .collect();
    Ok(Json(entries))
}

#[derive(Serialize)]
pub struct ProviderEntry {
    pub name: String,
    pub available: bool,
}

pub async fn providers_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<ProviderEntry>>, HandlerError> {
    require_auth(&state, &headers)?;
    let mut entries = Vec::new();
    for provider in state.providers.all() {
        entries.push(ProviderEntry {
            name: provider.name().to_string(),
            available: provider.is_available().await,
        });
    }
    Ok(Json(entries))
}
