//! Command-execution provider model.
//!
//! A provider runs shell-style commands with a declared capability envelope
//! (isolation level, network access, workspace mounting). The router picks
//! providers by priority and capability fit, probing availability at call
//! time, and falls through to the next candidate on failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    None,
    Process,
    Container,
    Vm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub isolation: Isolation,
    pub networking: bool,
    pub workspace: bool,
}

/// One execution request, as received on `POST /exec` or from a tool.
/// Wire field names are camelCase (`needsNetwork`, `timeoutMs`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Pin to one provider by name; skips priority selection.
    pub provider: Option<String>,
    #[serde(default)]
    pub needs_network: bool,
    #[serde(default)]
    pub needs_isolation: bool,
    #[serde(default)]
    pub needs_workspace: bool,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FallbackInfo {
    /// True when the winning provider was not the first candidate.
    pub used: bool,
    pub reason: Option<String>,
    /// Providers tried (or skipped as unavailable) before the winner.
    pub attempted: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u64,
    /// Name of the provider that produced this result.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackInfo>,
}

impl ExecResult {
    /// The synthetic result returned when every candidate was unavailable.
    pub fn no_provider(attempted: Vec<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: "no_provider_available".to_string(),
            elapsed_ms: 0,
            provider: String::new(),
            fallback: Some(FallbackInfo {
                used: false,
                reason: Some("no_provider_available".to_string()),
                attempted,
            }),
        }
    }
}

/// A command executor. Stateless apart from the availability probe.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable lowercase name used in priority lists and results.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Cheap availability probe (typically a version-check subprocess with a
    /// short timeout). Called before every exec attempt.
    async fn is_available(&self) -> bool;

    async fn exec(&self, req: &ExecRequest) -> ExecResult;
}

/// Capability filter used during selection.
pub fn satisfies(caps: &Capabilities, req: &ExecRequest) -> bool {
    if req.needs_network && !caps.networking {
        return false;
    }
    if req.needs_isolation && caps.isolation == Isolation::None {
        return false;
    }
    if req.needs_workspace && !caps.workspace {
        return false;
    }
    true
}
