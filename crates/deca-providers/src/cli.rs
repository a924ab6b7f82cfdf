//! Probe-gated providers: agent CLIs (`codex`, `claude`, `opencode`) that
//! sandbox command execution, and the macOS `osascript` bridge.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use deca_core::config::PROBE_TIMEOUT_MS;

use crate::native::run_subprocess;
use crate::types::{Capabilities, ExecRequest, ExecResult, Isolation, Provider};

/// An agent CLI wrapper. Availability is a `<bin> --version` probe; execution
/// delegates to the binary's sandboxed exec mode.
pub struct CliProvider {
    name: String,
    binary: String,
    capabilities: Capabilities,
}

impl CliProvider {
    pub fn new(name: &str, binary: &str, capabilities: Capabilities) -> Self {
        Self {
            name: name.to_string(),
            binary: binary.to_string(),
            capabilities,
        }
    }

    /// The `codex` CLI: process-isolated, network off by default.
    pub fn codex() -> Self {
        Self::new(
            "codex",
            "codex",
            Capabilities {
                isolation: Isolation::Process,
                networking: false,
                workspace: true,
            },
        )
    }

    /// The `claude` CLI: process-isolated with network.
    pub fn claude() -> Self {
        Self::new(
            "claude",
            "claude",
            Capabilities {
                isolation: Isolation::Process,
                networking: true,
                workspace: true,
            },
        )
    }

    pub fn opencode() -> Self {
        Self::new(
            "opencode",
            "opencode",
            Capabilities {
                isolation: Isolation::Process,
                networking: true,
                workspace: true,
            },
        )
    }
}

#[async_trait]
impl Provider for CliProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn is_available(&self) -> bool {
        probe_version(&self.binary).await
    }

    async fn exec(&self, req: &ExecRequest) -> ExecResult {
        run_subprocess(&self.name, req).await
    }
}

/// macOS automation bridge. Commands run through `osascript -e`.
pub struct AppleScriptProvider;

#[async_trait]
impl Provider for AppleScriptProvider {
    fn name(&self) -> &str {
        "applescript"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            isolation: Isolation::None,
            networking: false,
            workspace: false,
        }
    }

    async fn is_available(&self) -> bool {
        cfg!(target_os = "macos") && probe_version("osascript").await
    }

    async fn exec(&self, req: &ExecRequest) -> ExecResult {
        let mut wrapped = req.clone();
        wrapped.command = format!(
            "osascript -e 'do shell script \"{}\"'",
            req.command.replace('"', "\\\"")
        );
        wrapped.args = Vec::new();
        run_subprocess(self.name(), &wrapped).await
    }
}

/// `<bin> --version` with a short timeout. Any clean exit counts.
async fn probe_version(binary: &str) -> bool {
    let spawned = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let Ok(mut child) = spawned else {
        debug!(binary, "probe: binary not found");
        return false;
    };
    match tokio::time::timeout(Duration::from_millis(PROBE_TIMEOUT_MS), child.wait()).await {
        Ok(Ok(status)) => status.success(),
        _ => {
            debug!(binary, "probe: version check timed out or failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_probe_is_false() {
        let provider = CliProvider::new(
            "ghost",
            "definitely-not-a-real-binary-xyz",
            Capabilities {
                isolation: Isolation::Process,
                networking: false,
                workspace: true,
            },
        );
        assert!(!provider.is_available().await);
    }

    #[tokio::test]
    async fn present_binary_probe_is_true() {
        // `sh` has no --version on some platforms; use a provider wrapping
        // something that does.
        let provider = CliProvider::new(
            "sh-like",
            "env",
            Capabilities {
                isolation: Isolation::Process,
                networking: true,
                workspace: true,
            },
        );
        assert!(provider.is_available().await);
    }
}
