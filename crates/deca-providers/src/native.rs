//! Direct subprocess execution on the host, the fallback of last resort
//! before `applescript`.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

use deca_core::config::MAX_EXEC_BUFFER_BYTES;

use crate::types::{Capabilities, ExecRequest, ExecResult, Isolation, Provider};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub struct NativeProvider;

#[async_trait]
impl Provider for NativeProvider {
    fn name(&self) -> &str {
        "native"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            isolation: Isolation::None,
            networking: true,
            workspace: true,
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn exec(&self, req: &ExecRequest) -> ExecResult {
        run_subprocess(self.name(), req).await
    }
}

/// Spawn `sh -c <command>` (args appended), capture bounded output, hard-kill
/// on timeout. Shared by the native and CLI providers.
pub(crate) async fn run_subprocess(provider: &str, req: &ExecRequest) -> ExecResult {
    let started = Instant::now();
    let timeout = Duration::from_millis(req.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS));

    let mut command_line = req.command.clone();
    for arg in &req.args {
        command_line.push(' ');
        command_line.push_str(arg);
    }

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &req.cwd {
        cmd.current_dir(cwd);
    }
    for (k, v) in &req.env {
        cmd.env(k, v);
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            return ExecResult {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("spawn failed: {e}"),
                elapsed_ms: started.elapsed().as_millis() as u64,
                provider: provider.to_string(),
                fallback: None,
            }
        }
    };

    let mut stdout_pipe = child.stdout.take().expect("stdout piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr piped");
    let read_both = async {
        let mut out = Vec::new();
        let mut err = Vec::new();
        // Bounded reads: a runaway process cannot exhaust memory.
        let _ = (&mut stdout_pipe)
            .take(MAX_EXEC_BUFFER_BYTES as u64)
            .read_to_end(&mut out)
            .await;
        let _ = (&mut stderr_pipe)
            .take(MAX_EXEC_BUFFER_BYTES as u64)
            .read_to_end(&mut err)
            .await;
        (out, err)
    };

    let result = tokio::time::timeout(timeout, async {
        let (out, err) = read_both.await;
        let status = child.wait().await;
        (out, err, status)
    })
    .await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok((out, err, status)) => {
            let exit_code = status.as_ref().ok().and_then(|s| s.code());
            ExecResult {
                success: status.map(|s| s.success()).unwrap_or(false),
                exit_code,
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
                elapsed_ms,
                provider: provider.to_string(),
                fallback: None,
            }
        }
        Err(_) => {
            warn!(provider, command = %req.command, timeout_ms = timeout.as_millis() as u64,
                  "exec timed out, killing");
            ExecResult {
                success: false,
                exit_code: None,
                stdout: String::new(),
                stderr: format!("timed out after {}ms", timeout.as_millis()),
                elapsed_ms,
                provider: provider.to_string(),
                fallback: None,
            }
        }
    }
}
