//! Tool: exec — one-shot shell command in the workspace.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use deca_core::config::MAX_EXEC_BUFFER_BYTES;

use super::{require_str, Tool, ToolContext};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Output returned to the model is capped at this many characters.
const MAX_OUTPUT_CHARS: usize = 30_000;

pub struct ExecTool;

#[async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory. Returns stdout with \
         stderr appended under [STDERR]. Killed hard on timeout."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default 30000)."
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let command = match require_str(&input, "command") {
            Ok(c) => c,
            Err(e) => return e,
        };
        let timeout_ms = input
            .get("timeout")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return format!("错误: spawn failed: {e}"),
        };

        let mut stdout_pipe = child.stdout.take().expect("stdout piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr piped");
        let gather = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let _ = (&mut stdout_pipe)
                .take(MAX_EXEC_BUFFER_BYTES as u64)
                .read_to_end(&mut out)
                .await;
            let _ = (&mut stderr_pipe)
                .take(MAX_EXEC_BUFFER_BYTES as u64)
                .read_to_end(&mut err)
                .await;
            let status = child.wait().await;
            (out, err, status)
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), gather).await {
            Ok((out, err, _status)) => {
                let mut text = String::from_utf8_lossy(&out).into_owned();
                let err_text = String::from_utf8_lossy(&err);
                if !err_text.trim().is_empty() {
                    text.push_str("\n[STDERR]\n");
                    text.push_str(&err_text);
                }
                truncate_chars(&text, MAX_OUTPUT_CHARS)
            }
            Err(_) => format!("错误: command timed out after {timeout_ms}ms"),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max).collect();
    format!("{truncated}\n[output truncated at {max} characters]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;

    #[tokio::test]
    async fn stdout_comes_back_plain() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let out = ExecTool
            .execute(serde_json::json!({"command": "echo hi"}), &ctx)
            .await;
        assert_eq!(out.trim(), "hi");
    }

    #[tokio::test]
    async fn stderr_appends_under_marker() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let out = ExecTool
            .execute(serde_json::json!({"command": "echo ok; echo bad >&2"}), &ctx)
            .await;
        assert!(out.contains("ok"));
        assert!(out.contains("[STDERR]"));
        assert!(out.contains("bad"));
    }

    #[tokio::test]
    async fn runs_in_workspace_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let ctx = test_context(dir.path());
        let out = ExecTool
            .execute(serde_json::json!({"command": "ls"}), &ctx)
            .await;
        assert!(out.contains("marker.txt"));
    }

    #[tokio::test]
    async fn timeout_is_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let out = ExecTool
            .execute(serde_json::json!({"command": "sleep 5", "timeout": 100}), &ctx)
            .await;
        assert!(out.starts_with("错误:"));
        assert!(out.contains("timed out"));
    }

    #[test]
    fn long_output_truncates() {
        let long = "y".repeat(40_000);
        let out = truncate_chars(&long, MAX_OUTPUT_CHARS);
        assert!(out.contains("[output truncated at 30000 characters]"));
        assert!(out.chars().count() < 30_100);
    }
}
