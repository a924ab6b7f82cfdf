//! Tool: sessions_spawn — delegate a task to a detached subagent run.

use async_trait::async_trait;

use super::{SpawnSpec, Tool, ToolContext};

pub struct SessionsSpawnTool;

#[async_trait]
impl Tool for SessionsSpawnTool {
    fn name(&self) -> &str {
        "sessions_spawn"
    }

    fn description(&self) -> &str {
        "Spawn a detached subagent session for a task. Returns the run id and the \
         subagent's session key."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "What the subagent should do." },
                "label": { "type": "string" },
                "cleanup": { "type": "boolean", "description": "Delete the session afterwards." }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let Some(host) = &ctx.subagents else {
            return "错误: subagent host not available".to_string();
        };
        let spec: SpawnSpec = match serde_json::from_value(input) {
            Ok(s) => s,
            Err(e) => return format!("错误: invalid spawn input: {e}"),
        };

        match host.spawn(spec).await {
            Ok(receipt) => format!(
                "spawned runId={} sessionKey={}",
                receipt.run_id, receipt.session_key
            ),
            Err(e) => format!("错误: spawn failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{test_context, SpawnReceipt, SubagentHost};
    use std::sync::Arc;

    struct FakeHost;

    #[async_trait]
    impl SubagentHost for FakeHost {
        async fn spawn(&self, spec: SpawnSpec) -> Result<SpawnReceipt, String> {
            Ok(SpawnReceipt {
                run_id: "run-1".into(),
                session_key: format!("agent:main:subagent:{}", spec.label.unwrap_or_default()),
            })
        }
    }

    #[tokio::test]
    async fn returns_receipt_fields() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.subagents = Some(Arc::new(FakeHost));
        let out = SessionsSpawnTool
            .execute(
                serde_json::json!({"task": "audit logs", "label": "audit"}),
                &ctx,
            )
            .await;
        assert!(out.contains("runId=run-1"));
        assert!(out.contains("sessionKey=agent:main:subagent:audit"));
    }

    #[tokio::test]
    async fn missing_task_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = test_context(dir.path());
        ctx.subagents = Some(Arc::new(FakeHost));
        let out = SessionsSpawnTool.execute(serde_json::json!({}), &ctx).await;
        assert!(out.starts_with("错误:"));
    }
}
