//! Tool: read — numbered file contents.

use async_trait::async_trait;

use super::{require_str, Tool, ToolContext};

const DEFAULT_LIMIT: usize = 500;

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace. Returns up to `limit` lines (default 500), \
         each prefixed with its 1-based line number."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path relative to the workspace (or absolute)."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return."
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let path = match require_str(&input, "file_path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let limit = input
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let resolved = ctx.resolve(path);
        let content = match std::fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) => return format!("错误: cannot read '{path}': {e}"),
        };

        content
            .lines()
            .take(limit.max(1))
            .enumerate()
            .map(|(i, line)| format!("{}\t{}", i + 1, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;

    #[tokio::test]
    async fn numbers_lines_from_one() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "first\nsecond\nthird").unwrap();
        let ctx = test_context(dir.path());
        let out = ReadTool
            .execute(serde_json::json!({"file_path": "a.txt"}), &ctx)
            .await;
        assert_eq!(out, "1\tfirst\n2\tsecond\n3\tthird");
    }

    #[tokio::test]
    async fn limit_caps_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a\nb\nc\nd").unwrap();
        let ctx = test_context(dir.path());
        let out = ReadTool
            .execute(serde_json::json!({"file_path": "a.txt", "limit": 2}), &ctx)
            .await;
        assert_eq!(out, "1\ta\n2\tb");
    }

    #[tokio::test]
    async fn missing_file_is_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let out = ReadTool
            .execute(serde_json::json!({"file_path": "nope.txt"}), &ctx)
            .await;
        assert!(out.starts_with("错误:"));
    }

    #[tokio::test]
    async fn missing_param_is_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let out = ReadTool.execute(serde_json::json!({}), &ctx).await;
        assert!(out.starts_with("错误:"));
    }
}
