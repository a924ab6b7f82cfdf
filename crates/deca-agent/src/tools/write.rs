//! Tool: write — overwrite a file, creating parent directories.

use async_trait::async_trait;

use super::{require_str, Tool, ToolContext};

pub struct WriteTool;

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file, overwriting it. Parent directories are created."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "content": { "type": "string" }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let path = match require_str(&input, "file_path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let content = match require_str(&input, "content") {
            Ok(c) => c,
            Err(e) => return e,
        };

        let resolved = ctx.resolve(path);
        if let Some(parent) = resolved.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return format!("错误: cannot create parent dirs for '{path}': {e}");
            }
        }
        match std::fs::write(&resolved, content) {
            Ok(()) => format!("Wrote {} bytes to {path}", content.len()),
            Err(e) => format!("错误: cannot write '{path}': {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;

    #[tokio::test]
    async fn writes_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let out = WriteTool
            .execute(
                serde_json::json!({"file_path": "deep/nested/file.txt", "content": "hello"}),
                &ctx,
            )
            .await;
        assert!(out.starts_with("Wrote 5 bytes"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("deep/nested/file.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn overwrites_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "old").unwrap();
        let ctx = test_context(dir.path());
        WriteTool
            .execute(serde_json::json!({"file_path": "f.txt", "content": "new"}), &ctx)
            .await;
        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "new");
    }
}
