//! Tool: edit — replace the first occurrence of a string in a file.

use async_trait::async_trait;

use super::{require_str, Tool, ToolContext};

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replace the first occurrence of `old_string` with `new_string` in a file. \
         Fails when `old_string` is not present."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "old_string": { "type": "string" },
                "new_string": { "type": "string" }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let path = match require_str(&input, "file_path") {
            Ok(p) => p,
            Err(e) => return e,
        };
        let old = match require_str(&input, "old_string") {
            Ok(s) => s,
            Err(e) => return e,
        };
        let new = match require_str(&input, "new_string") {
            Ok(s) => s,
            Err(e) => return e,
        };

        let resolved = ctx.resolve(path);
        let content = match std::fs::read_to_string(&resolved) {
            Ok(c) => c,
            Err(e) => return format!("错误: cannot read '{path}': {e}"),
        };
        if !content.contains(old) {
            return format!("错误: old_string not found in '{path}'");
        }

        let replaced = content.replacen(old, new, 1);
        match std::fs::write(&resolved, replaced) {
            Ok(()) => format!("Edited {path}"),
            Err(e) => format!("错误: cannot write '{path}': {e}"),
        }
    }
}
