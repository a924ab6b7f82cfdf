//! Tool: list — directory listing with type markers.

use async_trait::async_trait;

use super::{Tool, ToolContext};

const MAX_ENTRIES: usize = 100;

pub struct ListTool;

#[async_trait]
impl Tool for ListTool {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List directory entries (📁 directories, 📄 files), at most 100. An optional \
         `pattern` filters names by substring."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory, default \".\"" },
                "pattern": { "type": "string", "description": "Substring name filter." }
            }
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let path = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let pattern = input.get("pattern").and_then(|v| v.as_str());

        let resolved = ctx.resolve(path);
        let entries = match std::fs::read_dir(&resolved) {
            Ok(e) => e,
            Err(e) => return format!("错误: cannot list '{path}': {e}"),
        };

        let mut names: Vec<(bool, String)> = entries
            .filter_map(|e| e.ok())
            .map(|e| {
                let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
                (is_dir, e.file_name().to_string_lossy().into_owned())
            })
            .filter(|(_, name)| pattern.map_or(true, |p| name.contains(p)))
            .collect();
        names.sort_by(|a, b| a.1.cmp(&b.1));

        let lines: Vec<String> = names
            .into_iter()
            .take(MAX_ENTRIES)
            .map(|(is_dir, name)| {
                if is_dir {
                    format!("📁 {name}")
                } else {
                    format!("📄 {name}")
                }
            })
            .collect();

        if lines.is_empty() {
            "(empty)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_context;

    #[tokio::test]
    async fn marks_files_and_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = test_context(dir.path());
        let out = ListTool.execute(serde_json::json!({}), &ctx).await;
        assert!(out.contains("📄 a.txt"));
        assert!(out.contains("📁 sub"));
    }

    #[tokio::test]
    async fn pattern_filters_and_cap_applies() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..150 {
            std::fs::write(dir.path().join(format!("file{i:03}.txt")), "").unwrap();
        }
        let ctx = test_context(dir.path());
        let all = ListTool.execute(serde_json::json!({}), &ctx).await;
        assert_eq!(all.lines().count(), 100);

        let filtered = ListTool
            .execute(serde_json::json!({"pattern": "file00"}), &ctx)
            .await;
        assert_eq!(filtered.lines().count(), 10);
    }

    #[tokio::test]
    async fn bad_path_is_error_string() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        let out = ListTool
            .execute(serde_json::json!({"path": "ghost"}), &ctx)
            .await;
        assert!(out.starts_with("错误:"));
    }
}
