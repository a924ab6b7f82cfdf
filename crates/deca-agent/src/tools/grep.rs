//! Tool: grep — recursive text search over workspace source files.

use std::path::Path;

use async_trait::async_trait;

use super::{require_str, Tool, ToolContext};

const MAX_HITS: usize = 50;
const SEARCH_EXTENSIONS: &[&str] = &["ts", "js", "json", "md"];
const EXCLUDED_DIRS: &[&str] = &["node_modules", ".git", "dist", ".deca"];

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search workspace files (.ts/.js/.json/.md) recursively for a substring. \
         Returns at most 50 matches as path:line: text."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": { "type": "string" },
                "path": { "type": "string", "description": "Start directory, default \".\"" }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let pattern = match require_str(&input, "pattern") {
            Ok(p) => p,
            Err(e) => return e,
        };
        if pattern.is_empty() {
            return "错误: pattern must not be empty".to_string();
        }
        let path = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let root = ctx.resolve(path);

        let mut hits = Vec::new();
        walk(&root, &root, pattern, &mut hits);

        if hits.is_empty() {
            format!("no matches for '{pattern}'")
        } else {
            hits.join("\n")
        }
    }
}

fn walk(root: &Path, dir: &Path, pattern: &str, hits: &mut Vec<String>) {
    if hits.len() >= MAX_HITS {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if hits.len() >= MAX_HITS {
            return;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_dir() {
            if !EXCLUDED_DIRS.contains(&name.as_str()) {
                walk(root, &path, pattern, hits);
            }
            continue;
        }
        let matching_ext = path
            .extension()
            .is_some_and(|ext| SEARCH_EXTENSIONS.contains(&ext.to_string_lossy().as_ref()));
        if !matching_ext {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        let rel = path.strip_prefix(root).unwrap_or(&path).to_string_lossy();
        for (idx, line) in content.lines().enumerate() {
            if line.contains(pattern) {
                hits.push(format!("{rel}:{}: {}", idx + 1, line.trim()));
                if hits.len() >= MAX_HITS {
                    return;
                }
            }
        }
    }
}
