//! Tools: memory_search / memory_get — long-term memory access.

use async_trait::async_trait;

use super::{require_str, Tool, ToolContext};

const DEFAULT_LIMIT: usize = 5;

pub struct MemorySearchTool;

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search long-term memory. Returns the top entries with id, snippet, and score."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "limit": { "type": "integer", "description": "Default 5." }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let query = match require_str(&input, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let limit = input
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|v| v as usize)
            .unwrap_or(DEFAULT_LIMIT);

        let Some(memory) = &ctx.memory else {
            return "错误: memory subsystem not available".to_string();
        };

        let hits = memory.search(query, limit);
        if hits.is_empty() {
            return format!("no memory entries match '{query}'");
        }
        hits.iter()
            .map(|h| format!("[{}] {} (score {})", h.entry.id, h.snippet, h.score))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct MemoryGetTool;

#[async_trait]
impl Tool for MemoryGetTool {
    fn name(&self) -> &str {
        "memory_get"
    }

    fn description(&self) -> &str {
        "Fetch one memory entry by id, returning its full content and tags."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "id": { "type": "string" }
            },
            "required": ["id"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let id = match require_str(&input, "id") {
            Ok(i) => i,
            Err(e) => return e,
        };
        let Some(memory) = &ctx.memory else {
            return "错误: memory subsystem not available".to_string();
        };
        match memory.get(id) {
            Some(entry) => {
                let tags = if entry.tags.is_empty() {
                    String::new()
                } else {
                    format!("\ntags: {}", entry.tags.join(", "))
                };
                format!("{}{}", entry.content, tags)
            }
            None => format!("错误: no memory entry with id '{id}'"),
        }
    }
}
