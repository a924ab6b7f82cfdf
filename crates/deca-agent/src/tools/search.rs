//! Tools: search / research — external HTTP search provider.
//!
//! Both degrade to an error string when no API key is configured; the agent
//! loop treats that like any other tool result.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{require_str, Tool, ToolContext};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    #[serde(default)]
    content: String,
}

async fn run_search(
    ctx: &ToolContext,
    query: &str,
    max_results: u64,
    search_depth: &str,
    topic: &str,
) -> String {
    let Some(api_key) = &ctx.search_api_key else {
        return "错误: search API key not configured".to_string();
    };

    let body = serde_json::json!({
        "api_key": api_key,
        "query": query,
        "max_results": max_results,
        "search_depth": search_depth,
        "topic": topic,
        "include_answer": true,
    });

    let response = match ctx
        .http
        .post(ctx.search_base_url.as_str())
        .json(&body)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "search request failed");
            return format!("错误: search request failed: {e}");
        }
    };
    if !response.status().is_success() {
        return format!("错误: search provider returned {}", response.status());
    }

    let parsed: SearchResponse = match response.json().await {
        Ok(p) => p,
        Err(e) => return format!("错误: search response unparseable: {e}"),
    };

    let mut out = String::new();
    if let Some(answer) = parsed.answer {
        out.push_str(&answer);
        out.push_str("\n\n");
    }
    for (i, result) in parsed.results.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} ({})\n{}\n\n",
            i + 1,
            result.title,
            result.url,
            result.content
        ));
    }
    if out.trim().is_empty() {
        format!("no results for '{query}'")
    } else {
        out.trim_end().to_string()
    }
}

pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Web search via the configured provider. Returns ranked results with snippets."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string" },
                "max_results": { "type": "integer", "description": "Default 5." },
                "search_depth": { "type": "string", "enum": ["basic", "advanced"] },
                "topic": { "type": "string", "enum": ["general", "news"] }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let query = match require_str(&input, "query") {
            Ok(q) => q,
            Err(e) => return e,
        };
        let max_results = input.get("max_results").and_then(|v| v.as_u64()).unwrap_or(5);
        let depth = input
            .get("search_depth")
            .and_then(|v| v.as_str())
            .unwrap_or("basic");
        let topic = input.get("topic").and_then(|v| v.as_str()).unwrap_or("general");
        run_search(ctx, query, max_results, depth, topic).await
    }
}

pub struct ResearchTool;

#[async_trait]
impl Tool for ResearchTool {
    fn name(&self) -> &str {
        "research"
    }

    fn description(&self) -> &str {
        "Deep research on a topic: an advanced-depth search pass with more sources."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string" },
                "model": { "type": "string", "description": "Provider-side model hint." }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String {
        let topic = match require_str(&input, "topic") {
            Ok(t) => t,
            Err(e) => return e,
        };
        run_search(ctx, topic, 10, "advanced", "general").await
    }
}
