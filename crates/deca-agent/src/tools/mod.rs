//! Agent tool system.
//!
//! Tools take arbitrary JSON input and return a plain string; failures are
//! strings prefixed `错误:` so the model can read them. Nothing here throws
//! into the turn loop. The policy filter removes tools the current
//! deployment must not expose.

pub mod cron;
pub mod edit;
pub mod exec;
pub mod grep;
pub mod list;
pub mod memory;
pub mod read;
pub mod search;
pub mod spawn;
pub mod write;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use deca_memory::MemoryStore;
use deca_scheduler::CronScheduler;

use crate::llm::ToolDefinition;

/// Everything a tool may touch. Threaded explicitly so tools stay free of
/// globals and the Agent ↔ tools ↔ subagent cycle is broken at the
/// [`SubagentHost`] seam.
#[derive(Clone)]
pub struct ToolContext {
    pub workspace_dir: PathBuf,
    pub session_key: String,
    pub memory: Option<Arc<MemoryStore>>,
    pub scheduler: Option<Arc<CronScheduler>>,
    pub subagents: Option<Arc<dyn SubagentHost>>,
    pub http: reqwest::Client,
    pub search_api_key: Option<String>,
    pub search_base_url: String,
}

impl ToolContext {
    /// Resolve a tool-supplied path under the workspace. Relative paths join
    /// the workspace dir; absolute paths pass through.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.workspace_dir.join(p)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpawnSpec {
    pub task: String,
    pub label: Option<String>,
    #[serde(default)]
    pub cleanup: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpawnReceipt {
    pub run_id: String,
    pub session_key: String,
}

/// Spawns detached subagent runs. Implemented by the gateway.
#[async_trait]
pub trait SubagentHost: Send + Sync {
    async fn spawn(&self, spec: SpawnSpec) -> Result<SpawnReceipt, String>;
}

/// Trait that all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (e.g. "read").
    fn name(&self) -> &str;
    /// Description shown to the LLM.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute. Errors come back as `错误: ...` strings, never panics.
    async fn execute(&self, input: serde_json::Value, ctx: &ToolContext) -> String;
}

/// Deployment policy applied before each run.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    pub allow_exec: bool,
    pub allow_write: bool,
    pub sandbox: bool,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            allow_exec: true,
            allow_write: true,
            sandbox: false,
        }
    }
}

/// All built-in tools in catalog order.
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(read::ReadTool),
        Arc::new(write::WriteTool),
        Arc::new(edit::EditTool),
        Arc::new(exec::ExecTool),
        Arc::new(list::ListTool),
        Arc::new(grep::GrepTool),
        Arc::new(search::SearchTool),
        Arc::new(search::ResearchTool),
        Arc::new(memory::MemorySearchTool),
        Arc::new(memory::MemoryGetTool),
        Arc::new(spawn::SessionsSpawnTool),
        Arc::new(cron::CronTool),
    ]
}

/// Apply the policy and subsystem availability to a tool set.
///
/// Sandbox with exec disallowed removes `exec`; write disallowed removes
/// `write`/`edit`; `memory_*`, `sessions_spawn`, and `cron` disappear when
/// their subsystem is absent from the context.
pub fn filter_tools(
    tools: &[Arc<dyn Tool>],
    policy: &ToolPolicy,
    ctx: &ToolContext,
) -> Vec<Arc<dyn Tool>> {
    tools
        .iter()
        .filter(|t| match t.name() {
            "exec" => !(policy.sandbox && !policy.allow_exec),
            "write" | "edit" => policy.allow_write,
            "memory_search" | "memory_get" => ctx.memory.is_some(),
            "sessions_spawn" => ctx.subagents.is_some(),
            "cron" => ctx.scheduler.is_some(),
            _ => true,
        })
        .cloned()
        .collect()
}

/// Convert a tool set to API-level definitions.
pub fn to_definitions(tools: &[Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// Pull a required string field out of tool input.
pub(crate) fn require_str<'a>(
    input: &'a serde_json::Value,
    field: &str,
) -> Result<&'a str, String> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("错误: missing required parameter: {field}"))
}

#[cfg(test)]
pub(crate) fn test_context(workspace: &Path) -> ToolContext {
    ToolContext {
        workspace_dir: workspace.to_path_buf(),
        session_key: "agent:main:main".to_string(),
        memory: None,
        scheduler: None,
        subagents: None,
        http: reqwest::Client::new(),
        search_api_key: None,
        search_base_url: "http://127.0.0.1:0".to_string(),
    }
}
