//! The agent turn loop.
//!
//! One `run` drives a full conversation turn: skill rewrite, context
//! assembly, pruning/compaction, the streaming model call, tool dispatch,
//! and memory capture. A turn may expand into several model calls when the
//! model invokes tools; the loop is capped by `max_turns`.
//!
//! The loop never throws for tool failures: unknown tools and tool panics
//! are materialized as tool-result strings and the conversation continues.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use deca_core::key::parse_session_key;
use deca_core::types::{ContentBlock, Message};
use deca_memory::MemoryStore;
use deca_scheduler::CronScheduler;
use deca_sessions::SessionStore;

use crate::bootstrap::load_bootstrap_files;
use crate::error::Result;
use crate::events::AgentEvents;
use crate::llm::{ChatRequest, LlmProvider, StreamEvent, SystemBlock, Usage};
use crate::pipeline::{
    compact_history_if_needed, estimate_history_tokens, prune_context_messages, summary_message,
    PruneSettings,
};
use crate::skills::{load_skills, match_skill, rewrite_with_skill, Skill};
use crate::tools::{
    builtin_tools, filter_tools, to_definitions, SubagentHost, Tool, ToolContext, ToolPolicy,
};

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub agent_id: String,
    pub model: String,
    pub workspace_dir: PathBuf,
    pub max_turns: usize,
    pub max_tokens: u32,
    pub context_window_tokens: usize,
    pub bootstrap_max_chars: usize,
    pub memory_enabled: bool,
    pub skills_enabled: bool,
    pub policy: ToolPolicy,
    pub search_api_key: Option<String>,
    pub search_base_url: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            agent_id: "main".to_string(),
            model: "claude-sonnet-4-5".to_string(),
            workspace_dir: PathBuf::from("."),
            max_turns: 10,
            max_tokens: 4096,
            context_window_tokens: 200_000,
            bootstrap_max_chars: 20_000,
            memory_enabled: true,
            skills_enabled: true,
            policy: ToolPolicy::default(),
            search_api_key: None,
            search_base_url: "https://api.tavily.com/search".to_string(),
        }
    }
}

/// Outcome of one `run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub text: String,
    /// Model calls made.
    pub turns: usize,
    /// Tool dispatches, including unknown-tool synthesis.
    pub tool_calls: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_triggered: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub key: String,
    pub messages: usize,
    pub estimated_tokens: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub agent_id: String,
    pub model: String,
    pub context_window_tokens: usize,
    pub sessions: Vec<SessionStatus>,
}

pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    store: Arc<SessionStore>,
    memory: Option<Arc<MemoryStore>>,
    scheduler: Option<Arc<CronScheduler>>,
    subagents: RwLock<Option<Arc<dyn SubagentHost>>>,
    tools: RwLock<Vec<Arc<dyn Tool>>>,
    skills: Vec<Skill>,
    prune: PruneSettings,
    /// Per-session running summary carried between compactions.
    summaries: Mutex<HashMap<String, String>>,
    http: reqwest::Client,
    settings: AgentSettings,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        store: Arc<SessionStore>,
        memory: Option<Arc<MemoryStore>>,
        scheduler: Option<Arc<CronScheduler>>,
        settings: AgentSettings,
    ) -> Self {
        let skills = if settings.skills_enabled {
            load_skills(&settings.workspace_dir)
        } else {
            Vec::new()
        };
        Self {
            provider,
            store,
            memory,
            scheduler,
            subagents: RwLock::new(None),
            tools: RwLock::new(builtin_tools()),
            skills,
            prune: PruneSettings::default(),
            summaries: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
            settings,
        }
    }

    /// Install the subagent host (done once by the gateway after wiring).
    pub fn set_subagent_host(&self, host: Arc<dyn SubagentHost>) {
        *self.subagents.write().unwrap() = Some(host);
    }

    /// Replace the tool set. Expected before any `run` starts.
    pub fn set_tools(&self, tools: Vec<Arc<dyn Tool>>) {
        *self.tools.write().unwrap() = tools;
    }

    pub fn memory(&self) -> Option<&Arc<MemoryStore>> {
        self.memory.as_ref()
    }

    pub fn scheduler(&self) -> Option<&Arc<CronScheduler>> {
        self.scheduler.as_ref()
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn get_history(&self, session_key: &str) -> Result<Vec<Message>> {
        Ok(self.store.history(session_key)?)
    }

    /// Delete the session file and forget its running summary.
    pub fn reset(&self, session_key: &str) -> Result<()> {
        self.summaries.lock().unwrap().remove(session_key);
        Ok(self.store.reset(session_key)?)
    }

    pub fn list_sessions(&self) -> Vec<String> {
        self.store.list()
    }

    pub fn status(&self, session_key: Option<&str>) -> AgentStatus {
        let keys = match session_key {
            Some(k) => vec![k.to_string()],
            None => self.store.list(),
        };
        let sessions = keys
            .into_iter()
            .map(|key| {
                let history = self.store.history(&key).unwrap_or_default();
                SessionStatus {
                    estimated_tokens: estimate_history_tokens(&history),
                    messages: history.len(),
                    key,
                }
            })
            .collect();
        AgentStatus {
            agent_id: self.settings.agent_id.clone(),
            model: self.settings.model.clone(),
            context_window_tokens: self.settings.context_window_tokens,
            sessions,
        }
    }

    /// Drive one conversation turn.
    pub async fn run(
        &self,
        session_key: &str,
        user_text: &str,
        events: &dyn AgentEvents,
    ) -> Result<RunResult> {
        // 1. Skill rewrite.
        let mut skill_triggered = None;
        let mut text_in = user_text.to_string();
        if self.settings.skills_enabled {
            if let Some((skill, remainder)) = match_skill(&self.skills, user_text) {
                info!(skill = %skill.id, session = %session_key, "skill trigger matched");
                text_in = rewrite_with_skill(skill, &remainder);
                skill_triggered = Some(skill.id.clone());
                events.on_skill_match(&skill.id);
            }
        }

        // 2. Persist the user turn before any model call.
        self.store.append(session_key, &Message::user(text_in.clone()))?;

        // 3. Context assembly.
        let subagent_scope = parse_session_key(session_key)
            .map(|(_, scope)| scope.is_subagent())
            .unwrap_or(false);
        let system = self.build_system_prompt(subagent_scope);
        let ctx = self.tool_context(session_key);
        let available: Vec<Arc<dyn Tool>> = {
            let tools = self.tools.read().unwrap();
            filter_tools(&tools, &self.settings.policy, &ctx)
        };
        let tool_defs = to_definitions(&available);

        // 4. Prune, then fold the dropped prefix into a summary if the
        // history has outgrown its budget.
        let history = self.store.history(session_key)?;
        let full_tokens = estimate_history_tokens(&history);
        let outcome =
            prune_context_messages(history, self.settings.context_window_tokens, &self.prune);
        let previous_summary = self.summaries.lock().unwrap().get(session_key).cloned();
        let mut working = outcome.messages;
        if let Some(summary) = compact_history_if_needed(
            self.provider.as_ref(),
            &self.settings.model,
            full_tokens,
            &outcome.dropped,
            self.settings.context_window_tokens,
            previous_summary.as_deref(),
        )
        .await
        {
            debug!(session = %session_key, chars = summary.len(), "history compacted");
            self.summaries
                .lock()
                .unwrap()
                .insert(session_key.to_string(), summary.clone());
            working.insert(0, summary_message(&summary));
        }

        // 5-8. Model / tool loop.
        let mut turns = 0usize;
        let mut tool_calls = 0usize;
        let mut usage = Usage::default();
        let final_text;

        loop {
            turns += 1;
            let req = ChatRequest {
                model: self.settings.model.clone(),
                system: system.clone(),
                tools: tool_defs.clone(),
                messages: working.clone(),
                max_tokens: self.settings.max_tokens,
            };

            let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
            let send = self.provider.send_stream(&req, tx);
            tokio::pin!(send);
            let mut rx_open = true;
            let final_msg = loop {
                tokio::select! {
                    ev = rx.recv(), if rx_open => {
                        match ev {
                            Some(StreamEvent::TextDelta { text }) => events.on_text_delta(&text),
                            Some(StreamEvent::Done) => {}
                            None => rx_open = false,
                        }
                    }
                    result = &mut send => break result?,
                }
            };
            // Deltas that were buffered when the call returned.
            while let Ok(ev) = rx.try_recv() {
                if let StreamEvent::TextDelta { text } = ev {
                    events.on_text_delta(&text);
                }
            }

            usage.accumulate(&final_msg.usage);
            debug!(
                session = %session_key,
                turn = turns,
                cache_read = final_msg.usage.cache_read,
                cache_hit = final_msg.usage.cache_hit(),
                "model call complete"
            );

            let text = final_msg.text();
            let tool_uses: Vec<(String, String, serde_json::Value)> = final_msg
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            // Persist the assistant message exactly as the model shaped it.
            let assistant_msg = if tool_uses.is_empty() {
                Message::assistant(text.clone())
            } else {
                Message::assistant_blocks(final_msg.content.clone())
            };
            self.store.append(session_key, &assistant_msg)?;
            working.push(assistant_msg);

            if tool_uses.is_empty() {
                final_text = text;
                break;
            }

            // 7. Dispatch tools; every tool_use gets a paired tool_result.
            let mut results = Vec::with_capacity(tool_uses.len());
            for (id, name, input) in &tool_uses {
                tool_calls += 1;
                let result = match available.iter().find(|t| t.name() == name.as_str()) {
                    None => {
                        warn!(tool = %name, "unknown tool requested");
                        format!("未知工具: {name}")
                    }
                    Some(tool) => {
                        events.on_tool_start(name, input);
                        let fut = tool.execute(input.clone(), &ctx);
                        match AssertUnwindSafe(fut).catch_unwind().await {
                            Ok(output) => output,
                            Err(_) => {
                                warn!(tool = %name, "tool panicked");
                                format!("执行错误: tool '{name}' panicked")
                            }
                        }
                    }
                };
                events.on_tool_end(name, &result);
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id.clone(),
                    content: result,
                });
            }
            let results_msg = Message::user_blocks(results);
            self.store.append(session_key, &results_msg)?;
            working.push(results_msg);

            if turns >= self.settings.max_turns {
                warn!(session = %session_key, turns, "max turns reached, ending loop");
                final_text = text;
                break;
            }
        }

        // 9. Memory capture.
        if self.settings.memory_enabled && !final_text.trim().is_empty() {
            if let Some(memory) = &self.memory {
                if let Err(e) = memory.add(
                    format!("Q: {text_in}\nA: {final_text}"),
                    vec!["conversation".to_string()],
                ) {
                    warn!(error = %e, "memory append failed");
                }
            }
        }

        Ok(RunResult {
            text: final_text,
            turns,
            tool_calls,
            skill_triggered,
            usage,
        })
    }

    // --- internals ---------------------------------------------------------

    /// One cacheable system block: project context from bootstrap files,
    /// skill index, memory hint, sandbox note.
    fn build_system_prompt(&self, subagent_scope: bool) -> Vec<SystemBlock> {
        let files = load_bootstrap_files(
            &self.settings.workspace_dir,
            subagent_scope,
            self.settings.bootstrap_max_chars,
        );

        let mut prompt = format!(
            "You are agent `{}`, a tool-using assistant operating in the workspace below.\n\n",
            self.settings.agent_id
        );

        let present: Vec<_> = files.iter().filter(|f| !f.missing).collect();
        if !present.is_empty() {
            prompt.push_str("# Project context\n\n");
            for file in present {
                prompt.push_str(&format!("## {}\n\n", file.name));
                if let Some(content) = &file.content {
                    prompt.push_str(content);
                    prompt.push_str("\n\n");
                }
            }
        }

        if !self.skills.is_empty() {
            prompt.push_str("# Available skills\n\n");
            for skill in &self.skills {
                prompt.push_str(&format!(
                    "- {} (triggers: {})\n",
                    skill.id,
                    skill.triggers.join(", ")
                ));
            }
            prompt.push('\n');
        }

        if self.memory.is_some() {
            prompt.push_str(
                "# Memory\n\nUse memory_search before asking the user to repeat facts; \
                 use memory_get to read a full entry.\n\n",
            );
        }

        if self.settings.policy.sandbox {
            prompt.push_str(
                "# Sandbox\n\nThis deployment is sandboxed; some tools are withheld.\n",
            );
        }

        vec![SystemBlock::ephemeral(prompt)]
    }

    fn tool_context(&self, session_key: &str) -> ToolContext {
        ToolContext {
            workspace_dir: self.settings.workspace_dir.clone(),
            session_key: session_key.to_string(),
            memory: self.memory.clone(),
            scheduler: self.scheduler.clone(),
            subagents: self.subagents.read().unwrap().clone(),
            http: self.http.clone(),
            search_api_key: self.settings.search_api_key.clone(),
            search_base_url: self.settings.search_base_url.clone(),
        }
    }
}
