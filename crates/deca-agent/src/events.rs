//! Event sink for one agent run.
//!
//! The gateway adapter implements this to stream deltas into a reply queue
//! and surface tool activity as progress lines. All methods default to
//! no-ops so callers only override what they consume.

pub trait AgentEvents: Send + Sync {
    /// Incremental assistant text from the model stream.
    fn on_text_delta(&self, _delta: &str) {}

    /// A tool is about to execute.
    fn on_tool_start(&self, _name: &str, _input: &serde_json::Value) {}

    /// A tool finished; `result` is the string placed into the tool_result.
    fn on_tool_end(&self, _name: &str, _result: &str) {}

    /// The user message matched a skill trigger and was rewritten.
    fn on_skill_match(&self, _skill_id: &str) {}
}

/// Sink that discards everything. Used by cron/heartbeat dispatches that
/// only consume the final text.
pub struct NullEvents;

impl AgentEvents for NullEvents {}
