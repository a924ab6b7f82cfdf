//! Staged history summarization.
//!
//! When the conversation outgrows its share of the context window, the
//! dropped prefix is condensed into a summary message the agent prepends to
//! the pruned history. Long histories are split into chunks summarized
//! separately and merged by a final call; the chunk size adapts downward
//! when individual messages are large, so a single chunk never dwarfs the
//! summarizer's own window.

use tracing::warn;

use deca_core::types::{Message, MessageContent, Role};

use crate::llm::{ChatRequest, LlmProvider, SystemBlock};

use super::estimate::estimate_history_tokens;

/// Header line of the injected summary message.
pub const SUMMARY_HEADER: &str = "【历史摘要】";

/// Compaction triggers when estimated tokens exceed this share of the window.
pub const COMPACT_TRIGGER_RATIO: f64 = 0.75;
const BASE_CHUNK_RATIO: f64 = 0.4;
const MIN_CHUNK_RATIO: f64 = 0.15;

/// Token budget for each summarizer call.
const SUMMARY_MAX_TOKENS: u32 = 512;

const EMPTY_SUMMARY: &str = "No prior history.";

/// Chunk-size ratio: starts at [`BASE_CHUNK_RATIO`] and shrinks toward
/// [`MIN_CHUNK_RATIO`] as the average message grows relative to the window.
pub fn compute_adaptive_chunk_ratio(messages: &[Message], context_window: usize) -> f64 {
    if messages.is_empty() || context_window == 0 {
        return BASE_CHUNK_RATIO;
    }
    let avg = estimate_history_tokens(messages) as f64 / messages.len() as f64;
    let pressure = (avg / (context_window as f64 * 0.1)).min(1.0);
    BASE_CHUNK_RATIO - (BASE_CHUNK_RATIO - MIN_CHUNK_RATIO) * pressure
}

/// Summarize if the full history crosses the trigger ratio. Returns the new
/// summary, or `None` when compaction is not needed.
pub async fn compact_history_if_needed(
    provider: &dyn LlmProvider,
    model: &str,
    full_history_tokens: usize,
    dropped: &[Message],
    context_window: usize,
    previous_summary: Option<&str>,
) -> Option<String> {
    if full_history_tokens as f64 <= COMPACT_TRIGGER_RATIO * context_window as f64 {
        return None;
    }
    if dropped.is_empty() {
        // Pruning removed nothing; there is nothing to fold into a summary.
        return None;
    }
    Some(summarize_history(provider, model, dropped, context_window, previous_summary).await)
}

/// Staged summarization. Never fails: an LLM error falls back to the
/// previous summary (or the empty-history sentinel).
pub async fn summarize_history(
    provider: &dyn LlmProvider,
    model: &str,
    messages: &[Message],
    context_window: usize,
    previous_summary: Option<&str>,
) -> String {
    if messages.is_empty() {
        return previous_summary
            .map(String::from)
            .unwrap_or_else(|| EMPTY_SUMMARY.to_string());
    }

    let total_tokens = estimate_history_tokens(messages);
    let ratio = compute_adaptive_chunk_ratio(messages, context_window);
    let max_chunk_tokens = ((ratio * context_window as f64) as usize).max(1);
    let parts = total_tokens.div_ceil(max_chunk_tokens).max(1);

    let chunks = split_by_token_share(messages, parts);
    let mut chunk_summaries: Vec<String> = Vec::with_capacity(chunks.len());
    let mut carry = previous_summary.map(String::from);

    for chunk in &chunks {
        let summary = match call_summarizer(provider, model, chunk, carry.as_deref()).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "chunk summarization failed, keeping previous summary");
                return previous_summary
                    .map(String::from)
                    .unwrap_or_else(|| EMPTY_SUMMARY.to_string());
            }
        };
        carry = Some(summary.clone());
        chunk_summaries.push(summary);
    }

    if chunk_summaries.len() == 1 {
        return chunk_summaries.pop().unwrap();
    }

    // Merge the partial summaries with one final call.
    match merge_summaries(provider, model, &chunk_summaries).await {
        Ok(merged) => merged,
        Err(e) => {
            warn!(error = %e, "summary merge failed, using last chunk summary");
            chunk_summaries.pop().unwrap()
        }
    }
}

/// Split into `parts` consecutive chunks of roughly equal token share.
fn split_by_token_share(messages: &[Message], parts: usize) -> Vec<Vec<Message>> {
    if parts <= 1 {
        return vec![messages.to_vec()];
    }
    let total = estimate_history_tokens(messages).max(1);
    let target = total.div_ceil(parts);

    let mut chunks: Vec<Vec<Message>> = Vec::new();
    let mut current: Vec<Message> = Vec::new();
    let mut current_tokens = 0usize;
    for msg in messages {
        let t = super::estimate::estimate_message_tokens(msg);
        if !current.is_empty() && current_tokens + t > target && chunks.len() + 1 < parts {
            chunks.push(std::mem::take(&mut current));
            current_tokens = 0;
        }
        current_tokens += t;
        current.push(msg.clone());
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn call_summarizer(
    provider: &dyn LlmProvider,
    model: &str,
    chunk: &[Message],
    previous: Option<&str>,
) -> Result<String, crate::llm::LlmError> {
    let transcript = render_transcript(chunk);
    let mut prompt = String::new();
    if let Some(prev) = previous {
        prompt.push_str("Earlier summary (extend it, do not repeat verbatim):\n");
        prompt.push_str(prev);
        prompt.push_str("\n\n");
    }
    prompt.push_str("Summarize the following conversation factually. Keep decisions, \
                     names, file paths, and open questions. No preamble.\n\n");
    prompt.push_str(&transcript);

    let req = ChatRequest {
        model: model.to_string(),
        system: vec![SystemBlock::text(
            "You condense conversation history into factual summaries.",
        )],
        tools: Vec::new(),
        messages: vec![Message::user(prompt)],
        max_tokens: SUMMARY_MAX_TOKENS,
    };
    provider.send(&req).await.map(|resp| resp.text())
}

async fn merge_summaries(
    provider: &dyn LlmProvider,
    model: &str,
    summaries: &[String],
) -> Result<String, crate::llm::LlmError> {
    let prompt = format!(
        "Merge these partial conversation summaries into one coherent factual \
         summary. No preamble.\n\n{}",
        summaries.join("\n\n---\n\n")
    );
    let req = ChatRequest {
        model: model.to_string(),
        system: vec![SystemBlock::text(
            "You condense conversation history into factual summaries.",
        )],
        tools: Vec::new(),
        messages: vec![Message::user(prompt)],
        max_tokens: SUMMARY_MAX_TOKENS,
    };
    provider.send(&req).await.map(|resp| resp.text())
}

fn render_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
            };
            let body = match &m.content {
                MessageContent::Text(t) => t.clone(),
                MessageContent::Blocks(_) => m.content.text(),
            };
            format!("{role}: {body}")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the message the agent prepends to the pruned history.
pub fn summary_message(summary: &str) -> Message {
    Message::user(format!("{SUMMARY_HEADER}\n{summary}"))
}
