//! History pruning.
//!
//! Non-destructive: the session file keeps everything; pruning only shapes
//! the in-memory message list sent to the model. Oversized tool results are
//! soft-trimmed first, then whole messages are dropped oldest-first until
//! the history fits its share of the context window, protecting the suffix
//! that starts at the k-th last assistant message.

use deca_core::types::{ContentBlock, Message, MessageContent, Role};

use super::estimate::{message_chars, CHARS_PER_TOKEN};

#[derive(Debug, Clone)]
pub struct SoftTrimSettings {
    pub max_chars: usize,
    pub head_chars: usize,
    pub tail_chars: usize,
}

impl Default for SoftTrimSettings {
    fn default() -> Self {
        Self {
            max_chars: 4000,
            head_chars: 1500,
            tail_chars: 1500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PruneSettings {
    /// Fraction of the context window the history may occupy.
    pub max_history_share: f64,
    /// The suffix from the k-th last assistant message is protected.
    pub keep_last_assistants: usize,
    pub soft_trim: SoftTrimSettings,
}

impl Default for PruneSettings {
    fn default() -> Self {
        Self {
            max_history_share: 0.5,
            keep_last_assistants: 3,
            soft_trim: SoftTrimSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PruneStats {
    pub budget_chars: usize,
    pub total_chars_before: usize,
    pub trimmed_tool_results: usize,
    pub dropped_messages: usize,
}

#[derive(Debug)]
pub struct PruneOutcome {
    /// Messages to send, in order.
    pub messages: Vec<Message>,
    /// Dropped prefix, in order; feeds the summarizer.
    pub dropped: Vec<Message>,
    pub stats: PruneStats,
}

/// Fit `messages` into `context_window_tokens * max_history_share`.
pub fn prune_context_messages(
    messages: Vec<Message>,
    context_window_tokens: usize,
    settings: &PruneSettings,
) -> PruneOutcome {
    let mut stats = PruneStats::default();

    // 1. Soft-trim oversized tool results in place.
    let messages: Vec<Message> = messages
        .into_iter()
        .map(|m| soft_trim_message(m, &settings.soft_trim, &mut stats.trimmed_tool_results))
        .collect();

    let budget_chars = (context_window_tokens as f64
        * CHARS_PER_TOKEN as f64
        * settings.max_history_share) as usize;
    stats.budget_chars = budget_chars;
    stats.total_chars_before = messages.iter().map(message_chars).sum();

    // 2. Under budget: nothing to drop.
    if stats.total_chars_before <= budget_chars {
        return PruneOutcome {
            messages,
            dropped: Vec::new(),
            stats,
        };
    }

    // 3. Locate the protected suffix.
    let assistant_indices: Vec<usize> = messages
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::Assistant)
        .map(|(i, _)| i)
        .collect();
    let protected_start = if assistant_indices.len() >= settings.keep_last_assistants
        && settings.keep_last_assistants > 0
    {
        assistant_indices[assistant_indices.len() - settings.keep_last_assistants]
    } else {
        0
    };

    let protected_chars: usize = messages[protected_start..].iter().map(message_chars).sum();

    let keep_from = if protected_chars > budget_chars {
        // 4. Even the protected suffix is too big: drop its oldest entries,
        // always keeping the most recent message.
        let mut from = protected_start;
        let mut chars = protected_chars;
        while from < messages.len() - 1 && chars > budget_chars {
            chars -= message_chars(&messages[from]);
            from += 1;
        }
        from
    } else {
        // 5. Extend the kept set backwards while budget allows.
        let mut from = protected_start;
        let mut chars = protected_chars;
        while from > 0 {
            let candidate = message_chars(&messages[from - 1]);
            if chars + candidate > budget_chars {
                break;
            }
            chars += candidate;
            from -= 1;
        }
        from
    };

    let dropped: Vec<Message> = messages[..keep_from].to_vec();
    let kept: Vec<Message> = messages[keep_from..].to_vec();
    stats.dropped_messages = dropped.len();

    PruneOutcome {
        messages: kept,
        dropped,
        stats,
    }
}

fn soft_trim_message(
    mut msg: Message,
    settings: &SoftTrimSettings,
    trimmed: &mut usize,
) -> Message {
    if let MessageContent::Blocks(blocks) = &mut msg.content {
        for block in blocks.iter_mut() {
            if let ContentBlock::ToolResult { content, .. } = block {
                if content.chars().count() > settings.max_chars {
                    *content = soft_trim_text(content, settings);
                    *trimmed += 1;
                }
            }
        }
    }
    msg
}

fn soft_trim_text(content: &str, settings: &SoftTrimSettings) -> String {
    let total = content.chars().count();
    let head: String = content.chars().take(settings.head_chars).collect();
    let tail: String = content
        .chars()
        .skip(total.saturating_sub(settings.tail_chars))
        .collect();
    format!(
        "{head}\n...\n{tail} [Tool result trimmed: kept {} head and {} tail of {} chars.]",
        settings.head_chars, settings.tail_chars, total
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use deca_core::types::Message;

    fn user(chars: usize) -> Message {
        Message::user("u".repeat(chars))
    }

    fn assistant(chars: usize) -> Message {
        Message::assistant("a".repeat(chars))
    }

    fn settings() -> PruneSettings {
        PruneSettings::default()
    }

    #[test]
    fn under_budget_returns_unchanged() {
        let msgs = vec![user(100), assistant(100)];
        // budget = 1000 tokens * 4 * 0.5 = 2000 chars
        let outcome = prune_context_messages(msgs.clone(), 1000, &settings());
        assert_eq!(outcome.messages, msgs);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn drops_oldest_when_over_budget() {
        // budget = 100 * 4 * 0.5 = 200 chars
        let msgs = vec![
            user(150),
            assistant(50),
            user(50),
            assistant(50),
            user(20),
            assistant(20),
        ];
        let outcome = prune_context_messages(msgs, 100, &settings());
        assert!(!outcome.dropped.is_empty());
        assert_eq!(outcome.stats.dropped_messages, outcome.dropped.len());
        let kept_chars: usize = outcome.messages.iter().map(message_chars).sum();
        assert!(kept_chars <= 200);
        // Oldest messages go first.
        assert_eq!(message_chars(&outcome.dropped[0]), 150);
    }

    #[test]
    fn protected_suffix_survives_when_it_fits() {
        // Last 3 assistants (plus trailing context) total well under budget.
        let msgs = vec![
            user(500),
            assistant(500),
            user(10),
            assistant(10),
            user(10),
            assistant(10),
            user(10),
            assistant(10),
        ];
        // budget = 200 chars
        let outcome = prune_context_messages(msgs.clone(), 100, &settings());
        let kept_assistants = outcome
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count();
        assert!(kept_assistants >= 3, "last 3 assistants must remain");
        // The protected suffix is exactly the tail of the input.
        let tail = &msgs[msgs.len() - outcome.messages.len()..];
        assert_eq!(outcome.messages, tail);
    }

    #[test]
    fn oversized_protected_suffix_still_keeps_most_recent() {
        let msgs = vec![assistant(500), assistant(500), assistant(500)];
        // budget = 40 chars; nothing fits, keep only the newest.
        let outcome = prune_context_messages(msgs, 20, &settings());
        assert_eq!(outcome.messages.len(), 1);
        assert_eq!(outcome.dropped.len(), 2);
    }

    #[test]
    fn soft_trim_rewrites_large_tool_results() {
        let big = "x".repeat(10_000);
        let msgs = vec![Message::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "t".into(),
            content: big,
        }])];
        let outcome = prune_context_messages(msgs, 100_000, &settings());
        assert_eq!(outcome.stats.trimmed_tool_results, 1);
        let MessageContent::Blocks(blocks) = &outcome.messages[0].content else {
            panic!("blocks expected");
        };
        let ContentBlock::ToolResult { content, .. } = &blocks[0] else {
            panic!("tool result expected");
        };
        assert!(content.contains("\n...\n"));
        assert!(content.contains("[Tool result trimmed: kept 1500 head and 1500 tail of 10000 chars.]"));
        assert!(content.len() < 3200);
    }

    #[test]
    fn small_tool_results_untouched() {
        let msgs = vec![Message::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "t".into(),
            content: "small".into(),
        }])];
        let outcome = prune_context_messages(msgs, 100_000, &settings());
        assert_eq!(outcome.stats.trimmed_tool_results, 0);
    }
}
