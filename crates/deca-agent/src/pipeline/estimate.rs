//! Char-based token estimation.
//!
//! The gateway never tokenizes for real; 4 chars/token is accurate enough to
//! budget pruning and compaction, and stays model-agnostic.

use deca_core::types::{ContentBlock, Message, MessageContent};

pub const CHARS_PER_TOKEN: usize = 4;

/// Serialization overhead charged per tool_use block on top of its input.
const TOOL_USE_OVERHEAD: usize = 16;

/// Character weight of one message.
pub fn message_chars(msg: &Message) -> usize {
    match &msg.content {
        MessageContent::Text(text) => text.len(),
        MessageContent::Blocks(blocks) => blocks.iter().map(block_chars).sum(),
    }
}

fn block_chars(block: &ContentBlock) -> usize {
    match block {
        ContentBlock::Text { text } => text.len(),
        ContentBlock::ToolUse { input, .. } => {
            serde_json::to_string(input).map(|s| s.len()).unwrap_or(0) + TOOL_USE_OVERHEAD
        }
        ContentBlock::ToolResult { content, .. } => content.len(),
    }
}

pub fn estimate_message_tokens(msg: &Message) -> usize {
    message_chars(msg).div_ceil(CHARS_PER_TOKEN)
}

pub fn estimate_history_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use deca_core::types::Message;

    #[test]
    fn four_chars_per_token() {
        let msg = Message::user("a".repeat(400));
        assert_eq!(estimate_message_tokens(&msg), 100);
    }

    #[test]
    fn tool_use_counts_input_plus_overhead() {
        let msg = Message::assistant_blocks(vec![ContentBlock::ToolUse {
            id: "t".into(),
            name: "read".into(),
            input: serde_json::json!({"file_path": "a.txt"}),
        }]);
        let input_len = serde_json::to_string(&serde_json::json!({"file_path": "a.txt"}))
            .unwrap()
            .len();
        assert_eq!(message_chars(&msg), input_len + 16);
    }

    #[test]
    fn tool_result_counts_content() {
        let msg = Message::user_blocks(vec![ContentBlock::ToolResult {
            tool_use_id: "t".into(),
            content: "x".repeat(40),
        }]);
        assert_eq!(estimate_message_tokens(&msg), 10);
    }

    #[test]
    fn history_sums_messages() {
        let msgs = vec![Message::user("a".repeat(40)), Message::assistant("b".repeat(40))];
        assert_eq!(estimate_history_tokens(&msgs), 20);
    }
}
