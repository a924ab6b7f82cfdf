//! The context pipeline: token estimation, pruning, and compaction.

pub mod compact;
pub mod estimate;
pub mod prune;

pub use compact::{
    compact_history_if_needed, summarize_history, summary_message, COMPACT_TRIGGER_RATIO,
    SUMMARY_HEADER,
};
pub use estimate::{estimate_history_tokens, estimate_message_tokens, CHARS_PER_TOKEN};
pub use prune::{prune_context_messages, PruneOutcome, PruneSettings, SoftTrimSettings};
