//! Outbound message chunking.
//!
//! Splits reply text at the platform's maximum message length, preferring
//! newline boundaries, then spaces, hard-breaking only as a last resort.
//! Operates on char boundaries so multi-byte code points (emoji, CJK) are
//! never split. Continuation chunks are trimmed of leading whitespace.

/// Split `text` into chunks of at most `max_chars` characters.
pub fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    if max_chars == 0 || text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        // Byte offset of the char just past the window.
        let window_end = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window = &remaining[..window_end];

        let (cut, skip) = match window.rfind('\n') {
            Some(pos) if pos > 0 => (pos, 1),
            _ => match window.rfind(' ') {
                Some(pos) if pos > 0 => (pos, 1),
                _ => (window_end, 0),
            },
        };

        let chunk = remaining[..cut].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = remaining[cut + skip..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(chunk_message("hello", 2000), vec!["hello"]);
    }

    #[test]
    fn splits_on_newline_boundary() {
        let a = "a".repeat(900);
        let b = "b".repeat(900);
        let chunks = chunk_message(&format!("{a}\n{b}"), 1000);
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn falls_back_to_space_boundary() {
        let words = "word ".repeat(500);
        let chunks = chunk_message(&words, 1000);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            assert!(!chunk.starts_with(' '));
            assert!(!chunk.ends_with(' '));
        }
        // Nothing but boundary whitespace is lost.
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined, words.trim());
    }

    #[test]
    fn hard_breaks_unbroken_runs() {
        let text = "x".repeat(4500);
        let chunks = chunk_message(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), text);
        assert_eq!(chunks[0].len(), 2000);
    }

    #[test]
    fn reconstructs_trimmed_input_at_newline_boundaries() {
        let text = "  line one\nline two\nline three  ";
        let chunks = chunk_message(text, 10);
        let rejoined = chunks.join("\n");
        assert_eq!(rejoined, text.trim());
    }

    #[test]
    fn never_splits_multibyte_chars() {
        let text = "🦀".repeat(1500);
        let chunks = chunk_message(&text, 1000);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            // Every chunk must itself be valid UTF-8 crab sequence.
            assert!(chunk.chars().all(|c| c == '🦀'));
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn continuation_chunks_trim_leading_whitespace() {
        let text = format!("{}\n   indented tail", "a".repeat(100));
        let chunks = chunk_message(&text, 100);
        assert_eq!(chunks[1], "indented tail");
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_message("   ", 100).is_empty());
    }
}
