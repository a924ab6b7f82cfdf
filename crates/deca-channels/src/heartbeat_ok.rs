//! `HEARTBEAT_OK` sentinel handling.
//!
//! A heartbeat-initiated turn answers with this token when there is nothing
//! worth delivering. The gateway strips it on reception; cron-delivered
//! responses never go through this filter.

pub const HEARTBEAT_OK: &str = "HEARTBEAT_OK";

/// Apply the sentinel rules to a heartbeat response.
///
/// - exact match (modulo surrounding whitespace): suppress delivery (`None`)
/// - leading `HEARTBEAT_OK` + whitespace: strip it, deliver the remainder
/// - trailing whitespace + `HEARTBEAT_OK`: strip it, deliver the head
/// - embedded anywhere else: deliver unchanged
pub fn strip_heartbeat_token(text: &str) -> Option<String> {
    let text = text.trim();
    if text == HEARTBEAT_OK {
        return None;
    }

    if let Some(rest) = text.strip_prefix(HEARTBEAT_OK) {
        if rest.starts_with(char::is_whitespace) {
            return Some(rest.trim_start().to_string());
        }
    }

    if let Some(head) = text.strip_suffix(HEARTBEAT_OK) {
        if head.ends_with(char::is_whitespace) {
            return Some(head.trim_end().to_string());
        }
    }

    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_token_suppresses() {
        assert_eq!(strip_heartbeat_token("HEARTBEAT_OK"), None);
        assert_eq!(strip_heartbeat_token("  HEARTBEAT_OK \n"), None);
    }

    #[test]
    fn leading_token_is_stripped() {
        assert_eq!(
            strip_heartbeat_token("HEARTBEAT_OK done with tasks").as_deref(),
            Some("done with tasks")
        );
        assert_eq!(
            strip_heartbeat_token("HEARTBEAT_OK\nreport follows").as_deref(),
            Some("report follows")
        );
    }

    #[test]
    fn trailing_token_is_stripped() {
        assert_eq!(
            strip_heartbeat_token("all quiet\nHEARTBEAT_OK").as_deref(),
            Some("all quiet")
        );
    }

    #[test]
    fn embedded_token_delivers_unchanged() {
        let text = "the HEARTBEAT_OK token appears mid-sentence";
        assert_eq!(strip_heartbeat_token(text).as_deref(), Some(text));
    }

    #[test]
    fn glued_prefix_is_not_a_token() {
        // No whitespace after the token: not a sentinel.
        let text = "HEARTBEAT_OKAY then";
        assert_eq!(strip_heartbeat_token(text).as_deref(), Some(text));
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_heartbeat_token("hello").as_deref(), Some("hello"));
    }
}
