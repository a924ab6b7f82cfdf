//! Unified session keys.
//!
//! Every conversation lane is identified by `agent:<agentId>:<scope>` where
//! the scope encodes where the conversation lives (DM, channel, thread,
//! subagent). Keys are the primary identity for session files, lanes, and
//! per-conversation state, so normalization must be strict and stable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a single normalized key component.
const MAX_COMPONENT_LEN: usize = 64;

/// Where a conversation lives. Serialized form is the scope suffix of the
/// unified key (e.g. `channel:<guild>:<chan>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionScope {
    /// Operator/main session. Cron and heartbeat deliveries land here.
    Main,
    /// Direct-message scope keyed by platform user id.
    User { user_id: String },
    /// Guild channel scope.
    Channel {
        guild_id: String,
        channel_id: String,
    },
    /// Thread inside a guild.
    Thread {
        guild_id: String,
        thread_id: String,
    },
    /// Ephemeral subagent spawned by `sessions_spawn`.
    Subagent { id: String },
}

impl fmt::Display for SessionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionScope::Main => write!(f, "main"),
            SessionScope::User { user_id } => write!(f, "user:{user_id}"),
            SessionScope::Channel {
                guild_id,
                channel_id,
            } => write!(f, "channel:{guild_id}:{channel_id}"),
            SessionScope::Thread {
                guild_id,
                thread_id,
            } => write!(f, "thread:{guild_id}:{thread_id}"),
            SessionScope::Subagent { id } => write!(f, "subagent:{id}"),
        }
    }
}

impl SessionScope {
    /// True for scopes that get the reduced bootstrap set (AGENTS/TOOLS only).
    pub fn is_subagent(&self) -> bool {
        matches!(self, SessionScope::Subagent { .. })
    }

    fn normalized(&self) -> SessionScope {
        match self {
            SessionScope::Main => SessionScope::Main,
            SessionScope::User { user_id } => SessionScope::User {
                user_id: normalize_component(user_id),
            },
            SessionScope::Channel {
                guild_id,
                channel_id,
            } => SessionScope::Channel {
                guild_id: normalize_component(guild_id),
                channel_id: normalize_component(channel_id),
            },
            SessionScope::Thread {
                guild_id,
                thread_id,
            } => SessionScope::Thread {
                guild_id: normalize_component(guild_id),
                thread_id: normalize_component(thread_id),
            },
            SessionScope::Subagent { id } => SessionScope::Subagent {
                id: normalize_component(id),
            },
        }
    }
}

/// Normalize one key component: lowercase, restrict to `[a-z0-9_-]`,
/// substitute anything else with `-`, strip leading/trailing `-`, cap at 64
/// characters. An empty result collapses to `main`.
///
/// Idempotent: `normalize_component(normalize_component(x)) ==
/// normalize_component(x)`.
pub fn normalize_component(raw: &str) -> String {
    let mapped: String = raw
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '_' | '-' => c,
            _ => '-',
        })
        .take(MAX_COMPONENT_LEN)
        .collect();
    let stripped = mapped.trim_matches('-');
    if stripped.is_empty() {
        "main".to_string()
    } else {
        stripped.to_string()
    }
}

/// Build the canonical `agent:<agentId>:<scope>` key. All components are
/// normalized on the way in, so the output is always parseable.
pub fn build_session_key(agent_id: &str, scope: &SessionScope) -> String {
    format!(
        "agent:{}:{}",
        normalize_component(agent_id),
        scope.normalized()
    )
}

/// Parse a unified key back into `(agent_id, scope)`.
///
/// Returns `None` for anything that `build_session_key` could not have
/// produced (wrong prefix, unknown scope tag, missing components).
pub fn parse_session_key(key: &str) -> Option<(String, SessionScope)> {
    let rest = key.strip_prefix("agent:")?;
    let (agent_id, scope_str) = rest.split_once(':')?;
    if agent_id.is_empty() {
        return None;
    }

    let scope = match scope_str.split(':').collect::<Vec<_>>().as_slice() {
        ["main"] => SessionScope::Main,
        ["user", uid] if !uid.is_empty() => SessionScope::User {
            user_id: uid.to_string(),
        },
        ["channel", guild, chan] if !guild.is_empty() && !chan.is_empty() => {
            SessionScope::Channel {
                guild_id: guild.to_string(),
                channel_id: chan.to_string(),
            }
        }
        ["thread", guild, tid] if !guild.is_empty() && !tid.is_empty() => SessionScope::Thread {
            guild_id: guild.to_string(),
            thread_id: tid.to_string(),
        },
        ["subagent", id] if !id.is_empty() => SessionScope::Subagent { id: id.to_string() },
        _ => return None,
    };

    Some((agent_id.to_string(), scope))
}
