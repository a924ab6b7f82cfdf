//! Inbound allowlist enforcement.
//!
//! Deny-first: a match in any deny list rejects the message even when an
//! allow list would admit it. Empty allow lists admit everyone, so a fresh
//! config is open until the operator narrows it; deny lists are the
//! protective rule.

use deca_core::config::AllowConfig;

use crate::types::MessageRequest;

/// Returns `true` when the message passes all allow/deny rules.
pub fn is_allowed(rules: &AllowConfig, req: &MessageRequest) -> bool {
    let user = req.sender.id.as_str();
    let guild = req.channel.guild_id.as_deref();
    let channel = req.channel.id.as_str();

    if matches(&rules.deny_users, user)
        || guild.is_some_and(|g| matches(&rules.deny_guilds, g))
        || matches(&rules.deny_channels, channel)
    {
        return false;
    }

    admits(&rules.allow_users, user)
        && guild.map_or(true, |g| admits(&rules.allow_guilds, g))
        && admits(&rules.allow_channels, channel)
}

fn matches(list: &[String], value: &str) -> bool {
    list.iter().any(|entry| entry == "*" || entry == value)
}

/// Empty allow list admits everyone.
fn admits(list: &[String], value: &str) -> bool {
    list.is_empty() || matches(list, value)
}
