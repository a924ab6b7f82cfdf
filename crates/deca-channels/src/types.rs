//! Adapter-facing message types.
//!
//! Platform SDKs live outside the core; an adapter translates its native
//! message into a [`MessageRequest`] on the way in and implements [`Channel`]
//! for the way out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Dm,
    Guild,
    Thread,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    pub kind: ChannelKind,
    pub guild_id: Option<String>,
    pub thread_id: Option<String>,
}

/// A normalized inbound message, ready for allowlisting and session routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRequest {
    pub content: String,
    pub sender: Sender,
    pub channel: ChannelInfo,
    /// Filled in by the session router.
    pub session_key: Option<String>,
}

/// One outbound chunk addressed by session key; the adapter maps the key
/// back to its platform target.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub session_key: String,
    pub text: String,
}

/// Implemented by every platform adapter (and by test fakes).
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase adapter name (e.g. `"discord"`).
    fn name(&self) -> &str;

    /// Deliver one already-chunked message.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Mark the originating message as handled (✅) or failed (❌) on
    /// platforms that support reactions. Default: no-op.
    async fn react(&self, _session_key: &str, _ok: bool) -> Result<(), ChannelError> {
        Ok(())
    }
}
