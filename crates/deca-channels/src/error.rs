use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel send failed ({channel}): {reason}")]
    SendFailed { channel: String, reason: String },

    #[error("Channel not connected: {0}")]
    NotConnected(String),
}
