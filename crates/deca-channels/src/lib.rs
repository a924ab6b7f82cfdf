pub mod allow;
pub mod chunk;
pub mod error;
pub mod heartbeat_ok;
pub mod reply;
pub mod types;

pub use allow::is_allowed;
pub use chunk::chunk_message;
pub use error::ChannelError;
pub use heartbeat_ok::{strip_heartbeat_token, HEARTBEAT_OK};
pub use reply::ReplyQueue;
pub use types::{Channel, ChannelInfo, ChannelKind, MessageRequest, OutboundMessage, Sender};
