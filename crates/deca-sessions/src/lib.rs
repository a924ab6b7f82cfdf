pub mod error;
pub mod lane;
pub mod store;

pub use error::{Result, SessionError};
pub use lane::{LaneConsumer, LaneRouter, LaneSettings, GLOBAL_LANE};
pub use store::SessionStore;
