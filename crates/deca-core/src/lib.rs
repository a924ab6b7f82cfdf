pub mod config;
pub mod error;
pub mod key;
pub mod types;

pub use error::{DecaError, Result};
pub use key::{build_session_key, normalize_component, parse_session_key, SessionScope};
