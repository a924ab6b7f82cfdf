use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid active hours: {0}")]
    InvalidActiveHours(String),
}

pub type Result<T> = std::result::Result<T, HeartbeatError>;
