use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InputInvalid(String),

    #[error("Unknown provider: {name}")]
    UnknownProvider { name: String },

    #[error("External service unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("Lane rejected: mailbox full for {key}")]
    LaneRejected { key: String },

    #[error("Session not found: {key}")]
    SessionNotFound { key: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DecaError {
    /// Short error code string surfaced in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DecaError::Config(_) => "CONFIG_ERROR",
            DecaError::InputInvalid(_) => "INPUT_INVALID",
            DecaError::UnknownProvider { .. } => "UNKNOWN_PROVIDER",
            DecaError::ExternalUnavailable(_) => "EXTERNAL_UNAVAILABLE",
            DecaError::LaneRejected { .. } => "LANE_REJECTED",
            DecaError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            DecaError::Serialization(_) => "SERIALIZATION_ERROR",
            DecaError::Io(_) => "IO_ERROR",
            DecaError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, DecaError>;
