use thiserror::Error;

/// Error taxonomy for the relay core.
///
/// Transport errors (`Redis`) are handled by the subscriber supervision loop;
/// everything else is scoped to the single event that triggered it and must
/// never escape the listener's per-message boundary.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Session API request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session API returned status {status} for session {session_id}")]
    SessionApi { session_id: u64, status: u16 },

    #[error("Malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No client token in the ephemeral store")]
    MissingToken,

    #[error("No file reference in the ephemeral store for session {0}")]
    MissingFileRef(u64),

    #[error("Data preparation failed: {0}")]
    Prepare(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
