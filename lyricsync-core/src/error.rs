use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // Configuration errors
    #[error("Config file not found at {path}. A template has been created - please edit it and restart.")]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid config: {message}")]
    ConfigInvalid { message: String },

    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    #[error("Failed to parse config file: {0}")]
    ConfigParseError(#[from] toml::de::Error),

    // Input errors
    #[error("Audio file {name} is {size} bytes, which exceeds the {limit} byte limit")]
    AudioTooLarge { name: String, size: u64, limit: u64 },

    // Alignment errors
    #[error("Aligner {provider} failed: {reason}")]
    AlignerFailed { provider: String, reason: String },

    #[error("Malformed alignment response: {reason}")]
    MalformedAlignment { reason: String },

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    // Session errors
    #[error("Session is busy aligning lyrics; edits are unavailable until it finishes")]
    SessionBusy,

    #[error("Inputs cannot change while the session is {phase}; reset first")]
    InputsLocked { phase: &'static str },

    #[error("Alignment task failed: {reason}")]
    TaskFailed { reason: String },

    // Network errors
    #[error("Network request failed: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Network middleware failed: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),

    // IO errors
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
