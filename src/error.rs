use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CropProfileError {
    #[error("Input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("Invalid crop collection: {0}")]
    InvalidCollection(String),

    #[error("Could not parse generated response: {0}")]
    ResponseParse(String),

    #[error("Generation API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Missing API key: set ANTHROPIC_API_KEY or pass --api-key")]
    MissingApiKey,

    #[error("Generation failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Run interrupted by the user")]
    Interrupted,

    #[cfg(feature = "anthropic")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CropProfileError>;
