//! Error types for Vidcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VidcastError>;

#[derive(Error, Debug)]
pub enum VidcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl VidcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            VidcastError::InvalidInput(_) => 3,
            VidcastError::Platform(PlatformError::Authentication(_)) => 2,
            VidcastError::Platform(_) => 1,
            VidcastError::Config(_) => 1,
            VidcastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to encode column value: {0}")]
    EncodingError(#[from] serde_json::Error),
}

/// Errors surfaced by platform adapters.
///
/// The variants encode the retry taxonomy: `Network` is the only transient
/// class, everything else surfaces immediately.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Rejected by platform: {0}")]
    Rejection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Media conditioning failed: {0}")]
    Conditioning(String),
}
