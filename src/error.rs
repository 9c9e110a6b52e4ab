//! Error types for the assignment helper.
//!
//! Business outcomes (unknown teacher, duplicate submission, ...) are not
//! errors — the pipeline reports them as ordinary `Outcome` values. These
//! types cover genuine failures: storage, channel I/O, configuration.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Email channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("IMAP fetch failed: {0}")]
    Fetch(String),

    #[error("Failed to send reply to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
