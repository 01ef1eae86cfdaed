//! Error types for the scorecard bot.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Survey error: {0}")]
    Survey(#[from] SurveyError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse catalog file {path}: {message}")]
    CatalogParse { path: String, message: String },

    #[error("Invalid catalog: {0}")]
    CatalogInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Per-interaction wizard errors. `Stale` and `UnexpectedText` are
/// recovered locally with a fixed user-visible reply; `Sink` is fatal.
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    #[error("interaction refers to a rendering that is no longer live")]
    Stale,

    #[error("free text received outside the feedback stage")]
    UnexpectedText,

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Persistence errors from the response log.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to append to response log {path}: {source}")]
    Append {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
