//! Error types for channel-reaper.

/// Configuration-related errors. Always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat transport errors. Scoped to a single channel by the engine.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request {operation} failed: {reason}")]
    Request { operation: String, reason: String },

    #[error("Request {operation} failed with status {status}: {body}")]
    Http {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("API call {operation} returned error: {error}")]
    Api { operation: String, error: String },

    #[error("Failed to decode {operation} response: {reason}")]
    Decode { operation: String, reason: String },

    #[error("Unknown channel: {name}")]
    UnknownChannel { name: String },

    #[error("Injected failure for {operation}: {reason}")]
    Fake { operation: String, reason: String },
}
