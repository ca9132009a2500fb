use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Transport error: {0}")]
    TransportError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] ProtocolError),

    #[error("Message sending failed: {0}")]
    SendError(String),
}

// Implement conversion from config::ConfigError
impl From<config::ConfigError> for RelayError {
    fn from(err: config::ConfigError) -> Self {
        RelayError::ConfigError(err.to_string())
    }
}

/// Failures produced by the inbound decode step. Malformed payloads get
/// an `error` record back on the triggering connection; unknown record
/// types are logged and ignored.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message format: {0}")]
    Malformed(String),

    #[error("Unknown record type: {0}")]
    UnknownType(String),
}
