use thiserror::Error;

/// Access layer errors
#[derive(Error, Debug)]
pub enum InfluxError {
    /// Connecting or bootstrap provisioning failed
    #[error("InfluxDB connection failed: {0}")]
    ConnectionError(String),

    /// A query or write against an established connection failed
    #[error("InfluxDB operation failed: {0}")]
    OperationError(String),

    /// A result row could not be converted into the requested shape
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Point or batch builder rejected its input
    #[error("Invalid point: {0}")]
    InvalidPoint(String),
}

impl From<serde_json::Error> for InfluxError {
    fn from(err: serde_json::Error) -> Self {
        InfluxError::DeserializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for InfluxError {
    fn from(err: serde_yaml::Error) -> Self {
        InfluxError::ConfigError(err.to_string())
    }
}

/// Result type for access layer operations
pub type Result<T> = std::result::Result<T, InfluxError>;

/// Errors raised by a store connection.
///
/// These stay on the transport side of the boundary: the client maps every one of them
/// into an [`InfluxError`] before returning to the caller.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Request could not be sent or the response could not be read
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Store answered with a non-success status
    #[error("store returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body was not what the store API promises
    #[error("malformed response: {0}")]
    Decode(String),

    /// Batch processor failure
    #[error("batch processor: {0}")]
    Batch(String),

    /// Anything else reported by a connection implementation
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // request URLs never reach messages or logs
        TransportError::Http(err.without_url())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::Other(format!("invalid URL: {}", err))
    }
}
