//! Error handling for the sensor hub

/// Result type alias
pub type Result<T> = std::result::Result<T, HubError>;

/// Error types
///
/// Transient storage contention is retried inside the database layer and
/// only surfaces as `Storage` once retries are exhausted. Sync and
/// registration failures carry enough context for the control loop to
/// decide whether they are fatal.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// Missing or invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Serial device error
    #[error("Serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// Storage error: retries exhausted or a non-transient failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend returned an unusable sync response
    #[error("Sync failed: {0}")]
    Sync(String),

    /// Registration handshake yielded no token
    #[error("Registration failed: {0}")]
    Registration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
