//! Error types for image generation and asset storage.

/// Errors that can occur during image generation or asset access.
#[derive(Debug, thiserror::Error)]
pub enum CanvasGenError {
    /// Provider configuration is missing or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Provider API returned an error response.
    #[error("{provider} API error: status {status} - {message}")]
    Api {
        /// Provider that produced the error.
        provider: &'static str,
        /// HTTP status code, 0 when the error came from a 2xx body.
        status: u16,
        /// Raw body or error message for diagnosis.
        message: String,
    },

    /// Response had an unexpected or incomplete shape.
    #[error("unexpected response: {0}")]
    Parse(String),

    /// Asset reference attempted to escape the download root.
    #[error("security error: {0}")]
    Security(String),

    /// Failed to decode base64 or image data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// Network or HTTP transport error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error with the failing path.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path of the failed filesystem operation.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CanvasGenError {
    /// Wraps an I/O error together with the path it failed on.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for image generation operations.
pub type Result<T> = std::result::Result<T, CanvasGenError>;
