use std::time::Duration;
use thiserror::Error;

/// Errors produced by the generator, the schema builder, and the loop plumbing.
///
/// Validation failures are *not* errors: they are returned as
/// [`ValidationOutcome::Invalid`](crate::schema::ValidationOutcome) values and
/// drive the repair loop.
#[derive(Error, Debug)]
pub enum RepairError {
    /// Low-level HTTP transport failure (connection refused, reset, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON encoding or decoding failed at the serde level.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code, response body, and optional Retry-After hint.
    ///
    /// Returned by [`Backend`](crate::backend::Backend) implementations when
    /// the provider returns a non-success status code.
    #[error("HTTP {status}: {body}")]
    HttpError {
        /// HTTP status code (e.g. 429, 500, 503).
        status: u16,
        /// Response body text.
        body: String,
        /// Parsed `Retry-After` header value, if present.
        retry_after: Option<Duration>,
    },

    /// The provider answered but the completion carried no usable content.
    #[error("generator returned an empty response")]
    EmptyResponse,

    /// A single generator call exceeded the configured timeout.
    #[error("generator call timed out after {0:?}")]
    Timeout(Duration),

    /// The loop was cancelled via the cancellation flag.
    #[error("loop was cancelled")]
    Cancelled,

    /// Invalid configuration detected at build time.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A schema declaration is inconsistent (duplicate field, empty enum, bad bounds).
    #[error("Invalid schema '{schema}': {message}")]
    InvalidSchema { schema: String, message: String },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl RepairError {
    /// Whether this error came from talking to the generator service
    /// (as opposed to local configuration or cancellation).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RepairError::Request(_)
                | RepairError::HttpError { .. }
                | RepairError::Timeout(_)
                | RepairError::Other(_)
        )
    }
}

impl From<anyhow::Error> for RepairError {
    fn from(err: anyhow::Error) -> Self {
        RepairError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RepairError>;
