//! Error types shared across the session pipeline.

use thiserror::Error;

/// A progress frame that could not be turned into a sample. Dropped by the
/// stream client; never terminates a session.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("field `{field}` must be a finite, non-negative number (got {value})")]
    OutOfRange { field: &'static str, value: f64 },
}

/// Failure to open a progress stream.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("invalid stream endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("cannot start stream worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failure talking to one of the JSON endpoints.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("resource url is empty")]
    EmptyUrl,

    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    #[error("transport: {0}")]
    Curl(#[from] curl::Error),

    #[error("HTTP {code}: {message}")]
    Http { code: u32, message: String },

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request task failed: {0}")]
    Join(String),

    #[error("saving response body: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by [`crate::session::SessionController::start_session`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// Rejected before any network or stream activity.
    #[error("resource url is empty")]
    EmptyUrl,

    #[error(transparent)]
    Stream(#[from] StreamError),
}
