//! Error types for backend API calls.

use thiserror::Error;

/// Errors that can occur while talking to the backend API.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The request could not be sent or the response body could not be read.
    #[error("Request error: {message}")]
    Request { message: String },

    /// The server rejected the bearer token (HTTP 401).
    #[error("401 Unauthorized")]
    Unauthorized,

    /// The server returned a non-success status other than 401.
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// The response body was not the JSON shape we expected.
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// Login failed and could not be recovered by retrying.
    #[error("Login failed: {message}")]
    LoginFailed { message: String },

    /// Invalid client configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Request {
            message: err.to_string(),
        }
    }
}
