//! Error types for object-store operations.

use thiserror::Error;

/// Errors that can occur during object-store operations.
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// The object store rejected the request because the temporary
    /// credentials have expired.
    #[error("Credentials expired: {message}")]
    CredentialsExpired { message: String },

    /// Fetching fresh credentials from the backend failed.
    #[error("Credential fetch failed: {message}")]
    CredentialFetch { message: String },

    /// The credential document could not be parsed.
    #[error("Invalid credential document: {message}")]
    InvalidCredential { message: String },

    /// Network error talking to the object store.
    #[error("Network error: {message}")]
    Network { message: String, retryable: bool },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    Io { path: String, message: String },

    /// The owning `ClientManager` was dropped while a handle was in use.
    #[error("Client manager was dropped")]
    ManagerDropped,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StorageError {
    /// Whether this error indicates expired temporary credentials.
    pub fn is_credentials_expired(&self) -> bool {
        matches!(self, StorageError::CredentialsExpired { .. })
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Network { retryable, .. } => *retryable,
            StorageError::CredentialsExpired { .. } => true,
            _ => false,
        }
    }
}

/// Error markers the object store uses for expired temporary credentials.
pub(crate) const EXPIRED_CREDENTIAL_MARKERS: [&str; 2] = ["ExpiredToken", "RequestExpired"];

/// Detect an expired-credential failure from the structured error code
/// when present, falling back to substring-matching the message.
pub(crate) fn matches_expired_marker(code: Option<&str>, message: &str) -> bool {
    if let Some(code) = code {
        if EXPIRED_CREDENTIAL_MARKERS.iter().any(|m| code.contains(m)) {
            return true;
        }
    }
    EXPIRED_CREDENTIAL_MARKERS.iter().any(|m| message.contains(m))
}
