//! Error types for the upload engine.

use thiserror::Error;

/// Errors reported synchronously to the host at the engine surface.
///
/// Failures inside the worker are never raised as errors; they are written
/// to the owning record as a `Failed` status with a descriptive message.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine has not been initialized yet.
    #[error("SDK not initialized")]
    NotInitialized,

    /// A required submission parameter was missing or empty.
    #[error("Invalid parameters: {message}")]
    InvalidParameter { message: String },

    /// The tracker is at capacity and the data id has no existing group.
    #[error("Upload limit exceeded: {active} active uploads")]
    LimitExceeded { active: usize },

    /// No record exists for the given upload id.
    #[error("No upload found with id {upload_id}")]
    UnknownUpload { upload_id: String },

    /// No records exist for the given data id.
    #[error("No uploads found with dataId {data_id}")]
    UnknownDataId { data_id: String },

    /// The backend client could not be constructed or configured.
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Unexpected internal failure.
    #[error("{message}")]
    Internal { message: String },
}
