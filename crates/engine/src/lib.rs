//! Asynchronous upload engine for medical-signal files.
//!
//! The engine accepts upload submissions from a host application, queues
//! them on a single long-lived worker, uploads each file whole-object to
//! the object store with per-file retry, and confirms completed uploads
//! with the backend — per file in realtime-append mode, once per group in
//! batch mode. The host observes progress by polling aggregated status
//! documents per data id.
//!
//! # Structure
//!
//! - [`UploadEngine`] — the host-owned engine object with an explicit
//!   init/shutdown lifecycle; submissions, cancellation, status queries,
//!   and record cleanup all go through it.
//! - [`UploadTracker`] — thread-safe registry of per-file upload records,
//!   queryable by upload id or data-id prefix, with admission control and
//!   stale-record pruning.
//! - `worker` — the single worker task: lazily started, drains the FIFO
//!   queue, exits after an idle timeout, and is restarted by the next
//!   submission.
//! - `confirm` — the confirmation driver and the backend-facing
//!   [`ConfirmationApi`] seam.
//! - `transport` — the [`UploadTransport`] seam over the object store,
//!   implemented with the credential-refreshing S3 client manager.
//!
//! # Example
//!
//! ```ignore
//! use medsignal_engine::{EngineConfig, OperationMode, UploadEngine, UploadRequest};
//!
//! let engine = UploadEngine::new(EngineConfig::default());
//! engine.set_credentials("https://api.example.com", "operator@example.com", "secret")?;
//!
//! let upload_id = engine.submit(UploadRequest {
//!     region: "us-west-2".into(),
//!     bucket: "signals".into(),
//!     object_key: "patient/p-17/source_data/d1/scan/a.bin".into(),
//!     local_file_path: "/data/a.bin".into(),
//!     data_id: "d1".into(),
//!     tenant_id: "p-17".into(),
//!     mode: OperationMode::BatchCreate,
//! })?;
//!
//! let status = engine.group_status("d1")?;
//! ```

mod config;
mod confirm;
mod engine;
mod error;
mod queue;
mod record;
mod status;
mod tracker;
mod transport;
mod worker;

pub use config::EngineConfig;
pub use confirm::{ConfirmRequest, ConfirmationApi};
pub use engine::UploadEngine;
pub use error::EngineError;
pub use record::{
    OperationMode, UploadRecord, UploadRequest, UploadSnapshot, UploadStatus,
    SDK_CLEAN_SUCCESS_CODE, SDK_INIT_SUCCESS_CODE,
};
pub use status::{GroupStatus, UploadEntryStatus};
pub use tracker::UploadTracker;
pub use transport::{PutRequest, S3UploadTransport, UploadTransport};

// Re-exported so hosts and tests can match on transport errors without a
// direct dependency on the storage crate.
pub use medsignal_storage::StorageError;
