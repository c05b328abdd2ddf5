//! The host-owned upload engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;

use medsignal_backend::{ApiClient, BackendConfig};
use medsignal_common::ids::new_upload_id;

use crate::config::EngineConfig;
use crate::confirm::{BackendConfirmer, ConfirmationApi};
use crate::error::EngineError;
use crate::queue::TaskQueue;
use crate::record::{UploadRecord, UploadRequest};
use crate::status::{build_group_status, GroupStatus};
use crate::tracker::UploadTracker;
use crate::transport::{S3UploadTransport, SlotCredentialFetcher, UploadTransport};
use crate::worker::{ensure_worker, WorkerState};

/// Shared slot holding the configured backend client. The transport's
/// credential fetcher and the confirmer read the slot on every call, so a
/// later `set_credentials` takes effect for in-flight work.
pub(crate) type BackendSlot = Arc<Mutex<Option<Arc<ApiClient>>>>;

pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) initialized: AtomicBool,
    pub(crate) backend: BackendSlot,
    pub(crate) transport: Arc<dyn UploadTransport>,
    pub(crate) confirmer: Arc<dyn ConfirmationApi>,
    pub(crate) tracker: UploadTracker,
    pub(crate) queue: TaskQueue,
    pub(crate) worker: WorkerState,
    pub(crate) runtime: Handle,
}

/// The asynchronous upload engine.
///
/// One engine per host process; clones share the same state. The engine
/// must be constructed inside a Tokio runtime — it captures the ambient
/// handle to spawn its worker and confirmation tasks.
#[derive(Clone)]
pub struct UploadEngine {
    inner: Arc<EngineInner>,
}

impl UploadEngine {
    /// Create an engine wired to the real object store and backend.
    ///
    /// The backend client is supplied later through
    /// [`UploadEngine::set_credentials`].
    pub fn new(config: EngineConfig) -> Self {
        let backend: BackendSlot = Arc::new(Mutex::new(None));
        let fetcher = Arc::new(SlotCredentialFetcher {
            slot: backend.clone(),
        });
        let transport: Arc<dyn UploadTransport> = Arc::new(S3UploadTransport::new(
            fetcher,
            config.refresh_margin.as_secs() as i64,
            config.credential_cache_size,
        ));
        let confirmer: Arc<dyn ConfirmationApi> = Arc::new(BackendConfirmer {
            slot: backend.clone(),
        });
        Self::build(config, backend, transport, confirmer)
    }

    /// Create an engine with substituted transport and confirmer (for
    /// testing).
    pub fn with_collaborators(
        config: EngineConfig,
        transport: Arc<dyn UploadTransport>,
        confirmer: Arc<dyn ConfirmationApi>,
    ) -> Self {
        let backend: BackendSlot = Arc::new(Mutex::new(None));
        Self::build(config, backend, transport, confirmer)
    }

    fn build(
        config: EngineConfig,
        backend: BackendSlot,
        transport: Arc<dyn UploadTransport>,
        confirmer: Arc<dyn ConfirmationApi>,
    ) -> Self {
        let tracker = UploadTracker::new(config.max_uploads, config.record_max_age);
        Self {
            inner: Arc::new(EngineInner {
                config,
                initialized: AtomicBool::new(false),
                backend,
                transport,
                confirmer,
                tracker,
                queue: TaskQueue::new(),
                worker: WorkerState::new(),
                runtime: Handle::current(),
            }),
        }
    }

    /// Initialize the engine. Idempotent.
    pub fn init_sdk(&self) {
        if !self.inner.initialized.swap(true, Ordering::SeqCst) {
            log::info!("upload engine initialized");
        }
    }

    /// Whether the engine has been initialized.
    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Initialize the engine if needed and configure the backend client
    /// used for credential fetching and confirmations.
    pub fn set_credentials(
        &self,
        api_base_url: &str,
        account: &str,
        password: &str,
    ) -> Result<(), EngineError> {
        self.init_sdk();
        let client = ApiClient::new(BackendConfig::new(api_base_url, account, password)).map_err(
            |err| EngineError::Backend {
                message: err.to_string(),
            },
        )?;
        *self.inner.backend.lock().unwrap() = Some(Arc::new(client));
        log::info!("backend credentials set for {}", account);
        Ok(())
    }

    /// Submit a file for upload. Returns the upload id used for
    /// cancellation and status queries.
    ///
    /// Fails synchronously when the engine is uninitialized, the data id
    /// is empty, or the tracker is at capacity for a new data id. All
    /// other failures surface asynchronously on the record.
    pub fn submit(&self, request: UploadRequest) -> Result<String, EngineError> {
        if !self.is_initialized() {
            return Err(EngineError::NotInitialized);
        }
        if request.data_id.is_empty() {
            return Err(EngineError::InvalidParameter {
                message: "dataId must not be empty".to_string(),
            });
        }

        let upload_id: String = new_upload_id(&request.data_id);
        let record = Arc::new(UploadRecord::new(upload_id.clone(), &request));
        self.inner.tracker.add(record)?;
        self.inner.queue.push(upload_id.clone());
        ensure_worker(&self.inner);

        log::info!("queued upload {} for dataId {}", upload_id, request.data_id);
        Ok(upload_id)
    }

    /// Request cancellation of one upload. Observed by the worker at its
    /// checkpoints; an in-flight transfer attempt runs to completion.
    pub fn cancel(&self, upload_id: &str) -> Result<(), EngineError> {
        match self.inner.tracker.get(upload_id) {
            Some(record) => {
                record.request_cancel();
                Ok(())
            }
            None => Err(EngineError::UnknownUpload {
                upload_id: upload_id.to_string(),
            }),
        }
    }

    /// Request cancellation of every upload in a data-id group. Returns
    /// how many records were flagged.
    pub fn cancel_data_id(&self, data_id: &str) -> usize {
        let records = self.inner.tracker.get_by_data_id(data_id);
        for record in &records {
            record.request_cancel();
        }
        records.len()
    }

    /// Aggregated status for a data-id group.
    pub fn group_status(&self, data_id: &str) -> Result<GroupStatus, EngineError> {
        let snapshots = self.inner.tracker.snapshots_by_data_id(data_id);
        if snapshots.is_empty() {
            return Err(EngineError::UnknownDataId {
                data_id: data_id.to_string(),
            });
        }
        Ok(build_group_status(data_id, &snapshots))
    }

    /// Aggregated status as a JSON document.
    pub fn status_json(&self, data_id: &str) -> Result<String, EngineError> {
        let status = self.group_status(data_id)?;
        serde_json::to_string(&status).map_err(|err| EngineError::Internal {
            message: err.to_string(),
        })
    }

    /// Remove one record from the tracker.
    pub fn remove_upload(&self, upload_id: &str) -> bool {
        self.inner.tracker.remove(upload_id)
    }

    /// Remove every record of a data-id group. Cleanup is host-driven;
    /// confirmed records persist until this is called or the process
    /// exits.
    pub fn cleanup_data_id(&self, data_id: &str) -> usize {
        let removed: usize = self.inner.tracker.remove_by_data_id(data_id);
        if removed > 0 {
            log::info!("cleaned up {} upload(s) for dataId {}", removed, data_id);
        }
        removed
    }

    /// Records in Pending or Uploading state.
    pub fn active_uploads(&self) -> usize {
        self.inner.tracker.count_active()
    }

    /// Total records in the tracker.
    pub fn total_uploads(&self) -> usize {
        self.inner.tracker.count_total()
    }

    /// Whether the worker task is currently running.
    pub fn worker_running(&self) -> bool {
        self.inner.worker.running.load(Ordering::SeqCst)
    }

    /// Hospital id from the backend's last login, if any.
    pub fn hospital_id(&self) -> Option<String> {
        self.inner
            .backend
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|client| client.hospital_id())
    }

    /// Shut the engine down: drop queued work and mark it uninitialized.
    /// The worker exits on its own once idle; tracker records remain
    /// readable until removed.
    pub fn shutdown(&self) {
        self.inner.initialized.store(false, Ordering::SeqCst);
        let dropped: usize = self.inner.queue.clear();
        if dropped > 0 {
            log::warn!("shutdown dropped {} queued upload(s)", dropped);
        }
        log::info!("upload engine shut down");
    }
}
