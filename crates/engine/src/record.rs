//! Upload records and their state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use medsignal_common::keys::extract_upload_data_name;

/// Envelope code for a successful SDK initialization.
pub const SDK_INIT_SUCCESS_CODE: i32 = 5;

/// Envelope code for a successful SDK cleanup.
pub const SDK_CLEAN_SUCCESS_CODE: i32 = 6;

/// Confirmation strategy for a logical data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// A single backend call finalizes the whole group once every file
    /// has uploaded.
    BatchCreate,
    /// Each file is confirmed individually as it completes.
    RealtimeAppend,
}

impl OperationMode {
    /// Parse the boundary integer (0 = BatchCreate, 1 = RealtimeAppend).
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(OperationMode::BatchCreate),
            1 => Some(OperationMode::RealtimeAppend),
            _ => None,
        }
    }

    /// The stable boundary integer for this mode.
    pub fn code(&self) -> i32 {
        match self {
            OperationMode::BatchCreate => 0,
            OperationMode::RealtimeAppend => 1,
        }
    }
}

/// State of a single upload.
///
/// Upload states progress `Pending -> Uploading -> {Succeeded, Failed,
/// Cancelled}`; a `Succeeded` record may then move to `Confirmed` or
/// `ConfirmFailed`. Codes are stable boundary integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Succeeded,
    Failed,
    Cancelled,
    Confirmed,
    ConfirmFailed,
}

impl UploadStatus {
    /// The stable boundary integer for this status.
    pub fn code(&self) -> i32 {
        match self {
            UploadStatus::Pending => 0,
            UploadStatus::Uploading => 1,
            UploadStatus::Succeeded => 2,
            UploadStatus::Failed => 3,
            UploadStatus::Cancelled => 4,
            UploadStatus::Confirmed => 7,
            UploadStatus::ConfirmFailed => 8,
        }
    }

    /// Whether the upload itself has finished (successfully or not).
    pub fn is_terminal_upload(&self) -> bool {
        !matches!(self, UploadStatus::Pending | UploadStatus::Uploading)
    }

    /// Whether this record counts against the admission limit.
    pub fn is_active(&self) -> bool {
        matches!(self, UploadStatus::Pending | UploadStatus::Uploading)
    }

    /// Whether the file's bytes reached the object store.
    pub fn upload_succeeded(&self) -> bool {
        matches!(
            self,
            UploadStatus::Succeeded | UploadStatus::Confirmed | UploadStatus::ConfirmFailed
        )
    }
}

/// A host submission: one file to deliver and confirm.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub region: String,
    pub bucket: String,
    pub object_key: String,
    pub local_file_path: String,
    pub data_id: String,
    pub tenant_id: String,
    pub mode: OperationMode,
}

#[derive(Debug)]
struct RecordState {
    status: UploadStatus,
    total_size: u64,
    error_message: String,
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    confirmation_attempted: bool,
}

/// Tracking state for a single submitted file.
///
/// Identity fields are immutable; mutable state lives behind a mutex and is
/// written only by the worker and confirmation tasks. The cancellation flag
/// is atomic so host threads can set it without taking the state lock.
pub struct UploadRecord {
    pub upload_id: String,
    pub data_id: String,
    pub tenant_id: String,
    pub region: String,
    pub bucket: String,
    pub object_key: String,
    pub local_file_path: String,
    pub upload_data_name: String,
    pub mode: OperationMode,
    created_at: SystemTime,
    cancel_requested: AtomicBool,
    state: Mutex<RecordState>,
}

impl UploadRecord {
    /// Create a pending record for a submission.
    pub fn new(upload_id: String, request: &UploadRequest) -> Self {
        Self {
            upload_id,
            data_id: request.data_id.clone(),
            tenant_id: request.tenant_id.clone(),
            region: request.region.clone(),
            bucket: request.bucket.clone(),
            object_key: request.object_key.clone(),
            local_file_path: request.local_file_path.clone(),
            upload_data_name: extract_upload_data_name(&request.object_key),
            mode: request.mode,
            created_at: SystemTime::now(),
            cancel_requested: AtomicBool::new(false),
            state: Mutex::new(RecordState {
                status: UploadStatus::Pending,
                total_size: 0,
                error_message: String::new(),
                start_time: None,
                end_time: None,
                confirmation_attempted: false,
            }),
        }
    }

    /// Wall-clock age of this record.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.created_at).unwrap_or_default()
    }

    /// Current status.
    pub fn status(&self) -> UploadStatus {
        self.state.lock().unwrap().status
    }

    /// Request cooperative cancellation; observed by the worker at its
    /// checkpoints.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// A consistent copy of the mutable state plus identity fields.
    pub fn snapshot(&self) -> UploadSnapshot {
        let state = self.state.lock().unwrap();
        UploadSnapshot {
            upload_id: self.upload_id.clone(),
            data_id: self.data_id.clone(),
            local_file_path: self.local_file_path.clone(),
            object_key: self.object_key.clone(),
            status: state.status,
            total_size: state.total_size,
            error_message: state.error_message.clone(),
            start_time_ms: epoch_millis(state.start_time),
            end_time_ms: epoch_millis(state.end_time),
        }
    }

    /// Set a new status, optionally with an error message.
    ///
    /// Transitions out of a terminal upload state are ignored, except
    /// `Succeeded -> Confirmed/ConfirmFailed`.
    pub(crate) fn set_status(&self, status: UploadStatus, error: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        let current: UploadStatus = state.status;
        let confirm_transition = current == UploadStatus::Succeeded
            && matches!(
                status,
                UploadStatus::Confirmed | UploadStatus::ConfirmFailed
            );
        if current.is_terminal_upload() && !confirm_transition {
            log::warn!(
                "ignoring status transition {:?} -> {:?} for upload {}",
                current,
                status,
                self.upload_id
            );
            return;
        }
        state.status = status;
        if let Some(error) = error {
            if !error.is_empty() {
                state.error_message = error.to_string();
            }
        }
    }

    pub(crate) fn mark_uploading(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status == UploadStatus::Pending {
            state.status = UploadStatus::Uploading;
            state.start_time = Some(SystemTime::now());
        }
    }

    pub(crate) fn mark_succeeded(&self) {
        let mut state = self.state.lock().unwrap();
        if state.status == UploadStatus::Uploading {
            state.status = UploadStatus::Succeeded;
            state.end_time = Some(SystemTime::now());
        }
    }

    pub(crate) fn fail(&self, message: &str) {
        self.set_status(UploadStatus::Failed, Some(message));
    }

    pub(crate) fn cancel(&self) {
        self.set_status(UploadStatus::Cancelled, None);
    }

    pub(crate) fn set_total_size(&self, total_size: u64) {
        self.state.lock().unwrap().total_size = total_size;
    }

    /// Claim the right to confirm this record. Returns false if a
    /// confirmation was already attempted.
    pub(crate) fn try_claim_confirmation(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.confirmation_attempted {
            return false;
        }
        state.confirmation_attempted = true;
        true
    }

    /// Status, size, and confirmation flag in one consistent read, for
    /// group confirmation decisions.
    pub(crate) fn confirm_view(&self) -> (UploadStatus, u64, bool) {
        let state = self.state.lock().unwrap();
        (state.status, state.total_size, state.confirmation_attempted)
    }
}

/// Read-only copy of an upload record's state.
#[derive(Debug, Clone)]
pub struct UploadSnapshot {
    pub upload_id: String,
    pub data_id: String,
    pub local_file_path: String,
    pub object_key: String,
    pub status: UploadStatus,
    pub total_size: u64,
    pub error_message: String,
    /// Milliseconds since epoch; 0 when unset.
    pub start_time_ms: i64,
    /// Milliseconds since epoch; 0 when unset.
    pub end_time_ms: i64,
}

fn epoch_millis(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
