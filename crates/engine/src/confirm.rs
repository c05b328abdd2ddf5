//! Backend confirmation of completed uploads.
//!
//! RealtimeAppend uploads are confirmed per file through the incremental
//! endpoint; BatchCreate groups are confirmed once, by whichever task
//! completes the group, through the batch endpoint. A confirmation failure
//! never rolls back a successful upload — the record is tagged
//! ConfirmFailed and the object remains in the store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use medsignal_common::keys::extract_file_name;

use crate::engine::{BackendSlot, EngineInner};
use crate::record::{OperationMode, UploadRecord, UploadStatus};

/// Data type tag for raw signal uploads in confirmation payloads.
const RAW_SIGNAL_DATA_TYPE: i32 = 20;

/// One confirmation call to the backend.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    pub data_id: String,
    /// The name reported for the confirmed data: the actual file name for
    /// incremental confirms, the upload-data (directory) name for batch.
    pub data_name: String,
    /// The directory segment containing the uploaded file(s).
    pub upload_data_name: String,
    pub tenant_id: String,
    /// The object key: the file key, or the directory key for multi-file
    /// batch confirmations.
    pub object_key: String,
    pub total_size_bytes: u64,
}

/// Issues confirmation calls. Implementations return whether the backend
/// accepted the confirmation; transport errors count as not accepted.
#[async_trait]
pub trait ConfirmationApi: Send + Sync {
    async fn confirm_batch(&self, request: &ConfirmRequest) -> bool;
    async fn confirm_incremental(&self, request: &ConfirmRequest) -> bool;
}

/// Drive confirmation for a record that just reached Succeeded.
pub(crate) async fn run_confirmation(inner: Arc<EngineInner>, record: Arc<UploadRecord>) {
    match record.mode {
        OperationMode::RealtimeAppend => confirm_single_file(&inner, &record).await,
        OperationMode::BatchCreate => confirm_group(&inner, &record).await,
    }
}

async fn confirm_single_file(inner: &Arc<EngineInner>, record: &Arc<UploadRecord>) {
    if !record.try_claim_confirmation() {
        return;
    }

    let snapshot = record.snapshot();
    let request = ConfirmRequest {
        data_id: record.data_id.clone(),
        data_name: extract_file_name(&record.object_key),
        upload_data_name: record.upload_data_name.clone(),
        tenant_id: record.tenant_id.clone(),
        object_key: record.object_key.clone(),
        total_size_bytes: snapshot.total_size,
    };

    let accepted: bool = inner.confirmer.confirm_incremental(&request).await;
    if accepted {
        record.set_status(UploadStatus::Confirmed, None);
        log::info!("incremental confirmation OK for upload {}", record.upload_id);
    } else {
        record.set_status(UploadStatus::ConfirmFailed, None);
        log::warn!(
            "incremental confirmation failed for upload {} (upload remains stored)",
            record.upload_id
        );
    }
}

async fn confirm_group(inner: &Arc<EngineInner>, record: &Arc<UploadRecord>) {
    let Some(plan) = inner.tracker.claim_batch_confirmation(record) else {
        return;
    };

    log::info!(
        "group {} complete ({} files, {} bytes), confirming",
        plan.data_id,
        plan.member_ids.len(),
        plan.total_size
    );

    let request = ConfirmRequest {
        data_id: plan.data_id.clone(),
        data_name: plan.upload_data_name.clone(),
        upload_data_name: plan.upload_data_name,
        tenant_id: plan.tenant_id,
        object_key: plan.object_key,
        total_size_bytes: plan.total_size,
    };

    let accepted: bool = inner.confirmer.confirm_batch(&request).await;
    let status: UploadStatus = if accepted {
        UploadStatus::Confirmed
    } else {
        UploadStatus::ConfirmFailed
    };
    for upload_id in &plan.member_ids {
        inner.tracker.update(upload_id, status, None);
    }

    if accepted {
        log::info!("batch confirmation OK for dataId {}", plan.data_id);
    } else {
        log::warn!(
            "batch confirmation failed for dataId {} (uploads remain stored)",
            plan.data_id
        );
    }
}

/// Confirmer over the engine's backend slot.
pub(crate) struct BackendConfirmer {
    pub slot: BackendSlot,
}

impl BackendConfirmer {
    fn client(&self) -> Option<Arc<medsignal_backend::ApiClient>> {
        self.slot.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationApi for BackendConfirmer {
    async fn confirm_batch(&self, request: &ConfirmRequest) -> bool {
        let Some(client) = self.client() else {
            log::error!("batch confirmation skipped: backend credentials not set");
            return false;
        };
        let payload: Value = confirmation_payload(request);
        match client.confirm_upload_raw_file(&payload).await {
            Ok(response) => batch_response_accepted(&response),
            Err(err) => {
                log::error!("batch confirmation request failed: {}", err);
                false
            }
        }
    }

    async fn confirm_incremental(&self, request: &ConfirmRequest) -> bool {
        let Some(client) = self.client() else {
            log::error!("incremental confirmation skipped: backend credentials not set");
            return false;
        };
        let payload: Value = confirmation_payload(request);
        match client.confirm_incremental_upload_file(&payload).await {
            Ok(response) => incremental_response_accepted(&response),
            Err(err) => {
                log::error!("incremental confirmation request failed: {}", err);
                false
            }
        }
    }
}

fn confirmation_payload(request: &ConfirmRequest) -> Value {
    json!({
        "dataId": request.data_id,
        "dataName": request.data_name,
        "fileName": request.object_key,
        "dataSize": request.total_size_bytes,
        "patientId": request.tenant_id,
        "dataType": RAW_SIGNAL_DATA_TYPE,
        "uploadDataName": request.upload_data_name,
        "isRawDataInternal": 1,
        "dataVersions": [0],
    })
}

/// Batch confirmation succeeds iff `successUploads` is a non-empty array
/// and `failedUploads` is absent or empty. The ambiguous shape (neither
/// populated) counts as failure.
fn batch_response_accepted(response: &Value) -> bool {
    let has_success: bool = response
        .get("successUploads")
        .and_then(Value::as_array)
        .map(|uploads| !uploads.is_empty())
        .unwrap_or(false);
    let has_failed: bool = response
        .get("failedUploads")
        .and_then(Value::as_array)
        .map(|uploads| !uploads.is_empty())
        .unwrap_or(false);
    has_success && !has_failed
}

/// Incremental confirmation succeeds iff the response carries
/// `status.code == "OK"` and `status.message == "OK"`.
fn incremental_response_accepted(response: &Value) -> bool {
    let Some(status) = response.get("status") else {
        return false;
    };
    status.get("code").and_then(Value::as_str) == Some("OK")
        && status.get("message").and_then(Value::as_str) == Some("OK")
}
