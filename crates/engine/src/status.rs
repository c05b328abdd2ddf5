//! Aggregated status documents for polling hosts.

use serde::{Deserialize, Serialize};

use crate::record::{UploadSnapshot, UploadStatus};

/// Status document for one data-id group, serialized exactly as the host
/// boundary expects it (camelCase keys, stable status integers, ms-epoch
/// times).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    /// Outer envelope code; normally the success code.
    pub code: i32,
    /// Aggregate status over the group.
    pub status: i32,
    /// Files whose upload reached Succeeded (including those since
    /// confirmed).
    pub uploaded_count: u32,
    pub uploaded_size: i64,
    pub total_size: i64,
    pub total_upload_count: u32,
    /// First non-empty error among group members.
    pub error_message: String,
    pub data_id: String,
    pub uploads: Vec<UploadEntryStatus>,
}

/// Status of one upload within a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadEntryStatus {
    pub upload_id: String,
    pub local_file_path: String,
    pub s3_object_key: String,
    pub status: i32,
    pub total_size: i64,
    pub error_message: String,
    /// Milliseconds since epoch; 0 when unset.
    pub start_time: i64,
    /// Milliseconds since epoch; 0 when unset.
    pub end_time: i64,
}

/// Aggregate a group's snapshots into a status document.
///
/// A failed member dominates; otherwise the group reports Uploading until
/// every member's upload has succeeded, then Succeeded/Confirmed/
/// ConfirmFailed according to the confirmation outcomes.
pub(crate) fn build_group_status(data_id: &str, snapshots: &[UploadSnapshot]) -> GroupStatus {
    let mut any_failed = false;
    let mut any_in_flight = false;
    let mut uploaded_count: u32 = 0;
    let mut uploaded_size: i64 = 0;
    let mut total_size: i64 = 0;
    let mut error_message = String::new();

    for snapshot in snapshots {
        total_size += snapshot.total_size as i64;
        if error_message.is_empty() && !snapshot.error_message.is_empty() {
            error_message = snapshot.error_message.clone();
        }
        if snapshot.status.upload_succeeded() {
            uploaded_count += 1;
            uploaded_size += snapshot.total_size as i64;
        }
        match snapshot.status {
            UploadStatus::Failed => any_failed = true,
            UploadStatus::Pending | UploadStatus::Uploading | UploadStatus::Cancelled => {
                any_in_flight = true
            }
            _ => {}
        }
    }

    let status: i32 = if any_failed {
        UploadStatus::Failed.code()
    } else if !any_in_flight {
        let all_confirmed: bool = snapshots
            .iter()
            .all(|snapshot| snapshot.status == UploadStatus::Confirmed);
        let any_confirm_failed: bool = snapshots
            .iter()
            .any(|snapshot| snapshot.status == UploadStatus::ConfirmFailed);
        if all_confirmed {
            UploadStatus::Confirmed.code()
        } else if any_confirm_failed {
            UploadStatus::ConfirmFailed.code()
        } else {
            UploadStatus::Succeeded.code()
        }
    } else {
        UploadStatus::Uploading.code()
    };

    GroupStatus {
        code: UploadStatus::Succeeded.code(),
        status,
        uploaded_count,
        uploaded_size,
        total_size,
        total_upload_count: snapshots.len() as u32,
        error_message,
        data_id: data_id.to_string(),
        uploads: snapshots
            .iter()
            .map(|snapshot| UploadEntryStatus {
                upload_id: snapshot.upload_id.clone(),
                local_file_path: snapshot.local_file_path.clone(),
                s3_object_key: snapshot.object_key.clone(),
                status: snapshot.status.code(),
                total_size: snapshot.total_size as i64,
                error_message: snapshot.error_message.clone(),
                start_time: snapshot.start_time_ms,
                end_time: snapshot.end_time_ms,
            })
            .collect(),
    }
}
