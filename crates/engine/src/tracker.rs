//! Thread-safe registry of upload records.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use medsignal_common::ids::group_prefix;
use medsignal_common::keys::parent_directory_key;

use crate::error::EngineError;
use crate::record::{UploadRecord, UploadSnapshot, UploadStatus};

/// Registry of per-file upload records, queryable by upload id or data-id
/// prefix. All operations are safe to call from any thread.
///
/// Admission control: `add` rejects when the number of active records
/// (Pending/Uploading) has reached the limit, unless the data id already
/// has at least one record — a multi-file folder upload may finish its
/// group once started. Records older than the pruning age are removed on
/// every `add`.
pub struct UploadTracker {
    records: Mutex<Vec<Arc<UploadRecord>>>,
    max_uploads: usize,
    record_max_age: Duration,
}

/// Everything needed to issue one batch confirmation, computed atomically
/// against the tracker.
pub(crate) struct BatchPlan {
    pub data_id: String,
    pub upload_data_name: String,
    pub tenant_id: String,
    pub object_key: String,
    pub total_size: u64,
    pub member_ids: Vec<String>,
}

impl UploadTracker {
    pub fn new(max_uploads: usize, record_max_age: Duration) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            max_uploads,
            record_max_age,
        }
    }

    /// Register a new record, pruning stale records first and enforcing
    /// the admission limit.
    pub fn add(&self, record: Arc<UploadRecord>) -> Result<(), EngineError> {
        let mut records = self.records.lock().unwrap();

        let now: SystemTime = SystemTime::now();
        let max_age: Duration = self.record_max_age;
        records.retain(|existing| {
            if existing.age(now) > max_age {
                log::info!("pruning stale upload record {}", existing.upload_id);
                false
            } else {
                true
            }
        });

        let has_group: bool = records
            .iter()
            .any(|existing| existing.data_id == record.data_id);
        let active: usize = records
            .iter()
            .filter(|existing| existing.status().is_active())
            .count();
        if active >= self.max_uploads && !has_group {
            return Err(EngineError::LimitExceeded { active });
        }

        records.push(record);
        Ok(())
    }

    /// Look up a record by upload id.
    pub fn get(&self, upload_id: &str) -> Option<Arc<UploadRecord>> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.upload_id == upload_id)
            .cloned()
    }

    /// Every record whose upload id begins with `<data_id>_`, in insertion
    /// order.
    pub fn get_by_data_id(&self, data_id: &str) -> Vec<Arc<UploadRecord>> {
        let prefix: String = group_prefix(data_id);
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.upload_id.starts_with(&prefix))
            .cloned()
            .collect()
    }

    /// Snapshots of a data-id group, in insertion order.
    pub fn snapshots_by_data_id(&self, data_id: &str) -> Vec<UploadSnapshot> {
        self.get_by_data_id(data_id)
            .iter()
            .map(|record| record.snapshot())
            .collect()
    }

    /// Update a record's status. Returns false when the id is unknown.
    pub fn update(&self, upload_id: &str, status: UploadStatus, error: Option<&str>) -> bool {
        match self.get(upload_id) {
            Some(record) => {
                record.set_status(status, error);
                true
            }
            None => false,
        }
    }

    /// Remove a record. Returns false when the id is unknown.
    pub fn remove(&self, upload_id: &str) -> bool {
        let mut records = self.records.lock().unwrap();
        let before: usize = records.len();
        records.retain(|record| record.upload_id != upload_id);
        records.len() < before
    }

    /// Remove every record of a data-id group. Returns the number removed.
    pub fn remove_by_data_id(&self, data_id: &str) -> usize {
        let prefix: String = group_prefix(data_id);
        let mut records = self.records.lock().unwrap();
        let before: usize = records.len();
        records.retain(|record| !record.upload_id.starts_with(&prefix));
        before - records.len()
    }

    /// Number of records in Pending or Uploading state.
    pub fn count_active(&self) -> usize {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| record.status().is_active())
            .count()
    }

    /// Total number of records.
    pub fn count_total(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Decide whether `record`'s group is ready for its single batch
    /// confirmation, and claim it.
    ///
    /// Returns a plan only when every group member is Succeeded or
    /// Confirmed and no member has attempted confirmation yet; the claim
    /// is made while the registry lock is held, so exactly one completing
    /// task per group can obtain a plan.
    pub(crate) fn claim_batch_confirmation(&self, record: &Arc<UploadRecord>) -> Option<BatchPlan> {
        if record.data_id.is_empty() {
            return None;
        }

        let records = self.records.lock().unwrap();
        let prefix: String = group_prefix(&record.data_id);
        let group: Vec<&Arc<UploadRecord>> = records
            .iter()
            .filter(|member| member.upload_id.starts_with(&prefix))
            .collect();
        if group.is_empty() {
            return None;
        }

        let mut total_size: u64 = 0;
        let mut member_ids: Vec<String> = Vec::new();
        for member in &group {
            let (status, size, confirmation_attempted) = member.confirm_view();
            if confirmation_attempted {
                return None;
            }
            match status {
                UploadStatus::Succeeded => member_ids.push(member.upload_id.clone()),
                UploadStatus::Confirmed => {}
                _ => return None,
            }
            total_size += size;
        }

        record.try_claim_confirmation();

        // A folder upload is confirmed against its directory key.
        let object_key: String = if group.len() == 1 {
            record.object_key.clone()
        } else {
            parent_directory_key(&record.object_key)
        };

        Some(BatchPlan {
            data_id: record.data_id.clone(),
            upload_data_name: record.upload_data_name.clone(),
            tenant_id: record.tenant_id.clone(),
            object_key,
            total_size,
            member_ids,
        })
    }
}
