//! The object-store seam used by the worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use medsignal_storage::{ClientManager, CredentialFetcher, StorageError};

use crate::engine::BackendSlot;

/// Content type for uploaded signal files.
pub(crate) const OCTET_STREAM: &str = "application/octet-stream";

/// One whole-object upload.
#[derive(Debug, Clone)]
pub struct PutRequest {
    pub region: String,
    pub bucket: String,
    pub object_key: String,
    pub local_file_path: String,
    pub tenant_id: String,
}

/// Delivers one file to the object store.
///
/// The production implementation is [`S3UploadTransport`]; tests
/// substitute scripted transports.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn put_file(&self, request: &PutRequest) -> Result<(), StorageError>;
}

/// Transport backed by per-region [`ClientManager`]s: each put goes
/// through the tenant's refreshing client so expired credentials are
/// renewed and retried transparently.
pub struct S3UploadTransport {
    fetcher: Arc<dyn CredentialFetcher>,
    refresh_margin_seconds: i64,
    credential_cache_size: usize,
    managers: Mutex<HashMap<String, Arc<ClientManager>>>,
}

impl S3UploadTransport {
    pub fn new(
        fetcher: Arc<dyn CredentialFetcher>,
        refresh_margin_seconds: i64,
        credential_cache_size: usize,
    ) -> Self {
        Self {
            fetcher,
            refresh_margin_seconds,
            credential_cache_size,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// The manager for a region, created on first use. Credential caches
    /// are per region and live for the engine's lifetime.
    fn manager_for(&self, region: &str) -> Arc<ClientManager> {
        let mut managers = self.managers.lock().unwrap();
        managers
            .entry(region.to_string())
            .or_insert_with(|| {
                Arc::new(
                    ClientManager::new(region, self.fetcher.clone())
                        .with_refresh_margin(self.refresh_margin_seconds)
                        .with_max_cache_size(self.credential_cache_size),
                )
            })
            .clone()
    }
}

#[async_trait]
impl UploadTransport for S3UploadTransport {
    async fn put_file(&self, request: &PutRequest) -> Result<(), StorageError> {
        let manager: Arc<ClientManager> = self.manager_for(&request.region);
        let handle = manager.refreshing_client(&request.tenant_id);

        let bucket: String = request.bucket.clone();
        let key: String = request.object_key.clone();
        let path: String = request.local_file_path.clone();
        handle
            .with_auto_refresh(move |client| {
                let bucket = bucket.clone();
                let key = key.clone();
                let path = path.clone();
                async move {
                    client
                        .put_object_from_file(&bucket, &key, &path, Some(OCTET_STREAM))
                        .await
                }
            })
            .await
    }
}

/// Credential fetcher over the engine's backend slot: asks the backend for
/// temporary object-store credentials for a tenant.
pub(crate) struct SlotCredentialFetcher {
    pub slot: BackendSlot,
}

#[async_trait]
impl CredentialFetcher for SlotCredentialFetcher {
    async fn fetch_credentials(&self, tenant_id: &str) -> Result<Value, StorageError> {
        let client = self
            .slot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StorageError::CredentialFetch {
                message: "backend credentials not set".to_string(),
            })?;

        client
            .get_s3_credentials(tenant_id)
            .await
            .map_err(|err| StorageError::CredentialFetch {
                message: err.to_string(),
            })
    }
}
