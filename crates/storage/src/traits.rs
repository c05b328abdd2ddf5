//! Storage traits/interfaces for object-store operations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::credentials::TemporaryCredentials;
use crate::error::StorageError;

/// Fetches a fresh credential document for a tenant.
///
/// Implemented over the backend API; the returned JSON is parsed with
/// [`TemporaryCredentials::from_json`].
#[async_trait]
pub trait CredentialFetcher: Send + Sync {
    async fn fetch_credentials(&self, tenant_id: &str) -> Result<Value, StorageError>;
}

/// The object-store operations the upload engine uses.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + std::fmt::Debug {
    /// Upload a whole local file to the object store.
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &str,
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;
}

/// Builds an [`ObjectStoreClient`] bound to a region and a credential set.
///
/// The production implementation is [`crate::S3ClientBuilder`]; tests
/// substitute scripted clients.
pub trait ObjectStoreClientBuilder: Send + Sync {
    fn build(
        &self,
        region: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<Arc<dyn ObjectStoreClient>, StorageError>;
}
