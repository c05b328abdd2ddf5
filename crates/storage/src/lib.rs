//! Object-store access for the medsignal upload engine.
//!
//! This crate manages per-tenant temporary credentials and the S3 clients
//! built from them:
//!
//! - **`ClientManager`** caches one client per tenant, refreshing the
//!   backing credentials through a [`CredentialFetcher`] whenever an entry
//!   is missing or within the refresh margin of its expiration.
//! - **`RefreshingClient`** is a thin per-tenant handle that always
//!   resolves the current client from its manager, and whose
//!   `with_auto_refresh` retries an operation after a forced refresh when
//!   the object store reports expired credentials.
//! - **`S3StorageClient`** implements [`ObjectStoreClient`] with the AWS
//!   SDK, configured with fixed region, explicit static credentials, and
//!   request/connect timeouts.
//!
//! # Example
//!
//! ```ignore
//! use medsignal_storage::{ClientManager, S3ClientBuilder};
//!
//! let manager = Arc::new(ClientManager::new("us-west-2", fetcher));
//! let client = manager.refreshing_client("patient-17");
//! client
//!     .with_auto_refresh(|s3| async move {
//!         s3.put_object_from_file("bucket", "key", "/tmp/f.bin", None).await
//!     })
//!     .await?;
//! ```

mod credentials;
mod error;
mod manager;
mod s3;
mod traits;

pub use credentials::TemporaryCredentials;
pub use error::StorageError;
pub use manager::{ClientManager, RefreshingClient, MAX_EXPIRED_RETRIES};
pub use s3::{S3ClientBuilder, S3StorageClient, CONNECT_TIMEOUT, REQUEST_TIMEOUT};
pub use traits::{CredentialFetcher, ObjectStoreClient, ObjectStoreClientBuilder};
