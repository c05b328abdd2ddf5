//! AWS SDK S3 implementation of [`ObjectStoreClient`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::credentials::TemporaryCredentials;
use crate::error::{matches_expired_marker, StorageError};
use crate::traits::{ObjectStoreClient, ObjectStoreClientBuilder};

/// Total timeout for a single S3 request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection timeout for a single S3 request.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// `ObjectStoreClient` implementation using the AWS SDK for Rust.
///
/// The client is bound at construction to a region and a set of explicit
/// temporary credentials; there is no environment or instance-metadata
/// credential discovery.
#[derive(Debug)]
pub struct S3StorageClient {
    s3_client: S3Client,
}

impl S3StorageClient {
    /// Build a client for a region from explicit temporary credentials.
    pub fn new(region: &str, credentials: &TemporaryCredentials) -> Self {
        let static_credentials = Credentials::new(
            &credentials.access_key_id,
            &credentials.secret_access_key,
            credentials.session_token.clone(),
            None,
            "medsignal",
        );

        let timeout_config: TimeoutConfig = TimeoutConfig::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .operation_timeout(REQUEST_TIMEOUT)
            .build();

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(static_credentials)
            .timeout_config(timeout_config)
            .build();

        Self {
            s3_client: S3Client::from_conf(config),
        }
    }

    /// Create a client from an existing S3 client (for testing).
    pub fn from_client(s3_client: S3Client) -> Self {
        Self { s3_client }
    }
}

#[async_trait]
impl ObjectStoreClient for S3StorageClient {
    async fn put_object_from_file(
        &self,
        bucket: &str,
        key: &str,
        file_path: &str,
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(Path::new(file_path))
            .await
            .map_err(|e| StorageError::Io {
                path: file_path.to_string(),
                message: e.to_string(),
            })?;

        let mut request = self
            .s3_client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body);

        if let Some(ct) = content_type {
            request = request.content_type(ct);
        }

        match request.send().await {
            Ok(_) => Ok(()),
            Err(err) => Err(classify_put_error(err)),
        }
    }
}

/// Map an SDK put failure onto [`StorageError`], detecting expired
/// temporary credentials from the structured error code first and the
/// message text second.
///
/// Only the `ServiceError` variant carries a service error;
/// `into_service_error` panics for the others (dispatch failures,
/// timeouts, connection and TLS errors), which are retryable network
/// failures here.
fn classify_put_error(err: SdkError<PutObjectError>) -> StorageError {
    if err.as_service_error().is_none() {
        return StorageError::Network {
            message: format!("{}", DisplayErrorContext(&err)),
            retryable: true,
        };
    }

    let code: Option<String> = err.code().map(str::to_string);
    let message: String = err.into_service_error().to_string();
    if matches_expired_marker(code.as_deref(), &message) {
        StorageError::CredentialsExpired { message }
    } else {
        StorageError::Network {
            message,
            retryable: true,
        }
    }
}

/// Production [`ObjectStoreClientBuilder`] backed by [`S3StorageClient`].
pub struct S3ClientBuilder;

impl ObjectStoreClientBuilder for S3ClientBuilder {
    fn build(
        &self,
        region: &str,
        credentials: &TemporaryCredentials,
    ) -> Result<Arc<dyn ObjectStoreClient>, StorageError> {
        Ok(Arc::new(S3StorageClient::new(region, credentials)))
    }
}
