//! Per-tenant client cache with credential refresh.
//!
//! `ClientManager` keeps at most one object-store client per tenant, each
//! paired with the temporary credentials it was built from. An entry is
//! served only while `now + refresh_margin < expiration`; otherwise the
//! credential fetcher is invoked and a fresh client is built and cached.
//!
//! The fetcher runs without the cache mutex held (it performs network
//! calls); the final cache update is last-writer-wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use crate::credentials::{current_epoch_seconds, TemporaryCredentials};
use crate::error::StorageError;
use crate::s3::S3ClientBuilder;
use crate::traits::{CredentialFetcher, ObjectStoreClient, ObjectStoreClientBuilder};

/// Maximum forced refreshes per operation when the object store keeps
/// reporting expired credentials.
pub const MAX_EXPIRED_RETRIES: u32 = 3;

/// Default seconds of headroom maintained before credential expiry.
pub const DEFAULT_REFRESH_MARGIN_SECONDS: i64 = 600;

/// Default maximum number of tenants kept in the cache.
pub const DEFAULT_MAX_CACHE_SIZE: usize = 1000;

struct ClientEntry {
    client: Arc<dyn ObjectStoreClient>,
    credential: TemporaryCredentials,
}

/// Caches object-store clients per tenant and refreshes their credentials.
pub struct ClientManager {
    region: String,
    fetcher: Arc<dyn CredentialFetcher>,
    builder: Arc<dyn ObjectStoreClientBuilder>,
    refresh_margin_seconds: i64,
    max_cache_size: usize,
    cache: Mutex<HashMap<String, ClientEntry>>,
}

impl ClientManager {
    /// Create a manager for a region with the default S3 client builder.
    pub fn new(region: impl Into<String>, fetcher: Arc<dyn CredentialFetcher>) -> Self {
        Self {
            region: region.into(),
            fetcher,
            builder: Arc::new(S3ClientBuilder),
            refresh_margin_seconds: DEFAULT_REFRESH_MARGIN_SECONDS,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Set the refresh margin in seconds.
    pub fn with_refresh_margin(mut self, refresh_margin_seconds: i64) -> Self {
        self.refresh_margin_seconds = refresh_margin_seconds;
        self
    }

    /// Set the maximum number of cached tenants.
    pub fn with_max_cache_size(mut self, max_cache_size: usize) -> Self {
        self.max_cache_size = max_cache_size;
        self
    }

    /// Substitute the client builder (for testing).
    pub fn with_client_builder(mut self, builder: Arc<dyn ObjectStoreClientBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// The region this manager builds clients for.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Create a per-tenant handle that resolves the current client from
    /// this manager on every use.
    pub fn refreshing_client(self: &Arc<Self>, tenant_id: impl Into<String>) -> RefreshingClient {
        RefreshingClient {
            manager: Arc::downgrade(self),
            tenant_id: tenant_id.into(),
        }
    }

    /// Get a client whose credentials are valid for at least the refresh
    /// margin, refreshing first if necessary.
    pub async fn get_client(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<dyn ObjectStoreClient>, StorageError> {
        if let Some(client) = self.cached_client(tenant_id) {
            return Ok(client);
        }
        self.refresh_client(tenant_id).await
    }

    /// Unconditionally fetch fresh credentials and rebuild the client.
    pub async fn force_refresh(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<dyn ObjectStoreClient>, StorageError> {
        self.refresh_client(tenant_id).await
    }

    /// Whether the cached entry for a tenant is missing or near expiration.
    pub fn need_refresh(&self, tenant_id: &str) -> bool {
        self.cached_client(tenant_id).is_none()
    }

    /// Number of tenants currently cached.
    pub fn cached_tenants(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    fn cached_client(&self, tenant_id: &str) -> Option<Arc<dyn ObjectStoreClient>> {
        let cache = self.cache.lock().unwrap();
        let entry: &ClientEntry = cache.get(tenant_id)?;
        let now: i64 = current_epoch_seconds();
        if entry
            .credential
            .needs_refresh(self.refresh_margin_seconds, now)
        {
            return None;
        }
        Some(entry.client.clone())
    }

    async fn refresh_client(
        &self,
        tenant_id: &str,
    ) -> Result<Arc<dyn ObjectStoreClient>, StorageError> {
        // Fetching credentials hits the network; keep the mutex released.
        // A fetch failure propagates and leaves any existing entry intact.
        let document = self.fetcher.fetch_credentials(tenant_id).await?;
        let credential = TemporaryCredentials::from_json(&document)?;
        let client = self.builder.build(&self.region, &credential)?;

        let mut cache = self.cache.lock().unwrap();
        cache.remove(tenant_id);
        Self::cleanup_cache_locked(&mut cache, self.max_cache_size);
        cache.insert(
            tenant_id.to_string(),
            ClientEntry {
                client: client.clone(),
                credential,
            },
        );
        log::info!("refreshed object-store client for tenant {}", tenant_id);
        Ok(client)
    }

    /// Drop expired entries, then the earliest-expiring ones until one
    /// slot is free for the entry about to be inserted.
    fn cleanup_cache_locked(cache: &mut HashMap<String, ClientEntry>, max_cache_size: usize) {
        let now: i64 = current_epoch_seconds();
        cache.retain(|_, entry| entry.credential.expiration > now);

        if cache.len() >= max_cache_size {
            let mut by_expiration: Vec<(String, i64)> = cache
                .iter()
                .map(|(tenant, entry)| (tenant.clone(), entry.credential.expiration))
                .collect();
            by_expiration.sort_by_key(|(_, expiration)| *expiration);

            let excess: usize = cache.len() + 1 - max_cache_size;
            for (tenant, _) in by_expiration.into_iter().take(excess) {
                cache.remove(&tenant);
            }
        }
    }
}

/// Per-tenant handle that always resolves the current valid client from
/// its manager, so it observes refreshes made by other callers.
///
/// Holds only a weak reference to the manager; using the handle after the
/// manager is dropped yields [`StorageError::ManagerDropped`].
pub struct RefreshingClient {
    manager: Weak<ClientManager>,
    tenant_id: String,
}

impl RefreshingClient {
    /// The tenant this handle serves.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// The current valid client for this tenant.
    pub async fn client(&self) -> Result<Arc<dyn ObjectStoreClient>, StorageError> {
        self.manager()?.get_client(&self.tenant_id).await
    }

    /// Run `op` with the current client, forcing a credential refresh and
    /// retrying when the object store reports expired credentials.
    ///
    /// At most [`MAX_EXPIRED_RETRIES`] refreshes are attempted; after that
    /// the original failure is returned. Any non-expiry failure is
    /// returned immediately.
    pub async fn with_auto_refresh<T, F, Fut>(&self, op: F) -> Result<T, StorageError>
    where
        F: Fn(Arc<dyn ObjectStoreClient>) -> Fut + Send,
        Fut: Future<Output = Result<T, StorageError>> + Send,
        T: Send,
    {
        let manager: Arc<ClientManager> = self.manager()?;
        let mut client: Arc<dyn ObjectStoreClient> = manager.get_client(&self.tenant_id).await?;
        let mut refreshes: u32 = 0;
        loop {
            match op(client).await {
                Err(err) if err.is_credentials_expired() && refreshes < MAX_EXPIRED_RETRIES => {
                    refreshes += 1;
                    log::warn!(
                        "expired credentials for tenant {} (refresh {}/{}): {}",
                        self.tenant_id,
                        refreshes,
                        MAX_EXPIRED_RETRIES,
                        err
                    );
                    client = manager.force_refresh(&self.tenant_id).await?;
                }
                other => return other,
            }
        }
    }

    fn manager(&self) -> Result<Arc<ClientManager>, StorageError> {
        self.manager.upgrade().ok_or(StorageError::ManagerDropped)
    }
}
