//! Engine configuration.

use std::time::Duration;

use medsignal_common::constants::{
    DEFAULT_CREDENTIAL_CACHE_SIZE, DEFAULT_MAX_UPLOADS, DEFAULT_MAX_UPLOAD_RETRIES,
    DEFAULT_REFRESH_MARGIN_SECONDS, DEFAULT_WORKER_IDLE_TIMEOUT_MINUTES,
    DEFAULT_WORKER_POLL_INTERVAL_SECONDS, RECORD_MAX_AGE_MICROSECONDS,
};

/// Configuration for [`crate::UploadEngine`].
///
/// Defaults match the production contract; the timing knobs exist so tests
/// can run the full pipeline in milliseconds.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upload attempts beyond the first for a single file.
    pub max_upload_retries: u32,
    /// Maximum active tracker records before submissions are rejected
    /// (data ids with an existing group are exempt).
    pub max_uploads: usize,
    /// Inactivity span after which the worker exits.
    pub worker_idle_timeout: Duration,
    /// How long the worker waits on the queue before re-checking its idle
    /// predicate.
    pub worker_poll_interval: Duration,
    /// The sleep before retry attempt `n` is `n * retry_backoff_unit`.
    pub retry_backoff_unit: Duration,
    /// Headroom maintained before credential expiry.
    pub refresh_margin: Duration,
    /// Maximum tenants kept in the credential cache.
    pub credential_cache_size: usize,
    /// Age at which tracker records are pruned on the next add.
    pub record_max_age: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_upload_retries: DEFAULT_MAX_UPLOAD_RETRIES,
            max_uploads: DEFAULT_MAX_UPLOADS,
            worker_idle_timeout: Duration::from_secs(DEFAULT_WORKER_IDLE_TIMEOUT_MINUTES * 60),
            worker_poll_interval: Duration::from_secs(DEFAULT_WORKER_POLL_INTERVAL_SECONDS),
            retry_backoff_unit: Duration::from_secs(2),
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECONDS as u64),
            credential_cache_size: DEFAULT_CREDENTIAL_CACHE_SIZE,
            record_max_age: Duration::from_micros(RECORD_MAX_AGE_MICROSECONDS as u64),
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of upload retries beyond the first attempt.
    pub fn with_max_upload_retries(mut self, retries: u32) -> Self {
        self.max_upload_retries = retries;
        self
    }

    /// Set the maximum number of active tracker records.
    pub fn with_max_uploads(mut self, max_uploads: usize) -> Self {
        self.max_uploads = max_uploads;
        self
    }

    /// Set the worker idle timeout.
    pub fn with_worker_idle_timeout(mut self, timeout: Duration) -> Self {
        self.worker_idle_timeout = timeout;
        self
    }

    /// Set the worker queue-wait interval.
    pub fn with_worker_poll_interval(mut self, interval: Duration) -> Self {
        self.worker_poll_interval = interval;
        self
    }

    /// Set the retry backoff unit.
    pub fn with_retry_backoff_unit(mut self, unit: Duration) -> Self {
        self.retry_backoff_unit = unit;
        self
    }

    /// Set the credential refresh margin.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Set the credential cache capacity.
    pub fn with_credential_cache_size(mut self, size: usize) -> Self {
        self.credential_cache_size = size;
        self
    }

    /// Set the tracker record pruning age.
    pub fn with_record_max_age(mut self, age: Duration) -> Self {
        self.record_max_age = age;
        self
    }
}
