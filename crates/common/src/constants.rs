//! Shared constants used across medsignal crates.

/// Separator between the data id and the timestamp in an upload id.
pub const UPLOAD_ID_SEPARATOR: &str = "_";

/// Upload attempts beyond the first for a single file.
pub const DEFAULT_MAX_UPLOAD_RETRIES: u32 = 3;

/// Maximum number of active tracker records before new submissions are
/// rejected (existing data-id groups are exempt).
pub const DEFAULT_MAX_UPLOADS: usize = 100;

/// Minutes of inactivity before the upload worker exits.
pub const DEFAULT_WORKER_IDLE_TIMEOUT_MINUTES: u64 = 15;

/// Seconds the worker waits on the queue before re-checking its idle predicate.
pub const DEFAULT_WORKER_POLL_INTERVAL_SECONDS: u64 = 5;

/// Seconds of headroom maintained before credential expiry.
pub const DEFAULT_REFRESH_MARGIN_SECONDS: i64 = 600;

/// Maximum number of tenants kept in the credential cache.
pub const DEFAULT_CREDENTIAL_CACHE_SIZE: usize = 1000;

/// Maximum age of a tracker record before it is pruned on the next add.
/// 3 days = 3 * 24 * 60 * 60 * 1_000_000 microseconds.
pub const RECORD_MAX_AGE_MICROSECONDS: i64 = 259_200_000_000;
