//! Upload-id generation and parsing.
//!
//! An upload id is `<data_id>_<microsecond timestamp>`. Timestamps are made
//! strictly monotonic within the process so two submissions in the same
//! microsecond still produce distinct ids.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::constants::UPLOAD_ID_SEPARATOR;

static LAST_ID_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Produce a microsecond epoch timestamp that is strictly greater than any
/// previously returned by this function in this process.
pub fn next_upload_timestamp() -> i64 {
    let now: i64 = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64;

    loop {
        let last = LAST_ID_TIMESTAMP.load(Ordering::SeqCst);
        let next = now.max(last + 1);
        if LAST_ID_TIMESTAMP
            .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return next;
        }
    }
}

/// Build an upload id from a data id and a microsecond timestamp.
pub fn make_upload_id(data_id: &str, timestamp_micros: i64) -> String {
    format!("{}{}{}", data_id, UPLOAD_ID_SEPARATOR, timestamp_micros)
}

/// Build a fresh upload id for a data id using the monotonic clock.
pub fn new_upload_id(data_id: &str) -> String {
    make_upload_id(data_id, next_upload_timestamp())
}

/// The prefix shared by every upload id belonging to a data id.
pub fn group_prefix(data_id: &str) -> String {
    format!("{}{}", data_id, UPLOAD_ID_SEPARATOR)
}

/// Split an upload id into its data id and timestamp.
///
/// The timestamp is taken after the last separator so data ids containing
/// the separator still round-trip. Returns `None` if the id has no
/// separator or the suffix is not a number.
pub fn split_upload_id(upload_id: &str) -> Option<(&str, i64)> {
    let (data_id, suffix) = upload_id.rsplit_once(UPLOAD_ID_SEPARATOR)?;
    let timestamp: i64 = suffix.parse().ok()?;
    Some((data_id, timestamp))
}
