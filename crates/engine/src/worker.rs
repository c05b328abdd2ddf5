//! The single upload worker.
//!
//! Exactly one worker task exists at a time. It is started lazily by the
//! first submission that finds it not running, drains the queue FIFO, and
//! exits cleanly once it has been idle past the configured timeout with an
//! empty queue. Failures inside task processing are written to the record
//! and logged; nothing escapes the run loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::confirm::run_confirmation;
use crate::engine::EngineInner;
use crate::record::UploadRecord;
use crate::transport::PutRequest;

pub(crate) struct WorkerState {
    pub running: AtomicBool,
    /// Serializes worker start/exit decisions so at most one worker runs.
    pub start_lock: Mutex<()>,
}

impl WorkerState {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            start_lock: Mutex::new(()),
        }
    }
}

/// Start the worker if it is not running. Called on every submission, so a
/// worker that exited (idle timeout or panic) is restarted by the next one.
pub(crate) fn ensure_worker(inner: &Arc<EngineInner>) {
    let _guard = inner.worker.start_lock.lock().unwrap();
    if inner.worker.running.load(Ordering::SeqCst) {
        return;
    }
    inner.worker.running.store(true, Ordering::SeqCst);

    let worker_inner: Arc<EngineInner> = inner.clone();
    inner.runtime.spawn(async move {
        run_worker(worker_inner).await;
    });
}

async fn run_worker(inner: Arc<EngineInner>) {
    log::info!("upload worker started");
    // The running flag must clear even if processing panics, so the next
    // submission can restart the worker. On the normal exit path the flag
    // is cleared under the start lock instead and the guard is disarmed —
    // a second clear after a new worker has already started would orphan
    // it.
    let exit_guard = WorkerExitGuard {
        inner: inner.clone(),
    };

    let mut last_activity: Instant = Instant::now();
    loop {
        if let Some(upload_id) = inner.queue.pop() {
            process_task(&inner, &upload_id).await;
            last_activity = Instant::now();
            continue;
        }

        if last_activity.elapsed() >= inner.config.worker_idle_timeout {
            // Exit only if no submission slipped in; the start lock keeps
            // this decision and ensure_worker mutually exclusive.
            let guard = inner.worker.start_lock.lock().unwrap();
            if inner.queue.is_empty() {
                inner.worker.running.store(false, Ordering::SeqCst);
                drop(guard);
                std::mem::forget(exit_guard);
                log::info!("upload worker idle, exiting");
                return;
            }
            drop(guard);
            continue;
        }

        inner
            .queue
            .wait_for_task(inner.config.worker_poll_interval)
            .await;
    }
}

struct WorkerExitGuard {
    inner: Arc<EngineInner>,
}

impl Drop for WorkerExitGuard {
    fn drop(&mut self) {
        let _guard = self.inner.worker.start_lock.lock().unwrap();
        self.inner.worker.running.store(false, Ordering::SeqCst);
    }
}

/// Run one upload to completion. Every failure path ends in a terminal
/// record status; nothing propagates.
async fn process_task(inner: &Arc<EngineInner>, upload_id: &str) {
    let Some(record) = inner.tracker.get(upload_id) else {
        log::warn!("no tracker record for queued upload {}", upload_id);
        return;
    };

    // Cancelled while enqueued.
    if record.cancel_requested() {
        record.cancel();
        return;
    }

    record.mark_uploading();
    log::info!(
        "starting upload {} ({} -> s3://{}/{})",
        record.upload_id,
        record.local_file_path,
        record.bucket,
        record.object_key
    );

    if let Some(message) = validate_record(inner, &record) {
        record.fail(&message);
        log::error!("upload {} rejected: {}", record.upload_id, message);
        return;
    }

    let file_size: u64 = match tokio::fs::metadata(&record.local_file_path).await {
        Ok(metadata) if metadata.is_file() => metadata.len(),
        _ => {
            record.fail("Local file does not exist");
            return;
        }
    };
    record.set_total_size(file_size);

    if record.cancel_requested() {
        record.cancel();
        return;
    }

    // Probe the file for binary read before the first attempt.
    match tokio::fs::File::open(&record.local_file_path).await {
        Ok(file) => drop(file),
        Err(err) => {
            record.fail(&format!("Cannot open file for reading: {}", err));
            return;
        }
    }

    let request = PutRequest {
        region: record.region.clone(),
        bucket: record.bucket.clone(),
        object_key: record.object_key.clone(),
        local_file_path: record.local_file_path.clone(),
        tenant_id: record.tenant_id.clone(),
    };

    let max_retries: u32 = inner.config.max_upload_retries;
    let mut last_error = String::new();
    for attempt in 0..=max_retries {
        if record.cancel_requested() {
            record.cancel();
            return;
        }
        if attempt > 0 {
            let delay = inner.config.retry_backoff_unit * attempt;
            log::info!(
                "retrying upload {} (attempt {}/{}) after {:?}",
                record.upload_id,
                attempt + 1,
                max_retries + 1,
                delay
            );
            tokio::time::sleep(delay).await;
        }

        match inner.transport.put_file(&request).await {
            Ok(()) => {
                record.mark_succeeded();
                log::info!(
                    "upload {} succeeded on attempt {}",
                    record.upload_id,
                    attempt + 1
                );
                spawn_confirmation(inner, &record);
                return;
            }
            Err(err) => {
                last_error = format!("Upload failed (attempt {}): {}", attempt + 1, err);
                log::warn!(
                    "upload {} attempt {} failed: {}",
                    record.upload_id,
                    attempt + 1,
                    err
                );
            }
        }
    }

    record.fail(&last_error);
    log::error!(
        "upload {} failed after {} attempts: {}",
        record.upload_id,
        max_retries + 1,
        last_error
    );
}

/// Confirmation runs on its own task so the next queued upload may start
/// while this record confirms; it never runs before the record reached
/// Succeeded.
fn spawn_confirmation(inner: &Arc<EngineInner>, record: &Arc<UploadRecord>) {
    let confirm_inner: Arc<EngineInner> = inner.clone();
    let confirm_record: Arc<UploadRecord> = record.clone();
    inner.runtime.spawn(async move {
        run_confirmation(confirm_inner, confirm_record).await;
    });
}

fn validate_record(inner: &Arc<EngineInner>, record: &UploadRecord) -> Option<String> {
    if !inner.initialized.load(Ordering::SeqCst) {
        return Some("AWS SDK not initialized".to_string());
    }
    if record.region.is_empty()
        || record.bucket.is_empty()
        || record.object_key.is_empty()
        || record.local_file_path.is_empty()
        || record.tenant_id.is_empty()
    {
        return Some("Invalid parameters: one or more required parameters are empty".to_string());
    }
    None
}
