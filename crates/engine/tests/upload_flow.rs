//! End-to-end pipeline tests with scripted transport and confirmation.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::sync::Semaphore;

use medsignal_engine::{
    ConfirmRequest, ConfirmationApi, EngineConfig, EngineError, OperationMode, PutRequest,
    StorageError, UploadEngine, UploadRequest, UploadStatus, UploadTransport,
};

/// Transport whose outcomes are scripted per call. An optional gate makes
/// each put wait for a semaphore permit so tests can hold the worker.
struct ScriptedTransport {
    outcomes: Mutex<VecDeque<Result<(), StorageError>>>,
    calls: Mutex<Vec<PutRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedTransport {
    fn always_ok() -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: None,
        })
    }

    fn scripted(outcomes: Vec<Result<(), StorageError>>) -> Arc<Self> {
        let transport = Self::always_ok();
        *transport.outcomes.lock().unwrap() = outcomes.into();
        transport
    }

    fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn called_keys(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.object_key.clone())
            .collect()
    }
}

#[async_trait]
impl UploadTransport for ScriptedTransport {
    async fn put_file(&self, request: &PutRequest) -> Result<(), StorageError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let current: usize = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        self.calls.lock().unwrap().push(request.clone());
        tokio::time::sleep(Duration::from_millis(5)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Confirmer that records calls and returns configured outcomes.
struct RecordingConfirmer {
    batch_calls: Mutex<Vec<ConfirmRequest>>,
    incremental_calls: Mutex<Vec<ConfirmRequest>>,
    batch_ok: AtomicBool,
    incremental_ok: AtomicBool,
}

impl RecordingConfirmer {
    fn accepting() -> Arc<Self> {
        Arc::new(Self {
            batch_calls: Mutex::new(Vec::new()),
            incremental_calls: Mutex::new(Vec::new()),
            batch_ok: AtomicBool::new(true),
            incremental_ok: AtomicBool::new(true),
        })
    }

    fn batch_count(&self) -> usize {
        self.batch_calls.lock().unwrap().len()
    }

    fn incremental_count(&self) -> usize {
        self.incremental_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfirmationApi for RecordingConfirmer {
    async fn confirm_batch(&self, request: &ConfirmRequest) -> bool {
        self.batch_calls.lock().unwrap().push(request.clone());
        self.batch_ok.load(Ordering::SeqCst)
    }

    async fn confirm_incremental(&self, request: &ConfirmRequest) -> bool {
        self.incremental_calls.lock().unwrap().push(request.clone());
        self.incremental_ok.load(Ordering::SeqCst)
    }
}

fn fast_config() -> EngineConfig {
    EngineConfig::new()
        .with_worker_idle_timeout(Duration::from_secs(30))
        .with_worker_poll_interval(Duration::from_millis(25))
        .with_retry_backoff_unit(Duration::from_millis(10))
}

fn engine_with(
    config: EngineConfig,
    transport: Arc<ScriptedTransport>,
    confirmer: Arc<RecordingConfirmer>,
) -> UploadEngine {
    let engine = UploadEngine::with_collaborators(config, transport, confirmer);
    engine.init_sdk();
    engine
}

fn temp_file(size: usize) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&vec![0xA5u8; size]).unwrap();
    file.flush().unwrap();
    file
}

fn request(
    file: &NamedTempFile,
    data_id: &str,
    object_key: &str,
    mode: OperationMode,
) -> UploadRequest {
    UploadRequest {
        region: "us-west-2".to_string(),
        bucket: "signals".to_string(),
        object_key: object_key.to_string(),
        local_file_path: file.path().to_str().unwrap().to_string(),
        data_id: data_id.to_string(),
        tenant_id: "t1".to_string(),
        mode,
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    let deadline: Instant = Instant::now() + Duration::from_secs(5);
    while !condition() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn group_status_code(engine: &UploadEngine, data_id: &str) -> i32 {
    engine.group_status(data_id).unwrap().status
}

#[tokio::test]
async fn test_single_file_batch_upload_confirms() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file = temp_file(16 * 1024);
    let key = "p/t/source_data/d1/scan/a.bin";
    engine
        .submit(request(&file, "d1", key, OperationMode::BatchCreate))
        .unwrap();

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Confirmed.code(),
        "group d1 confirmed",
    )
    .await;

    assert_eq!(transport.call_count(), 1);
    assert_eq!(confirmer.batch_count(), 1);
    assert_eq!(confirmer.incremental_count(), 0);

    let status = engine.group_status("d1").unwrap();
    assert_eq!(status.code, UploadStatus::Succeeded.code());
    assert_eq!(status.uploaded_count, 1);
    assert_eq!(status.uploaded_size, 16 * 1024);
    assert_eq!(status.total_size, 16 * 1024);
    assert_eq!(status.total_upload_count, 1);
    assert!(status.error_message.is_empty());

    // Single-file batch confirms against the file key, not the directory.
    let batch = confirmer.batch_calls.lock().unwrap();
    assert_eq!(batch[0].object_key, key);
    assert_eq!(batch[0].total_size_bytes, 16 * 1024);
    assert_eq!(batch[0].data_name, "scan");
}

#[tokio::test]
async fn test_transient_put_failures_then_success() {
    let transport = ScriptedTransport::scripted(vec![
        Err(StorageError::Network {
            message: "reset".to_string(),
            retryable: true,
        }),
        Err(StorageError::Network {
            message: "reset".to_string(),
            retryable: true,
        }),
        Ok(()),
    ]);
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file = temp_file(1024);
    let started: Instant = Instant::now();
    engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Confirmed.code(),
        "group d1 confirmed",
    )
    .await;

    // Exactly three attempts, with backoff sleeps of 1 and 2 units.
    assert_eq!(transport.call_count(), 3);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn test_upload_fails_after_retries_exhausted() {
    let failure = || {
        Err(StorageError::Network {
            message: "unreachable".to_string(),
            retryable: true,
        })
    };
    let transport = ScriptedTransport::scripted(vec![failure(), failure()]);
    let confirmer = RecordingConfirmer::accepting();
    let config = fast_config().with_max_upload_retries(1);
    let engine = engine_with(config, transport.clone(), confirmer.clone());

    let file = temp_file(1024);
    engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Failed.code(),
        "group d1 failed",
    )
    .await;

    assert_eq!(transport.call_count(), 2);
    assert_eq!(confirmer.batch_count(), 0);

    let status = engine.group_status("d1").unwrap();
    assert!(status.error_message.contains("unreachable"));
    assert_eq!(status.uploaded_count, 0);
}

#[tokio::test]
async fn test_missing_file_fails_without_put() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    engine
        .submit(UploadRequest {
            region: "us-west-2".to_string(),
            bucket: "signals".to_string(),
            object_key: "p/t/source_data/d1/scan/a.bin".to_string(),
            local_file_path: "/nonexistent/medsignal/a.bin".to_string(),
            data_id: "d1".to_string(),
            tenant_id: "t1".to_string(),
            mode: OperationMode::BatchCreate,
        })
        .unwrap();

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Failed.code(),
        "group d1 failed",
    )
    .await;

    assert_eq!(transport.call_count(), 0);
    let status = engine.group_status("d1").unwrap();
    assert!(status.error_message.contains("does not exist"));
}

#[tokio::test]
async fn test_empty_tenant_fails_without_put() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file = temp_file(64);
    let mut bad_request = request(
        &file,
        "d1",
        "p/t/source_data/d1/scan/a.bin",
        OperationMode::BatchCreate,
    );
    bad_request.tenant_id = String::new();
    engine.submit(bad_request).unwrap();

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Failed.code(),
        "group d1 failed",
    )
    .await;

    assert_eq!(transport.call_count(), 0);
    let status = engine.group_status("d1").unwrap();
    assert!(status.error_message.contains("Invalid parameters"));
}

#[tokio::test]
async fn test_zero_byte_file_uploads_and_confirms() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file = temp_file(0);
    engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/empty.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Confirmed.code(),
        "group d1 confirmed",
    )
    .await;

    let status = engine.group_status("d1").unwrap();
    assert_eq!(status.total_size, 0);
    assert_eq!(status.uploaded_count, 1);
}

#[tokio::test]
async fn test_folder_upload_batch_confirms_once_with_directory_key() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file_a = temp_file(100);
    let file_b = temp_file(200);
    let file_c = temp_file(300);
    for (file, key) in [
        (&file_a, "p/t/source_data/d2/scan/a"),
        (&file_b, "p/t/source_data/d2/scan/b"),
        (&file_c, "p/t/source_data/d2/scan/c"),
    ] {
        engine
            .submit(request(file, "d2", key, OperationMode::BatchCreate))
            .unwrap();
    }

    wait_until(
        || group_status_code(&engine, "d2") == UploadStatus::Confirmed.code(),
        "group d2 confirmed",
    )
    .await;

    assert_eq!(transport.call_count(), 3);
    assert_eq!(confirmer.batch_count(), 1);

    let batch = confirmer.batch_calls.lock().unwrap();
    assert!(batch[0].object_key.ends_with("/scan/"));
    assert_eq!(batch[0].total_size_bytes, 600);

    let status = engine.group_status("d2").unwrap();
    assert_eq!(status.uploaded_count, 3);
    for upload in &status.uploads {
        assert_eq!(upload.status, UploadStatus::Confirmed.code());
    }
}

#[tokio::test]
async fn test_realtime_append_confirms_each_file() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file_a = temp_file(100);
    let file_b = temp_file(200);
    engine
        .submit(request(
            &file_a,
            "d3",
            "p/t/source_data/d3/scan/a.bin",
            OperationMode::RealtimeAppend,
        ))
        .unwrap();
    engine
        .submit(request(
            &file_b,
            "d3",
            "p/t/source_data/d3/scan/b.bin",
            OperationMode::RealtimeAppend,
        ))
        .unwrap();

    wait_until(
        || group_status_code(&engine, "d3") == UploadStatus::Confirmed.code(),
        "group d3 confirmed",
    )
    .await;

    assert_eq!(confirmer.batch_count(), 0);
    assert_eq!(confirmer.incremental_count(), 2);

    // Each file confirmed with its own name, in submission order.
    let incremental = confirmer.incremental_calls.lock().unwrap();
    assert_eq!(incremental[0].data_name, "a.bin");
    assert_eq!(incremental[1].data_name, "b.bin");
    assert_eq!(incremental[0].total_size_bytes, 100);
    assert_eq!(incremental[1].total_size_bytes, 200);
}

#[tokio::test]
async fn test_cancellation_before_upload_starts() {
    let gate = Arc::new(Semaphore::new(0));
    let transport = ScriptedTransport::gated(gate.clone());
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file_a = temp_file(100);
    let file_b = temp_file(100);

    // The worker blocks on the first upload's gate, so the second stays
    // queued while we cancel it.
    engine
        .submit(request(
            &file_a,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();
    let second_id = engine
        .submit(request(
            &file_b,
            "d2",
            "p/t/source_data/d2/scan/b.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();
    engine.cancel(&second_id).unwrap();

    gate.add_permits(8);

    wait_until(
        || group_status_code(&engine, "d2") == UploadStatus::Cancelled.code(),
        "group d2 cancelled",
    )
    .await;
    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Confirmed.code(),
        "group d1 confirmed",
    )
    .await;

    // The cancelled upload never reached the transport or the confirmer.
    assert_eq!(transport.call_count(), 1);
    assert_eq!(confirmer.batch_count(), 1);
    let batch = confirmer.batch_calls.lock().unwrap();
    assert_eq!(batch[0].data_id, "d1");

    let cancelled = engine.group_status("d2").unwrap();
    assert_eq!(cancelled.uploads[0].status, UploadStatus::Cancelled.code());
    assert_eq!(cancelled.uploads[0].start_time, 0);
}

#[tokio::test]
async fn test_uploads_are_serialized_in_submission_order() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let files: Vec<NamedTempFile> = (0..4).map(|_| temp_file(64)).collect();
    let keys: Vec<String> = (0..4)
        .map(|i| format!("p/t/source_data/d1/scan/f{}.bin", i))
        .collect();
    for (file, key) in files.iter().zip(&keys) {
        engine
            .submit(request(file, "d1", key, OperationMode::RealtimeAppend))
            .unwrap();
    }

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Confirmed.code(),
        "group d1 confirmed",
    )
    .await;

    assert_eq!(transport.called_keys(), keys);
    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_worker_exits_when_idle_and_restarts_on_submit() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let config = fast_config().with_worker_idle_timeout(Duration::from_millis(120));
    let engine = engine_with(config, transport.clone(), confirmer.clone());

    let file = temp_file(64);
    engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();
    assert!(engine.worker_running());

    wait_until(|| !engine.worker_running(), "worker idle exit").await;

    // The next submission starts a fresh worker and is processed.
    engine
        .submit(request(
            &file,
            "d9",
            "p/t/source_data/d9/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();
    assert!(engine.worker_running());
    wait_until(
        || group_status_code(&engine, "d9") == UploadStatus::Confirmed.code(),
        "group d9 confirmed",
    )
    .await;
}

#[tokio::test]
async fn test_submit_requires_initialization() {
    let engine = UploadEngine::with_collaborators(
        fast_config(),
        ScriptedTransport::always_ok(),
        RecordingConfirmer::accepting(),
    );

    let file = temp_file(64);
    let err = engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap_err();
    assert!(matches!(err, EngineError::NotInitialized));
}

#[tokio::test]
async fn test_unknown_ids_are_reported() {
    let engine = engine_with(
        fast_config(),
        ScriptedTransport::always_ok(),
        RecordingConfirmer::accepting(),
    );

    assert!(matches!(
        engine.cancel("d1_123"),
        Err(EngineError::UnknownUpload { .. })
    ));
    assert!(matches!(
        engine.group_status("d1"),
        Err(EngineError::UnknownDataId { .. })
    ));
}

#[tokio::test]
async fn test_batch_confirm_failure_marks_confirm_failed() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    confirmer.batch_ok.store(false, Ordering::SeqCst);
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file = temp_file(64);
    engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();

    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::ConfirmFailed.code(),
        "group d1 confirm-failed",
    )
    .await;

    // The upload itself still counts as stored.
    let status = engine.group_status("d1").unwrap();
    assert_eq!(status.uploaded_count, 1);
}

#[tokio::test]
async fn test_status_json_document() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file = temp_file(64);
    engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();
    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Confirmed.code(),
        "group d1 confirmed",
    )
    .await;

    let document: serde_json::Value =
        serde_json::from_str(&engine.status_json("d1").unwrap()).unwrap();
    assert_eq!(document["dataId"], "d1");
    assert_eq!(document["status"], UploadStatus::Confirmed.code());
    assert_eq!(document["uploads"][0]["s3ObjectKey"], "p/t/source_data/d1/scan/a.bin");
    assert!(document["uploads"][0]["startTime"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn test_cleanup_data_id_removes_group() {
    let transport = ScriptedTransport::always_ok();
    let confirmer = RecordingConfirmer::accepting();
    let engine = engine_with(fast_config(), transport.clone(), confirmer.clone());

    let file = temp_file(64);
    engine
        .submit(request(
            &file,
            "d1",
            "p/t/source_data/d1/scan/a.bin",
            OperationMode::BatchCreate,
        ))
        .unwrap();
    wait_until(
        || group_status_code(&engine, "d1") == UploadStatus::Confirmed.code(),
        "group d1 confirmed",
    )
    .await;

    assert_eq!(engine.cleanup_data_id("d1"), 1);
    assert_eq!(engine.total_uploads(), 0);
    assert!(matches!(
        engine.group_status("d1"),
        Err(EngineError::UnknownDataId { .. })
    ));
}
