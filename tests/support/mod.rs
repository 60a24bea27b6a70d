//! In-process OCR service stub backing the integration tests.
//!
//! Speaks the four pipeline endpoints, records what the client actually
//! sent, and lets tests inject failures per chunk or script the status
//! responses a job reports over time.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};

use axum::Router;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

const CORRELATION_HEADER: &str = "X-Correlation-ID";

static TRACING: Once = Once::new();

/// Pipes pipeline logs into the test harness output; enable with RUST_LOG.
fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// One scripted answer of the status endpoint.
#[derive(Clone)]
pub enum StatusStep {
    /// Serve this JSON body with 200
    Ok(Value),
    /// Fail the request with this HTTP status
    Fail(u16),
}

struct StubState {
    /// Chunk indexes in the order they were accepted
    chunk_log: Vec<u32>,
    /// Accepted chunk payload sizes, parallel to `chunk_log`
    chunk_sizes: Vec<usize>,
    /// Every chunk POST, rejected attempts included
    chunk_attempts: u32,
    upload_requests: u32,
    process_requests: u32,
    status_calls: u32,
    /// Correlation header value of every request, in arrival order
    correlation_ids: Vec<String>,
    /// Requests that arrived without a correlation header
    missing_correlation: u32,
    /// Status answers served front to back; the final entry repeats
    status_script: VecDeque<StatusStep>,
    /// chunk index -> (remaining failures, status to fail with)
    chunk_failures: HashMap<u32, (u32, u16)>,
    fail_all_chunks: Option<u16>,
    fail_upload_with: Option<u16>,
    fail_process_with: Option<u16>,
    /// Overrides the chunk size the client asked for when nonzero
    negotiated_chunk_size: u64,
    max_chunks: u32,
}

impl StubState {
    fn new() -> Self {
        Self {
            chunk_log: Vec::new(),
            chunk_sizes: Vec::new(),
            chunk_attempts: 0,
            upload_requests: 0,
            process_requests: 0,
            status_calls: 0,
            correlation_ids: Vec::new(),
            missing_correlation: 0,
            status_script: VecDeque::new(),
            chunk_failures: HashMap::new(),
            fail_all_chunks: None,
            fail_upload_with: None,
            fail_process_with: None,
            negotiated_chunk_size: 0,
            max_chunks: 10_000,
        }
    }
}

type SharedState = Arc<Mutex<StubState>>;

pub struct StubOcr {
    pub base_url: String,
    state: SharedState,
}

impl StubOcr {
    pub async fn start() -> Self {
        init_tracing();
        let state: SharedState = Arc::new(Mutex::new(StubState::new()));
        let app = Router::new()
            .route("/api/ocr/upload", post(create_upload))
            .route("/api/ocr/chunk", post(receive_chunk))
            .route("/api/ocr/process", post(start_process))
            .route("/api/ocr/status/{job_id}", get(job_status))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url: format!("http://{addr}"), state }
    }

    // configuration

    pub fn negotiate_chunk_size(&self, size: u64) {
        self.lock().negotiated_chunk_size = size;
    }

    pub fn set_max_chunks(&self, max: u32) {
        self.lock().max_chunks = max;
    }

    /// Rejects chunk `index` with `status` for its next `times` attempts.
    pub fn fail_chunk(&self, index: u32, times: u32, status: u16) {
        self.lock().chunk_failures.insert(index, (times, status));
    }

    pub fn fail_all_chunks(&self, status: u16) {
        self.lock().fail_all_chunks = Some(status);
    }

    pub fn fail_upload_with(&self, status: u16) {
        self.lock().fail_upload_with = Some(status);
    }

    pub fn fail_process_with(&self, status: u16) {
        self.lock().fail_process_with = Some(status);
    }

    /// Scripts the status endpoint. Steps are served in order; the last
    /// one repeats forever. An empty script reports a pending job.
    pub fn script_status(&self, steps: Vec<StatusStep>) {
        self.lock().status_script = steps.into();
    }

    // observations

    pub fn chunk_log(&self) -> Vec<u32> {
        self.lock().chunk_log.clone()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.lock().chunk_sizes.clone()
    }

    pub fn chunk_attempts(&self) -> u32 {
        self.lock().chunk_attempts
    }

    pub fn upload_requests(&self) -> u32 {
        self.lock().upload_requests
    }

    pub fn process_requests(&self) -> u32 {
        self.lock().process_requests
    }

    pub fn status_calls(&self) -> u32 {
        self.lock().status_calls
    }

    pub fn correlation_ids(&self) -> Vec<String> {
        self.lock().correlation_ids.clone()
    }

    pub fn missing_correlation(&self) -> u32 {
        self.lock().missing_correlation
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap()
    }
}

fn injected_failure(status: u16) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, axum::Json(json!({"error": "injected failure"}))).into_response()
}

fn note_correlation(state: &mut StubState, headers: &HeaderMap) {
    match headers.get(CORRELATION_HEADER).and_then(|v| v.to_str().ok()) {
        Some(id) => state.correlation_ids.push(id.to_string()),
        None => state.missing_correlation += 1,
    }
}

async fn create_upload(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.upload_requests += 1;
    note_correlation(&mut state, &headers);

    if let Some(status) = state.fail_upload_with {
        return injected_failure(status);
    }

    let requested = body["chunkSize"].as_u64().unwrap_or(1024 * 1024);
    let chunk_size = if state.negotiated_chunk_size > 0 {
        state.negotiated_chunk_size
    } else {
        requested
    };
    (
        StatusCode::OK,
        axum::Json(json!({
            "uploadId": "upload-1",
            "chunkSize": chunk_size,
            "maxChunks": state.max_chunks,
        })),
    )
        .into_response()
}

async fn receive_chunk(
    State(state): State<SharedState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut index: Option<u32> = None;
    let mut payload_len = 0usize;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "chunkIndex" => index = field.text().await.ok().and_then(|t| t.parse().ok()),
            "chunk" => payload_len = field.bytes().await.map(|b| b.len()).unwrap_or(0),
            _ => {
                let _ = field.bytes().await;
            }
        }
    }
    let Some(index) = index else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let mut state = state.lock().unwrap();
    state.chunk_attempts += 1;
    note_correlation(&mut state, &headers);

    if let Some(status) = state.fail_all_chunks {
        return injected_failure(status);
    }
    if let Some((remaining, status)) = state.chunk_failures.get_mut(&index) {
        if *remaining > 0 {
            *remaining -= 1;
            let status = *status;
            return injected_failure(status);
        }
    }

    state.chunk_log.push(index);
    state.chunk_sizes.push(payload_len);
    StatusCode::OK.into_response()
}

async fn start_process(
    State(state): State<SharedState>,
    headers: HeaderMap,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    let mut state = state.lock().unwrap();
    state.process_requests += 1;
    note_correlation(&mut state, &headers);

    if let Some(status) = state.fail_process_with {
        return injected_failure(status);
    }

    let upload_id = body["uploadId"].as_str().unwrap_or("unknown");
    (StatusCode::OK, axum::Json(json!({"jobId": format!("job-{upload_id}")}))).into_response()
}

async fn job_status(
    State(state): State<SharedState>,
    Path(_job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let mut state = state.lock().unwrap();
    state.status_calls += 1;
    note_correlation(&mut state, &headers);

    let step = if state.status_script.is_empty() {
        StatusStep::Ok(json!({"status": "pending"}))
    } else if state.status_script.len() == 1 {
        state.status_script.front().cloned().unwrap()
    } else {
        state.status_script.pop_front().unwrap()
    };

    match step {
        StatusStep::Ok(body) => (StatusCode::OK, axum::Json(body)).into_response(),
        StatusStep::Fail(status) => injected_failure(status),
    }
}
