//! Integration tests for `StudioApi` against an in-process axum server.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use studio_client::{StudioApi, StudioApiError};
use studio_core::error::GENERIC_SUBMISSION_MESSAGE;
use studio_core::transport::{FilePart, JobSubmitter, StatusSource, SubmitPayload, TransportError};
use studio_core::{JobError, JobKind, JobStatus};

/// Requests seen by the fake backend, one line each.
type Log = Arc<Mutex<Vec<String>>>;

async fn edit(State(log): State<Log>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    log.lock().unwrap().push(format!(
        "edit prompt={} request_id_len={}",
        body["prompt"].as_str().unwrap_or_default(),
        request_id.len()
    ));
    Json(json!({ "jobId": "edit-123" }))
}

async fn upscale(State(log): State<Log>, mut multipart: Multipart) -> Json<Value> {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or("-").to_string();
        let bytes = field.bytes().await.unwrap();
        log.lock()
            .unwrap()
            .push(format!("{name} {file_name} {}", bytes.len()));
    }
    Json(json!({ "job_id": 7 }))
}

async fn video() -> impl IntoResponse {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "message": "Prompt is required" })),
    )
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "<html>boom</html>")
}

async fn no_id() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn edit_status(State(log): State<Log>, Path(id): Path<String>) -> Json<Value> {
    log.lock().unwrap().push(format!("edit status id={id}"));
    Json(json!({ "status": "in_progress", "progress": 0.5, "jobId": id }))
}

async fn video_status() -> impl IntoResponse {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "Worker pool offline" })),
    )
}

/// Start the fake backend on an ephemeral port.
async fn spawn_backend() -> (String, Log) {
    let log: Log = Arc::default();
    let app = Router::new()
        .route("/api/edit", post(edit))
        .route("/api/upscale", post(upscale))
        .route("/api/video", post(video))
        .route("/api/broken", post(broken))
        .route("/api/no-id", post(no_id))
        .route("/api/edit/status/{id}", get(edit_status))
        .route("/api/video/status/{id}", get(video_status))
        .with_state(log.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server error");
    });

    (format!("http://{addr}"), log)
}

// ---------------------------------------------------------------------------
// Test: submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_json_returns_job_id() {
    let (base, log) = spawn_backend().await;
    let api = StudioApi::new(base);

    let handle = api
        .submit_job(JobKind::Edit, SubmitPayload::Json(json!({ "prompt": "make it blue" })))
        .await
        .expect("submission should succeed");

    assert_eq!(handle.job_id, "edit-123");
    assert_eq!(handle.kind, JobKind::Edit);
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["edit prompt=make it blue request_id_len=36"]
    );
}

#[tokio::test]
async fn submit_multipart_sends_fields_and_files() {
    let (base, log) = spawn_backend().await;
    let api = StudioApi::new(base);

    let payload = SubmitPayload::Multipart {
        fields: vec![("scale".into(), "4".into())],
        files: vec![FilePart {
            field: "image".into(),
            file_name: "input.png".into(),
            bytes: vec![0u8; 128],
            mime: Some("image/png".into()),
        }],
    };
    let handle = api
        .submit_job(JobKind::Upscale, payload)
        .await
        .expect("submission should succeed");

    assert_eq!(handle.job_id, "7");
    assert_eq!(
        log.lock().unwrap().as_slice(),
        ["scale - 1", "image input.png 128"]
    );
}

#[tokio::test]
async fn submit_error_uses_server_message() {
    let (base, _log) = spawn_backend().await;
    let api = StudioApi::new(base);

    let err = api
        .submit(JobKind::Video, SubmitPayload::Json(json!({})))
        .await
        .unwrap_err();

    assert_eq!(err, JobError::submission("Prompt is required"));
    assert_eq!(err.user_message(), "Prompt is required");
}

#[tokio::test]
async fn submit_error_without_message_is_generic() {
    let (base, _log) = spawn_backend().await;
    let api = StudioApi::new(base).with_route(JobKind::Edit, "broken");

    let raw = api
        .submit_job(JobKind::Edit, SubmitPayload::Json(json!({})))
        .await
        .unwrap_err();
    assert_matches!(raw, StudioApiError::ApiError { status: 500, message: None });

    let err = JobError::from(raw);
    assert_eq!(err.user_message(), GENERIC_SUBMISSION_MESSAGE);
}

#[tokio::test]
async fn submit_without_job_id_is_invalid_body() {
    let (base, _log) = spawn_backend().await;
    let api = StudioApi::new(base).with_route(JobKind::Edit, "no-id");

    let err = api
        .submit_job(JobKind::Edit, SubmitPayload::Json(json!({})))
        .await
        .unwrap_err();
    assert_matches!(err, StudioApiError::InvalidBody(_));
}

#[tokio::test]
async fn unreachable_server_is_a_submission_error() {
    let api = StudioApi::new("http://127.0.0.1:1");

    let err = api
        .submit(JobKind::Edit, SubmitPayload::Json(json!({})))
        .await
        .unwrap_err();
    assert_matches!(err, JobError::Submission { .. });
}

// ---------------------------------------------------------------------------
// Test: status retrieval
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_is_fetched_and_normalized() {
    let (base, _log) = spawn_backend().await;
    let api = StudioApi::new(base);

    let response = api
        .fetch_status(JobKind::Edit, "edit-123")
        .await
        .expect("status should be fetched");

    assert_eq!(response.status, "in_progress");
    assert_eq!(response.normalized().status, JobStatus::Processing);
    assert_eq!(response.progress_percent(), Some(50));
}

#[tokio::test]
async fn job_id_with_reserved_characters_stays_one_path_segment() {
    let (base, log) = spawn_backend().await;
    let api = StudioApi::new(base);

    let response = api
        .fetch_status(JobKind::Edit, "a/b?c#d")
        .await
        .expect("status should be fetched");

    assert_eq!(response.normalized().status, JobStatus::Processing);
    assert_eq!(log.lock().unwrap().as_slice(), ["edit status id=a/b?c#d"]);
}

#[tokio::test]
async fn non_success_status_is_a_transport_error() {
    let (base, _log) = spawn_backend().await;
    let api = StudioApi::new(base);

    let err = api.fetch_status(JobKind::Video, "v-1").await.unwrap_err();
    assert_eq!(
        err,
        TransportError::Status {
            status: 503,
            message: "Worker pool offline".into(),
        }
    );
}
