//! REST client for the studio job endpoints.
//!
//! Wraps job submission (`POST /api/<feature>`) and status retrieval
//! (`GET /api/<feature>/status/{jobId}`) using [`reqwest`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use studio_core::error::GENERIC_SUBMISSION_MESSAGE;
use studio_core::status::StatusResponse;
use studio_core::transport::{
    JobHandle, JobSubmitter, StatusSource, SubmitPayload, TransportError,
};
use studio_core::{JobError, JobKind};

/// Header carrying a per-request correlation id.
const REQUEST_ID_HEADER: &str = "x-request-id";

/// HTTP client for the studio backend.
#[derive(Debug, Clone)]
pub struct StudioApi {
    client: reqwest::Client,
    base_url: String,
    /// Route overrides per feature; defaults to [`JobKind::route`].
    routes: HashMap<JobKind, String>,
}

/// Errors from the studio REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum StudioApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Studio API error ({status}): {}", .message.as_deref().unwrap_or("<no message>"))]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// `message` (or `error`) field of a JSON error body, if any.
        message: Option<String>,
    },

    /// A 2xx body did not have the expected shape.
    #[error("Unexpected response body: {0}")]
    InvalidBody(String),

    /// The base URL or route does not form a valid request URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<StudioApiError> for TransportError {
    fn from(err: StudioApiError) -> Self {
        match err {
            StudioApiError::Request(e) if e.is_decode() => TransportError::Decode(e.to_string()),
            StudioApiError::Request(e) => TransportError::Request(e.to_string()),
            StudioApiError::ApiError { status, message } => TransportError::Status {
                status,
                message: message.unwrap_or_default(),
            },
            StudioApiError::InvalidBody(msg) => TransportError::Decode(msg),
            StudioApiError::InvalidUrl(msg) => TransportError::Request(msg),
        }
    }
}

impl From<StudioApiError> for JobError {
    fn from(err: StudioApiError) -> Self {
        match err {
            StudioApiError::ApiError { message, .. } => {
                JobError::submission(message.unwrap_or_else(|| GENERIC_SUBMISSION_MESSAGE.into()))
            }
            StudioApiError::Request(e) => {
                JobError::submission(format!("Could not reach the server: {e}"))
            }
            StudioApiError::InvalidBody(msg) | StudioApiError::InvalidUrl(msg) => {
                JobError::submission(msg)
            }
        }
    }
}

impl StudioApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:3000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            routes: HashMap::new(),
        }
    }

    /// Create an API client whose requests give up after `timeout`.
    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StudioApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Serve `kind` from `/api/<route>` instead of its default route.
    pub fn with_route(mut self, kind: JobKind, route: impl Into<String>) -> Self {
        self.routes
            .insert(kind, route.into().trim_matches('/').to_string());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `{base}/api/<route>` for a feature.
    pub fn feature_url(&self, kind: JobKind) -> String {
        let route = self
            .routes
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.route());
        format!("{}/api/{}", self.base_url, route)
    }

    /// `{base}/api/<route>/status/{job_id}` for a feature.
    ///
    /// The job id is percent-encoded as a single path segment.
    pub fn status_url(&self, kind: JobKind, job_id: &str) -> Result<reqwest::Url, StudioApiError> {
        let feature_url = self.feature_url(kind);
        let mut url = reqwest::Url::parse(&feature_url)
            .map_err(|e| StudioApiError::InvalidUrl(format!("{feature_url}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| StudioApiError::InvalidUrl(format!("{feature_url} cannot have a path")))?
            .pop_if_empty()
            .extend(["status", job_id]);
        Ok(url)
    }

    /// Start a job.
    ///
    /// Sends the payload as JSON or multipart and returns the
    /// server-assigned job id.
    pub async fn submit_job(
        &self,
        kind: JobKind,
        payload: SubmitPayload,
    ) -> Result<JobHandle, StudioApiError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let request = self
            .client
            .post(self.feature_url(kind))
            .header(REQUEST_ID_HEADER, &request_id);

        let request = match payload {
            SubmitPayload::Json(body) => request.json(&body),
            SubmitPayload::Multipart { fields, files } => {
                let mut form = Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                for file in files {
                    let mut part = Part::bytes(file.bytes).file_name(file.file_name);
                    if let Some(mime) = file.mime.as_deref() {
                        part = part.mime_str(mime)?;
                    }
                    form = form.part(file.field, part);
                }
                request.multipart(form)
            }
        };

        let response = request.send().await?;
        let body: serde_json::Value = Self::parse_response(response).await?;
        let job_id = extract_job_id(&body).ok_or_else(|| {
            StudioApiError::InvalidBody("Server response is missing a job id".to_string())
        })?;

        tracing::info!(%kind, job_id = %job_id, request_id = %request_id, "Job submitted");

        Ok(JobHandle { job_id, kind })
    }

    /// Retrieve the current status of a job.
    pub async fn get_status(
        &self,
        kind: JobKind,
        job_id: &str,
    ) -> Result<StatusResponse, StudioApiError> {
        let response = self
            .client
            .get(self.status_url(kind, job_id)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`StudioApiError::ApiError`]
    /// carrying the server's message on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, StudioApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StudioApiError::ApiError {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StudioApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl JobSubmitter for StudioApi {
    async fn submit(&self, kind: JobKind, payload: SubmitPayload) -> Result<JobHandle, JobError> {
        self.submit_job(kind, payload).await.map_err(|e| {
            tracing::warn!(%kind, error = %e, "Job submission failed");
            JobError::from(e)
        })
    }
}

#[async_trait]
impl StatusSource for StudioApi {
    async fn fetch_status(
        &self,
        kind: JobKind,
        job_id: &str,
    ) -> Result<StatusResponse, TransportError> {
        self.get_status(kind, job_id).await.map_err(TransportError::from)
    }
}

/// Read the job id from a submission body (`jobId`, or `job_id`).
fn extract_job_id(body: &serde_json::Value) -> Option<String> {
    let value = body.get("jobId").or_else(|| body.get("job_id"))?;
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Pull a human-readable message out of an error body, if it has one.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
