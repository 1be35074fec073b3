//! Seams between the tracker and whatever talks to the backend.
//!
//! The HTTP implementation lives in `studio-client`; tests plug in scripted
//! fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::job::JobKind;
use crate::status::StatusResponse;
use crate::types::JobId;

/// Failure of a single status request. Never terminal on its own.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network, DNS, TLS or timeout failure.
    #[error("Request failed: {0}")]
    Request(String),

    /// The server answered with a non-2xx status code.
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The body could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Reads the current status of a job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, kind: JobKind, job_id: &str)
        -> Result<StatusResponse, TransportError>;
}

/// Identifies a job the server accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub kind: JobKind,
}

/// A file attached to a multipart submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name.
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `image/png`. Omitted from the part when `None`.
    pub mime: Option<String>,
}

/// Feature-specific body of a submission request.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitPayload {
    Json(serde_json::Value),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

impl SubmitPayload {
    pub fn is_multipart(&self) -> bool {
        matches!(self, SubmitPayload::Multipart { .. })
    }
}

/// Starts server-side jobs.
///
/// Implementations mutate no local state; callers register the returned
/// handle with a tracker.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn submit(&self, kind: JobKind, payload: SubmitPayload) -> Result<JobHandle, JobError>;
}
